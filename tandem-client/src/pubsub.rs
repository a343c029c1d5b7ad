// Copyright ⓒ 2025 Tandem Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Native pub/sub clients.
//!
//! `Subscriber` groups acknowledgments: with a zero grouping interval
//! each ack is flushed to the broker immediately, otherwise acks are
//! buffered and flushed once the interval has elapsed or the
//! subscriber is closed.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use tandem_sans_io::{
    AcknowledgeRequest, Acknowledgment, PublishRequest, ReceiveRequest, SubscribeRequest,
};
use tokio::time::Instant;
use tracing::debug;

use crate::{Configuration, Connection, Result, error_code_of};

const RECEIVE_BATCH: i32 = 32;

/// A message as seen through the pub/sub protocol.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Message {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

#[derive(Debug)]
pub struct Publisher {
    connection: Connection,
    topic: String,
}

impl Publisher {
    pub async fn connect(configuration: &Configuration, topic: &str) -> Result<Self> {
        Connection::open(configuration.bootstrap_servers())
            .await
            .map(|connection| Self {
                connection,
                topic: topic.to_owned(),
            })
    }

    /// Publish one message, returning where it landed.
    pub async fn publish(&mut self, key: Option<Bytes>, value: Bytes) -> Result<(i32, i64)> {
        let response = self
            .connection
            .call(
                PublishRequest::default()
                    .topic(self.topic.clone())
                    .partition(-1)
                    .key(key)
                    .value(value),
            )
            .await?;

        error_code_of(response.error_code)?;

        debug!(topic = self.topic, partition = response.partition, offset = response.offset);

        Ok((response.partition, response.offset))
    }

    pub async fn publish_str(&mut self, value: &str) -> Result<(i32, i64)> {
        self.publish(None, Bytes::copy_from_slice(value.as_bytes()))
            .await
    }
}

#[derive(Debug)]
pub struct Subscriber {
    connection: Connection,
    topic: String,
    subscription: String,
    group_time: Duration,
    queued: VecDeque<Message>,
    pending_acks: Vec<Acknowledgment>,
    last_flush: Instant,
}

impl Subscriber {
    pub async fn connect(
        configuration: &Configuration,
        topic: &str,
        subscription: &str,
    ) -> Result<Self> {
        let mut connection = Connection::open(configuration.bootstrap_servers()).await?;

        let response = connection
            .call(
                SubscribeRequest::default()
                    .topic(topic)
                    .subscription(subscription),
            )
            .await?;

        error_code_of(response.error_code)?;

        Ok(Self {
            connection,
            topic: topic.to_owned(),
            subscription: subscription.to_owned(),
            group_time: configuration.acknowledgments_group_time(),
            queued: VecDeque::new(),
            pending_acks: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    /// Receive the next message, waiting up to `timeout`. `None` when
    /// nothing arrived in time.
    pub async fn receive(&mut self, timeout: Duration) -> Result<Option<Message>> {
        if let Some(message) = self.queued.pop_front() {
            return Ok(Some(message));
        }

        let response = self
            .connection
            .call(
                ReceiveRequest::default()
                    .topic(self.topic.clone())
                    .subscription(self.subscription.clone())
                    .max_records(RECEIVE_BATCH)
                    .max_wait_ms(timeout.as_millis().min(i32::MAX as u128) as i32),
            )
            .await?;

        error_code_of(response.error_code)?;

        self.queued
            .extend(response.records.into_iter().map(|received| Message {
                partition: received.partition,
                offset: received.record.offset,
                key: received.record.key,
                value: received.record.value,
            }));

        Ok(self.queued.pop_front())
    }

    /// Acknowledge a message. Flushed immediately with a zero grouping
    /// interval, otherwise buffered until the interval elapses.
    pub async fn acknowledge(&mut self, message: &Message) -> Result<()> {
        self.pending_acks.push(Acknowledgment {
            partition: message.partition,
            offset: message.offset,
        });

        if self.group_time.is_zero() || self.last_flush.elapsed() >= self.group_time {
            self.flush().await?;
        }

        Ok(())
    }

    /// Push buffered acknowledgments to the broker.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending_acks.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }

        let acknowledgments = std::mem::take(&mut self.pending_acks);
        debug!(topic = self.topic, subscription = self.subscription, acks = acknowledgments.len());

        let response = self
            .connection
            .call(
                AcknowledgeRequest::default()
                    .topic(self.topic.clone())
                    .subscription(self.subscription.clone())
                    .acknowledgments(acknowledgments),
            )
            .await?;

        error_code_of(response.error_code)?;
        self.last_flush = Instant::now();

        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.flush().await
    }
}
