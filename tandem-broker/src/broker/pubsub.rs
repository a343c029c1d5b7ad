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

//! Native pub/sub view over the shared log.
//!
//! A subscription is the same durable cursor as a consumer group of
//! the same name: acknowledging a record commits `offset + 1` into the
//! group's committed offset space, so either protocol can resume where
//! the other left off. Receive positions between acknowledgments are
//! volatile, per broker.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tandem_sans_io::{
    AcknowledgeResponse, Acknowledgment, Body, ErrorCode, PublishResponse, ReceiveResponse,
    ReceivedRecord, Record, SubscribeResponse,
};
use tandem_storage::{Router, Storage, Topition};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Volatile receive cursors, shared by every connection to this
/// broker. Keyed by topic and subscription, then partition, holding
/// the next offset to deliver.
#[derive(Clone, Debug, Default)]
pub struct Subscriptions {
    cursors: Arc<Mutex<BTreeMap<(String, String), BTreeMap<i32, i64>>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, topic: &str, subscription: &str) -> Result<()> {
        let mut cursors = self.cursors.lock()?;
        _ = cursors
            .entry((topic.to_owned(), subscription.to_owned()))
            .or_default();

        Ok(())
    }

    fn cursor(&self, topic: &str, subscription: &str, partition: i32) -> Result<Option<i64>> {
        let cursors = self.cursors.lock()?;

        Ok(cursors
            .get(&(topic.to_owned(), subscription.to_owned()))
            .and_then(|partitions| partitions.get(&partition))
            .copied())
    }

    fn advance(&self, topic: &str, subscription: &str, partition: i32, next: i64) -> Result<()> {
        let mut cursors = self.cursors.lock()?;
        _ = cursors
            .entry((topic.to_owned(), subscription.to_owned()))
            .or_default()
            .insert(partition, next);

        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Publish<S> {
    storage: S,
    router: Router,
}

impl<S> Publish<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self {
            storage,
            router: Router::new(),
        }
    }

    pub fn router(self, router: Router) -> Self {
        Self { router, ..self }
    }

    pub async fn response(
        self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Result<Body> {
        debug!(topic, partition, has_key = key.is_some());

        let partition = if partition >= 0 {
            partition
        } else {
            let num_partitions = self
                .storage
                .metadata(Some(&[topic.to_owned()]))
                .await?
                .into_iter()
                .next()
                .map_or(1, |metadata| metadata.num_partitions);

            self.router.route(topic, key.as_ref(), num_partitions)?
        };

        let tp = Topition::new(topic, partition);

        match self.storage.produce(&tp, vec![Record::new(key, value)]).await {
            Ok(offset) => Ok(PublishResponse {
                error_code: ErrorCode::None.into(),
                partition,
                offset,
            }
            .into()),

            Err(tandem_storage::Error::Api(error_code)) => Ok(PublishResponse {
                error_code: error_code.into(),
                partition,
                offset: -1,
            }
            .into()),

            Err(otherwise) => Err(otherwise.into()),
        }
    }
}

/// Registering a subscription touches no storage, only the shared
/// cursor table.
#[derive(Clone, Debug, Default)]
pub struct Subscribe {
    subscriptions: Subscriptions,
}

impl Subscribe {
    pub fn with_subscriptions(subscriptions: Subscriptions) -> Self {
        Self { subscriptions }
    }

    /// Subscribing to a topic that does not exist yet succeeds: the
    /// cursor attaches once the topic appears.
    pub async fn response(self, topic: &str, subscription: &str) -> Result<Body> {
        debug!(topic, subscription);

        self.subscriptions.register(topic, subscription)?;

        Ok(SubscribeResponse {
            error_code: ErrorCode::None.into(),
        }
        .into())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Receive<S> {
    storage: S,
    subscriptions: Subscriptions,
}

impl<S> Receive<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self {
            storage,
            subscriptions: Subscriptions::new(),
        }
    }

    pub fn subscriptions(self, subscriptions: Subscriptions) -> Self {
        Self {
            subscriptions,
            ..self
        }
    }

    /// The start of a partition cursor: the committed offset of the
    /// namesake group when one exists, otherwise the earliest retained
    /// offset.
    async fn start_of(&self, tp: &Topition, subscription: &str) -> Result<i64> {
        let committed = self
            .storage
            .offset_fetch(subscription, std::slice::from_ref(tp))
            .await?
            .get(tp)
            .copied()
            .unwrap_or(-1);

        if committed >= 0 {
            Ok(committed)
        } else {
            self.storage
                .offset_stage(tp)
                .await
                .map(|stage| stage.log_start())
                .map_err(Into::into)
        }
    }

    pub async fn response(
        self,
        topic: &str,
        subscription: &str,
        max_records: i32,
        max_wait_ms: i32,
    ) -> Result<Body> {
        debug!(topic, subscription, max_records, max_wait_ms);

        let deadline = Instant::now() + Duration::from_millis(max_wait_ms.max(0) as u64);
        let budget = max_records.max(0) as usize;

        loop {
            let partitions = self
                .storage
                .metadata(Some(&[topic.to_owned()]))
                .await?
                .into_iter()
                .next()
                .map_or(0, |metadata| metadata.num_partitions);

            let mut received = Vec::new();

            for partition in 0..partitions {
                if received.len() >= budget {
                    break;
                }

                let tp = Topition::new(topic, partition);

                let cursor = match self.subscriptions.cursor(topic, subscription, partition)? {
                    Some(cursor) => cursor,
                    None => self.start_of(&tp, subscription).await?,
                };

                let records = self
                    .storage
                    .fetch(&tp, cursor, (budget - received.len()) as u32)
                    .await?;

                if let Some(last) = records.last() {
                    self.subscriptions
                        .advance(topic, subscription, partition, last.offset + 1)?;
                }

                received.extend(
                    records
                        .into_iter()
                        .map(|record| ReceivedRecord { partition, record }),
                );
            }

            if received.is_empty() && Instant::now() < deadline {
                sleep(POLL_INTERVAL).await;
                continue;
            }

            return Ok(ReceiveResponse {
                error_code: ErrorCode::None.into(),
                records: received,
            }
            .into());
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Acknowledge<S> {
    storage: S,
}

impl<S> Acknowledge<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    /// Acknowledging offset `n` durably commits `n + 1`, the next
    /// offset the subscription should see.
    pub async fn response(
        self,
        topic: &str,
        subscription: &str,
        acknowledgments: &[Acknowledgment],
    ) -> Result<Body> {
        debug!(topic, subscription, ?acknowledgments);

        let offsets = acknowledgments
            .iter()
            .map(|ack| (Topition::new(topic, ack.partition), ack.offset + 1))
            .collect::<Vec<_>>();

        _ = self.storage.offset_commit(subscription, &offsets).await?;

        Ok(AcknowledgeResponse {
            error_code: ErrorCode::None.into(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tandem_storage::Memory;

    async fn publish(storage: &Memory, topic: &str, value: &'static str) -> Result<PublishResponse> {
        Publish::with_storage(storage.clone())
            .response(topic, -1, None, Bytes::from_static(value.as_bytes()))
            .await
            .and_then(|body| PublishResponse::try_from(body).map_err(Into::into))
    }

    #[tokio::test]
    async fn publish_then_receive_in_order() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let subscriptions = Subscriptions::new();

        for value in ["a", "b", "c"] {
            _ = publish(&storage, "alpha", value).await?;
        }

        let received = ReceiveResponse::try_from(
            Receive::with_storage(storage)
                .subscriptions(subscriptions)
                .response("alpha", "my-subscription-name", 100, 0)
                .await?,
        )?;

        assert_eq!(
            vec![0, 1, 2],
            received
                .records
                .iter()
                .map(|r| r.record.offset)
                .collect::<Vec<_>>()
        );

        Ok(())
    }

    #[tokio::test]
    async fn cursor_advances_between_receives() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let subscriptions = Subscriptions::new();

        for value in ["a", "b"] {
            _ = publish(&storage, "alpha", value).await?;
        }

        let first = ReceiveResponse::try_from(
            Receive::with_storage(storage.clone())
                .subscriptions(subscriptions.clone())
                .response("alpha", "my-subscription-name", 1, 0)
                .await?,
        )?;
        assert_eq!(0, first.records[0].record.offset);

        let second = ReceiveResponse::try_from(
            Receive::with_storage(storage)
                .subscriptions(subscriptions)
                .response("alpha", "my-subscription-name", 1, 0)
                .await?,
        )?;
        assert_eq!(1, second.records[0].record.offset);

        Ok(())
    }

    #[tokio::test]
    async fn acknowledgment_survives_a_fresh_cursor() -> Result<()> {
        let storage = Memory::new("tandem", 111);

        for value in ["a", "b", "c"] {
            _ = publish(&storage, "alpha", value).await?;
        }

        _ = Acknowledge::with_storage(storage.clone())
            .response(
                "alpha",
                "my-subscription-name",
                &[Acknowledgment {
                    partition: 0,
                    offset: 1,
                }],
            )
            .await?;

        // a new broker-side cursor resumes from the committed offset
        let received = ReceiveResponse::try_from(
            Receive::with_storage(storage)
                .subscriptions(Subscriptions::new())
                .response("alpha", "my-subscription-name", 100, 0)
                .await?,
        )?;

        assert_eq!(
            vec![2],
            received
                .records
                .iter()
                .map(|r| r.record.offset)
                .collect::<Vec<_>>()
        );

        Ok(())
    }

    #[tokio::test]
    async fn subscribing_before_the_topic_exists_succeeds() -> Result<()> {
        let subscriptions = Subscriptions::new();

        let response = SubscribeResponse::try_from(
            Subscribe::with_subscriptions(subscriptions.clone())
                .response("later", "my-subscription-name")
                .await?,
        )?;

        assert_eq!(i16::from(ErrorCode::None), response.error_code);
        assert_eq!(
            None,
            subscriptions.cursor("later", "my-subscription-name", 0)?
        );

        Ok(())
    }

    #[tokio::test]
    async fn subscription_shares_the_group_offset_space() -> Result<()> {
        let storage = Memory::new("tandem", 111);

        for value in ["a", "b", "c"] {
            _ = publish(&storage, "alpha", value).await?;
        }

        // a consumer group commit under the same name moves the
        // subscription too
        _ = storage
            .offset_commit("my-subscription-name", &[(Topition::new("alpha", 0), 2)])
            .await?;

        let received = ReceiveResponse::try_from(
            Receive::with_storage(storage)
                .subscriptions(Subscriptions::new())
                .response("alpha", "my-subscription-name", 100, 0)
                .await?,
        )?;

        assert_eq!(2, received.records[0].record.offset);

        Ok(())
    }
}
