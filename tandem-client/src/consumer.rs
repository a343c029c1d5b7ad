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

//! Consumer group client.
//!
//! The consumer holds a cursor per owned partition. Poll is the only
//! suspension point: it heartbeats, rejoins when the broker signals a
//! rebalance, fetches from each owned partition and advances the
//! cursors. Zero records within the deadline is a normal outcome, not
//! an error.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use tandem_sans_io::{
    ErrorCode, FetchRequest, HeartbeatRequest, JoinGroupRequest, LeaveGroupRequest, ListOffset,
    ListOffsetsRequest, OffsetCommitRequest, OffsetCommitTopition, OffsetFetchRequest,
    OffsetFetchTopition,
};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use url::Url;

use crate::{Configuration, Connection, Error, Result, error_code_of};

const SESSION_TIMEOUT_MS: i32 = 30_000;
const FETCH_MAX_RECORDS: i32 = 500;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// A record as seen through the consumer group protocol.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

impl ConsumerRecord {
    pub fn value_utf8(&self) -> Result<String> {
        String::from_utf8(self.value.to_vec())
            .map_err(|err| Error::Message(format!("not utf8: {err}")))
    }
}

#[derive(Clone, Debug, Default)]
enum State {
    #[default]
    Unjoined,

    Assigned {
        generation_id: i32,
        member_id: String,
        assignments: Vec<(String, i32)>,
    },

    Closed,
}

#[derive(Debug)]
pub struct Consumer {
    connection: Connection,
    bootstrap: Url,
    group_id: String,
    enable_auto_commit: bool,
    topics: Vec<String>,
    state: State,
    positions: BTreeMap<(String, i32), i64>,
}

impl Consumer {
    pub async fn connect(configuration: &Configuration) -> Result<Self> {
        let group_id = configuration
            .group_id()
            .ok_or(Error::Message(String::from("group.id is required")))?
            .to_owned();

        let bootstrap = configuration.bootstrap_servers().clone();

        Connection::open(&bootstrap)
            .await
            .map(|connection| Self {
                connection,
                bootstrap,
                group_id,
                enable_auto_commit: configuration.enable_auto_commit(),
                topics: Vec::new(),
                state: State::Unjoined,
                positions: BTreeMap::new(),
            })
    }

    pub async fn subscribe(&mut self, topics: &[&str]) -> Result<()> {
        if matches!(self.state, State::Closed) {
            return Err(Error::IllegalState("consumer is closed"));
        }

        self.topics = topics.iter().map(|topic| (*topic).to_owned()).collect();
        self.join().await
    }

    /// The partitions this member currently owns.
    pub fn assignment(&self) -> &[(String, i32)] {
        match &self.state {
            State::Assigned { assignments, .. } => assignments,
            _ => &[],
        }
    }

    async fn join(&mut self) -> Result<()> {
        let member_id = match &self.state {
            State::Assigned { member_id, .. } => member_id.clone(),
            _ => String::new(),
        };

        let response = self
            .connection
            .call(
                JoinGroupRequest::default()
                    .group_id(self.group_id.clone())
                    .member_id(member_id)
                    .topics(self.topics.clone())
                    .session_timeout_ms(SESSION_TIMEOUT_MS),
            )
            .await?;

        error_code_of(response.error_code)?;

        let assignments = response
            .assignments
            .iter()
            .flat_map(|tp| {
                tp.partitions
                    .iter()
                    .map(|partition| (tp.topic.clone(), *partition))
            })
            .collect::<Vec<_>>();

        debug!(
            group_id = self.group_id,
            generation_id = response.generation_id,
            member_id = response.member_id,
            ?assignments
        );

        // cursors for partitions this member no longer owns are gone
        self.positions
            .retain(|owned, _| assignments.iter().any(|tp| (&tp.0, tp.1) == (&owned.0, owned.1)));

        self.state = State::Assigned {
            generation_id: response.generation_id,
            member_id: response.member_id,
            assignments,
        };

        Ok(())
    }

    fn membership(&self) -> Result<(i32, String, Vec<(String, i32)>)> {
        match &self.state {
            State::Assigned {
                generation_id,
                member_id,
                assignments,
            } => Ok((*generation_id, member_id.clone(), assignments.clone())),

            State::Unjoined => Err(Error::IllegalState("consumer has no subscription")),
            State::Closed => Err(Error::IllegalState("consumer is closed")),
        }
    }

    /// Heartbeat, rejoining when the broker signals that the
    /// generation has moved on.
    async fn heartbeat(&mut self) -> Result<()> {
        let (generation_id, member_id, _) = self.membership()?;

        let response = self
            .connection
            .call(
                HeartbeatRequest::default()
                    .group_id(self.group_id.clone())
                    .generation_id(generation_id)
                    .member_id(member_id),
            )
            .await?;

        match ErrorCode::try_from(response.error_code)? {
            ErrorCode::None => Ok(()),

            ErrorCode::RebalanceInProgress | ErrorCode::IllegalGeneration => self.join().await,

            ErrorCode::UnknownMemberId => {
                self.state = State::Unjoined;
                self.join().await
            }

            error_code => Err(Error::Api(error_code)),
        }
    }

    async fn position_of(&mut self, topic: &str, partition: i32) -> Result<i64> {
        if let Some(position) = self.positions.get(&(topic.to_owned(), partition)) {
            return Ok(*position);
        }

        let committed = self
            .connection
            .call(
                OffsetFetchRequest::default()
                    .group_id(self.group_id.clone())
                    .topitions(vec![OffsetFetchTopition {
                        topic: topic.to_owned(),
                        partition,
                    }]),
            )
            .await?
            .offsets
            .first()
            .map_or(-1, |result| result.offset);

        let position = if committed >= 0 {
            committed
        } else {
            let response = self
                .connection
                .call(
                    ListOffsetsRequest::default()
                        .topic(topic)
                        .partition(partition)
                        .at(ListOffset::Earliest),
                )
                .await?;

            error_code_of(response.error_code)?;
            response.offset
        };

        _ = self
            .positions
            .insert((topic.to_owned(), partition), position);

        Ok(position)
    }

    /// Poll for records, retrying transport failures a bounded number
    /// of times before surfacing them.
    pub async fn poll(&mut self, timeout: Duration) -> Result<Vec<ConsumerRecord>> {
        let mut attempt = 0;

        loop {
            match self.poll_once(timeout).await {
                Err(error @ Error::Io(_)) if attempt < MAX_RETRIES => {
                    warn!(group_id = self.group_id, attempt, ?error);
                    attempt += 1;
                    sleep(RETRY_BACKOFF).await;
                    self.reconnect().await;
                }

                outcome => return outcome,
            }
        }
    }

    /// Replace a broken connection. When the broker is still
    /// unreachable the old connection stays, and the next attempt
    /// fails fast.
    async fn reconnect(&mut self) {
        if let Ok(connection) = Connection::open(&self.bootstrap).await {
            self.connection = connection;
        }
    }

    async fn poll_once(&mut self, timeout: Duration) -> Result<Vec<ConsumerRecord>> {
        self.heartbeat().await?;

        let (_, _, assignments) = self.membership()?;
        let deadline = Instant::now() + timeout;

        loop {
            let mut batch = Vec::new();

            for (topic, partition) in &assignments {
                let position = self.position_of(topic, *partition).await?;

                let response = self
                    .connection
                    .call(
                        FetchRequest::default()
                            .topic(topic.clone())
                            .partition(*partition)
                            .fetch_offset(position)
                            .max_records(FETCH_MAX_RECORDS)
                            .max_wait_ms(0),
                    )
                    .await?;

                error_code_of(response.error_code)?;

                if let Some(last) = response.records.last() {
                    _ = self
                        .positions
                        .insert((topic.clone(), *partition), last.offset + 1);
                }

                batch.extend(response.records.into_iter().map(|record| ConsumerRecord {
                    topic: topic.clone(),
                    partition: *partition,
                    offset: record.offset,
                    key: record.key,
                    value: record.value,
                }));
            }

            if batch.is_empty() && Instant::now() < deadline {
                sleep(POLL_INTERVAL).await;
                continue;
            }

            if self.enable_auto_commit && !batch.is_empty() {
                self.commit_sync().await?;
            }

            return Ok(batch);
        }
    }

    /// Durably commit the current cursor positions. With nothing
    /// polled or sought there is nothing to say, and this is a no-op.
    pub async fn commit_sync(&mut self) -> Result<()> {
        let (generation_id, member_id, _) = self.membership()?;

        if self.positions.is_empty() {
            return Ok(());
        }

        let offsets = self
            .positions
            .iter()
            .map(|((topic, partition), position)| OffsetCommitTopition {
                topic: topic.clone(),
                partition: *partition,
                offset: *position,
            })
            .collect::<Vec<_>>();

        let response = self
            .connection
            .call(
                OffsetCommitRequest::default()
                    .group_id(self.group_id.clone())
                    .generation_id(generation_id)
                    .member_id(member_id)
                    .offsets(offsets),
            )
            .await?;

        for result in &response.responses {
            match ErrorCode::try_from(result.error_code)? {
                ErrorCode::None => continue,

                ErrorCode::RebalanceInProgress | ErrorCode::IllegalGeneration => {
                    self.join().await?;
                    return Box::pin(self.commit_sync()).await;
                }

                error_code => return Err(Error::Api(error_code)),
            }
        }

        Ok(())
    }

    /// The committed offset of a partition, `-1` when the group has
    /// never committed it.
    pub async fn committed(&mut self, topic: &str, partition: i32) -> Result<i64> {
        Ok(self
            .connection
            .call(
                OffsetFetchRequest::default()
                    .group_id(self.group_id.clone())
                    .topitions(vec![OffsetFetchTopition {
                        topic: topic.to_owned(),
                        partition,
                    }]),
            )
            .await?
            .offsets
            .first()
            .map_or(-1, |result| result.offset))
    }

    pub async fn seek_to_beginning(&mut self) -> Result<()> {
        self.seek(ListOffset::Earliest).await
    }

    pub async fn seek_to_end(&mut self) -> Result<()> {
        self.seek(ListOffset::Latest).await
    }

    async fn seek(&mut self, at: ListOffset) -> Result<()> {
        let (_, _, assignments) = self.membership()?;

        for (topic, partition) in assignments {
            let response = self
                .connection
                .call(
                    ListOffsetsRequest::default()
                        .topic(topic.clone())
                        .partition(partition)
                        .at(at),
                )
                .await?;

            error_code_of(response.error_code)?;

            _ = self.positions.insert((topic, partition), response.offset);
        }

        Ok(())
    }

    /// Leave the group. Further polls or commits are an illegal state
    /// error; closing twice is not.
    pub async fn close(&mut self) -> Result<()> {
        if let State::Assigned { member_id, .. } = &self.state {
            let member_id = member_id.clone();

            let response = self
                .connection
                .call(
                    LeaveGroupRequest::default()
                        .group_id(self.group_id.clone())
                        .member_id(member_id),
                )
                .await?;

            error_code_of(response.error_code)?;
        }

        self.state = State::Closed;

        Ok(())
    }
}
