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

//! Tandem storage abstraction.
//!
//! [`Storage`] is the single authoritative log behind both protocol
//! adapters: an append only, partitioned record log with durable
//! committed offsets per consumer group, and a versioned group state
//! document used by the coordinator to serialize rebalances.
//!
//! ```
//! # use tandem_storage::{Memory, Result, Storage, Topition};
//! # use tandem_sans_io::Record;
//! # use bytes::Bytes;
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let storage = Memory::new("tandem", 111);
//! _ = storage.create_topic("greetings", 3).await?;
//!
//! let tp = Topition::new("greetings", 0);
//! let base = storage
//!     .produce(&tp, vec![Record::new(None, Bytes::from_static(b"hello-0"))])
//!     .await?;
//! assert_eq!(0, base);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display, Formatter},
    num::TryFromIntError,
    result,
    sync::PoisonError,
    time::SystemTime,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tandem_sans_io::{ErrorCode, Record};
use uuid::Uuid;

mod mem;
mod router;

pub use mem::Memory;
pub use router::Router;

/// Storage errors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    Api(ErrorCode),
    Message(String),
    Poison,
    SansIo(#[from] tandem_sans_io::Error),
    SerdeJson(std::sync::Arc<serde_json::Error>),
    TryFromInt(#[from] TryFromIntError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(std::sync::Arc::new(value))
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// Topic Partition (topition)
///
/// A topic partition pair.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Topition {
    topic: String,
    partition: i32,
}

impl Topition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        let topic = topic.into();
        Self { topic, partition }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl Display for Topition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// The earliest retained and next offsets of a partition log.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct OffsetStage {
    log_start: i64,
    high_watermark: i64,
}

impl OffsetStage {
    pub fn new(log_start: i64, high_watermark: i64) -> Self {
        Self {
            log_start,
            high_watermark,
        }
    }

    pub fn log_start(&self) -> i64 {
        self.log_start
    }

    pub fn high_watermark(&self) -> i64 {
        self.high_watermark
    }
}

/// Topic metadata as visible through either protocol adapter.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TopicMetadata {
    pub name: String,
    pub id: Uuid,
    pub num_partitions: i32,
}

/// Group member detail.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GroupMember {
    pub topics: Vec<String>,
    pub last_contact: Option<SystemTime>,
}

/// Group state document, versioned by storage for optimistic
/// concurrency: the coordinator reads a version, mutates the document,
/// and writes it back conditionally, retrying when outdated. This
/// serializes rebalances per group.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupDetail {
    pub generation_id: i32,
    pub session_timeout_ms: i32,
    pub members: BTreeMap<String, GroupMember>,
    pub assignments: BTreeMap<String, Vec<Topition>>,
}

impl GroupDetail {
    /// The member assigned a topition, when any.
    pub fn assignee(&self, topition: &Topition) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(_, topitions)| topitions.contains(topition))
            .map(|(member_id, _)| member_id.as_str())
    }
}

/// Version of a group state document.
pub type Version = i64;

/// Conditional update failure.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError<T: Debug> {
    Outdated { current: T, version: Version },
    Storage(#[from] Error),
}

impl<T: Debug> Display for UpdateError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Storage for a log backed topic abstraction with two protocol views.
///
/// Offsets within a partition are strictly increasing and contiguous
/// from the first write. Appends are serialized by the engine and are
/// durable before the returned offset is acknowledged.
#[async_trait]
pub trait Storage: Clone + Debug + Send + Sync + 'static {
    /// Create a topic with a fixed partition count. The count is
    /// immutable once created.
    async fn create_topic(&self, name: &str, num_partitions: i32) -> Result<Uuid>;

    /// Metadata for the named topics, or all topics when none given.
    async fn metadata(&self, topics: Option<&[String]>) -> Result<Vec<TopicMetadata>>;

    /// Append a batch of records, returning the offset of the first.
    /// An unknown topic is created with a single partition.
    async fn produce(&self, topition: &Topition, records: Vec<Record>) -> Result<i64>;

    /// Read up to `max_records` from `offset`. Reading past the high
    /// watermark returns an empty batch; an offset below the earliest
    /// retained record clamps to the earliest.
    async fn fetch(&self, topition: &Topition, offset: i64, max_records: u32)
    -> Result<Vec<Record>>;

    /// The earliest retained and next offsets of a partition.
    async fn offset_stage(&self, topition: &Topition) -> Result<OffsetStage>;

    /// Discard records below `before_offset`, advancing the earliest
    /// retained offset. Returns the new log start.
    async fn delete_records(&self, topition: &Topition, before_offset: i64) -> Result<i64>;

    /// Durably commit offsets for a consumer group. Commits are last
    /// writer wins so an administrative seek may rewind a cursor.
    async fn offset_commit(
        &self,
        group_id: &str,
        offsets: &[(Topition, i64)],
    ) -> Result<Vec<(Topition, ErrorCode)>>;

    /// Fetch committed offsets, `-1` where the group has never
    /// committed.
    async fn offset_fetch(
        &self,
        group_id: &str,
        topitions: &[Topition],
    ) -> Result<BTreeMap<Topition, i64>>;

    /// All committed offsets of a consumer group.
    async fn committed_offset_topitions(&self, group_id: &str) -> Result<BTreeMap<Topition, i64>>;

    /// The current group state document, when the group exists.
    async fn group(&self, group_id: &str) -> Result<Option<(Version, GroupDetail)>>;

    /// Conditionally update the state of a group.
    async fn update_group(
        &self,
        group_id: &str,
        detail: GroupDetail,
        version: Option<Version>,
    ) -> Result<Version, UpdateError<GroupDetail>>;

    /// Remove a group and its committed offsets.
    async fn delete_group(&self, group_id: &str) -> Result<ErrorCode>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assignee_is_unique_per_topition() {
        let tp0 = Topition::new("alpha", 0);
        let tp1 = Topition::new("alpha", 1);

        let detail = GroupDetail {
            generation_id: 2,
            session_timeout_ms: 30_000,
            members: BTreeMap::new(),
            assignments: BTreeMap::from([
                ("member-a".to_owned(), vec![tp0.clone()]),
                ("member-b".to_owned(), vec![tp1.clone()]),
            ]),
        };

        assert_eq!(Some("member-a"), detail.assignee(&tp0));
        assert_eq!(Some("member-b"), detail.assignee(&tp1));
        assert_eq!(None, detail.assignee(&Topition::new("alpha", 2)));
    }
}
