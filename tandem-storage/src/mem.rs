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

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tandem_sans_io::{ErrorCode, Record};
use tracing::debug;
use uuid::Uuid;

use crate::{
    Error, GroupDetail, OffsetStage, Result, Storage, TopicMetadata, Topition, UpdateError,
    Version,
};

/// Partition count used when a produce auto creates its topic.
pub const DEFAULT_NUM_PARTITIONS: i32 = 1;

#[derive(Clone, Debug, Default)]
struct PartitionLog {
    log_start: i64,
    records: Vec<Record>,
}

impl PartitionLog {
    fn high_watermark(&self) -> i64 {
        self.log_start + self.records.len() as i64
    }
}

#[derive(Clone, Debug)]
struct TopicDetail {
    id: Uuid,
    partitions: Vec<PartitionLog>,
}

impl TopicDetail {
    fn with_partitions(num_partitions: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            partitions: vec![PartitionLog::default(); num_partitions.max(1) as usize],
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    topics: BTreeMap<String, TopicDetail>,
    // group state as versioned JSON documents
    groups: BTreeMap<String, (Version, String)>,
    commits: BTreeMap<(String, Topition), i64>,
}

impl Inner {
    fn partition_mut(&mut self, topition: &Topition) -> Result<&mut PartitionLog> {
        self.topics
            .get_mut(topition.topic())
            .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))
            .and_then(|detail| {
                usize::try_from(topition.partition())
                    .ok()
                    .and_then(|index| detail.partitions.get_mut(index))
                    .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))
            })
    }
}

/// In memory storage engine.
///
/// One lock serializes all appends, so concurrent producers to the same
/// partition each receive a distinct, increasing offset. State lives
/// for the lifetime of the engine: committed offsets survive client
/// reconnects, which is what the compatibility suite relies on.
#[derive(Clone, Debug)]
pub struct Memory {
    cluster: String,
    node: i32,
    inner: Arc<Mutex<Inner>>,
}

impl Memory {
    pub fn new(cluster: impl Into<String>, node: i32) -> Self {
        Self {
            cluster: cluster.into(),
            node,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn node(&self) -> i32 {
        self.node
    }
}

fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(-1, |since| since.as_millis() as i64)
}

#[async_trait]
impl Storage for Memory {
    async fn create_topic(&self, name: &str, num_partitions: i32) -> Result<Uuid> {
        debug!(name, num_partitions);

        let mut inner = self.inner.lock()?;

        if inner.topics.contains_key(name) {
            return Err(Error::Api(ErrorCode::TopicAlreadyExists));
        }

        let detail = TopicDetail::with_partitions(num_partitions);
        let id = detail.id;
        _ = inner.topics.insert(name.to_owned(), detail);

        Ok(id)
    }

    async fn metadata(&self, topics: Option<&[String]>) -> Result<Vec<TopicMetadata>> {
        debug!(?topics);

        let inner = self.inner.lock()?;

        Ok(match topics {
            Some(topics) => topics
                .iter()
                .filter_map(|name| {
                    inner.topics.get(name).map(|detail| TopicMetadata {
                        name: name.clone(),
                        id: detail.id,
                        num_partitions: detail.partitions.len() as i32,
                    })
                })
                .collect(),

            None => inner
                .topics
                .iter()
                .map(|(name, detail)| TopicMetadata {
                    name: name.clone(),
                    id: detail.id,
                    num_partitions: detail.partitions.len() as i32,
                })
                .collect(),
        })
    }

    async fn produce(&self, topition: &Topition, records: Vec<Record>) -> Result<i64> {
        debug!(%topition, records = records.len());

        let mut inner = self.inner.lock()?;

        if !inner.topics.contains_key(topition.topic()) {
            // unknown topic policy: auto create, matching the
            // environment the compatibility suite runs against
            _ = inner.topics.insert(
                topition.topic().to_owned(),
                TopicDetail::with_partitions(DEFAULT_NUM_PARTITIONS),
            );
        }

        let timestamp = now_timestamp();
        let log = inner.partition_mut(topition)?;
        let base_offset = log.high_watermark();

        for (delta, record) in records.into_iter().enumerate() {
            log.records
                .push(record.offset(base_offset + delta as i64).timestamp(timestamp));
        }

        Ok(base_offset)
    }

    async fn fetch(
        &self,
        topition: &Topition,
        offset: i64,
        max_records: u32,
    ) -> Result<Vec<Record>> {
        debug!(%topition, offset, max_records);

        if offset < 0 {
            return Err(Error::Api(ErrorCode::OffsetOutOfRange));
        }

        let mut inner = self.inner.lock()?;
        let log = inner.partition_mut(topition)?;

        // an offset below the earliest retained record clamps to it
        let from = offset.max(log.log_start);

        if from >= log.high_watermark() {
            return Ok(Vec::new());
        }

        let skip = (from - log.log_start) as usize;

        Ok(log
            .records
            .iter()
            .skip(skip)
            .take(max_records as usize)
            .cloned()
            .collect())
    }

    async fn offset_stage(&self, topition: &Topition) -> Result<OffsetStage> {
        let mut inner = self.inner.lock()?;
        let log = inner.partition_mut(topition)?;

        Ok(OffsetStage::new(log.log_start, log.high_watermark()))
    }

    async fn delete_records(&self, topition: &Topition, before_offset: i64) -> Result<i64> {
        debug!(%topition, before_offset);

        let mut inner = self.inner.lock()?;
        let log = inner.partition_mut(topition)?;

        let up_to = before_offset.clamp(log.log_start, log.high_watermark());
        log.records.drain(..(up_to - log.log_start) as usize);
        log.log_start = up_to;

        Ok(log.log_start)
    }

    async fn offset_commit(
        &self,
        group_id: &str,
        offsets: &[(Topition, i64)],
    ) -> Result<Vec<(Topition, ErrorCode)>> {
        debug!(group_id, ?offsets);

        let mut inner = self.inner.lock()?;

        Ok(offsets
            .iter()
            .map(|(topition, offset)| {
                _ = inner
                    .commits
                    .insert((group_id.to_owned(), topition.clone()), *offset);

                (topition.clone(), ErrorCode::None)
            })
            .collect())
    }

    async fn offset_fetch(
        &self,
        group_id: &str,
        topitions: &[Topition],
    ) -> Result<BTreeMap<Topition, i64>> {
        debug!(group_id, ?topitions);

        let inner = self.inner.lock()?;

        Ok(topitions
            .iter()
            .map(|topition| {
                let committed = inner
                    .commits
                    .get(&(group_id.to_owned(), topition.clone()))
                    .copied()
                    .unwrap_or(-1);

                (topition.clone(), committed)
            })
            .collect())
    }

    async fn committed_offset_topitions(&self, group_id: &str) -> Result<BTreeMap<Topition, i64>> {
        let inner = self.inner.lock()?;

        Ok(inner
            .commits
            .iter()
            .filter(|((group, _), _)| group == group_id)
            .map(|((_, topition), offset)| (topition.clone(), *offset))
            .collect())
    }

    async fn group(&self, group_id: &str) -> Result<Option<(Version, GroupDetail)>> {
        let inner = self.inner.lock()?;

        inner
            .groups
            .get(group_id)
            .map(|(version, document)| {
                serde_json::from_str(document)
                    .map(|detail| (*version, detail))
                    .map_err(Error::from)
            })
            .transpose()
    }

    async fn update_group(
        &self,
        group_id: &str,
        detail: GroupDetail,
        version: Option<Version>,
    ) -> Result<Version, UpdateError<GroupDetail>> {
        debug!(group_id, ?version, generation_id = detail.generation_id);

        let document = serde_json::to_string(&detail).map_err(Error::from)?;

        let mut inner = self.inner.lock().map_err(Error::from)?;
        let current = inner.groups.get(group_id).cloned();

        match (current, version) {
            (None, None) => {
                _ = inner.groups.insert(group_id.to_owned(), (0, document));
                Ok(0)
            }

            (Some((current, _)), Some(version)) if current == version => {
                let next = version + 1;
                _ = inner.groups.insert(group_id.to_owned(), (next, document));
                Ok(next)
            }

            (Some((current, existing)), _) => Err(UpdateError::Outdated {
                current: serde_json::from_str(&existing).map_err(Error::from)?,
                version: current,
            }),

            (None, Some(_)) => Err(UpdateError::Storage(Error::Message(format!(
                "no such group: {group_id}"
            )))),
        }
    }

    async fn delete_group(&self, group_id: &str) -> Result<ErrorCode> {
        debug!(group_id);

        let mut inner = self.inner.lock()?;
        _ = inner.groups.remove(group_id);
        inner.commits.retain(|(group, _), _| group != group_id);

        Ok(ErrorCode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn records(values: &[&'static str]) -> Vec<Record> {
        values
            .iter()
            .map(|value| Record::new(None, Bytes::from_static(value.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn offsets_are_gapless_across_batches() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);

        _ = storage.create_topic("alpha", 1).await?;

        assert_eq!(0, storage.produce(&tp, records(&["a", "b"])).await?);
        assert_eq!(2, storage.produce(&tp, records(&["c"])).await?);

        let fetched = storage.fetch(&tp, 0, 100).await?;
        assert_eq!(
            vec![0, 1, 2],
            fetched.iter().map(|r| r.offset).collect::<Vec<_>>()
        );

        Ok(())
    }

    #[tokio::test]
    async fn produce_to_unknown_topic_auto_creates() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("implicit", 0);

        assert_eq!(0, storage.produce(&tp, records(&["a"])).await?);

        let metadata = storage.metadata(None).await?;
        assert_eq!(1, metadata.len());
        assert_eq!("implicit", metadata[0].name);
        assert_eq!(DEFAULT_NUM_PARTITIONS, metadata[0].num_partitions);

        Ok(())
    }

    #[tokio::test]
    async fn create_existing_topic_is_an_error() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 4).await?;

        assert!(matches!(
            storage.create_topic("alpha", 8).await,
            Err(Error::Api(ErrorCode::TopicAlreadyExists))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn fetch_past_high_watermark_is_empty() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);
        _ = storage.produce(&tp, records(&["a"])).await?;

        assert!(storage.fetch(&tp, 1, 100).await?.is_empty());
        assert!(storage.fetch(&tp, 50, 100).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn negative_fetch_offset_is_out_of_range() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);
        _ = storage.produce(&tp, records(&["a"])).await?;

        assert!(matches!(
            storage.fetch(&tp, -1, 100).await,
            Err(Error::Api(ErrorCode::OffsetOutOfRange))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn fetch_below_log_start_clamps_to_earliest() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);
        _ = storage.produce(&tp, records(&["a", "b", "c", "d"])).await?;

        assert_eq!(2, storage.delete_records(&tp, 2).await?);

        let stage = storage.offset_stage(&tp).await?;
        assert_eq!(2, stage.log_start());
        assert_eq!(4, stage.high_watermark());

        let fetched = storage.fetch(&tp, 0, 100).await?;
        assert_eq!(
            vec![2, 3],
            fetched.iter().map(|r| r.offset).collect::<Vec<_>>()
        );

        Ok(())
    }

    #[tokio::test]
    async fn committed_offsets_survive_and_delete_cascades() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);
        let group_id = "my-subscription-name";

        let committed = storage.offset_commit(group_id, &[(tp.clone(), 10)]).await?;
        assert_eq!(vec![(tp.clone(), ErrorCode::None)], committed);

        let fetched = storage.offset_fetch(group_id, &[tp.clone()]).await?;
        assert_eq!(Some(&10), fetched.get(&tp));

        let all = storage.committed_offset_topitions(group_id).await?;
        assert_eq!(Some(&10), all.get(&tp));

        assert_eq!(ErrorCode::None, storage.delete_group(group_id).await?);

        let fetched = storage.offset_fetch(group_id, &[tp.clone()]).await?;
        assert_eq!(Some(&-1), fetched.get(&tp));

        Ok(())
    }

    #[tokio::test]
    async fn commit_is_last_writer_wins() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);
        let group_id = "my-subscription-name";

        _ = storage.offset_commit(group_id, &[(tp.clone(), 10)]).await?;

        // a seek to beginning followed by a commit rewinds the cursor
        _ = storage.offset_commit(group_id, &[(tp.clone(), 0)]).await?;

        let fetched = storage.offset_fetch(group_id, &[tp.clone()]).await?;
        assert_eq!(Some(&0), fetched.get(&tp));

        Ok(())
    }

    #[tokio::test]
    async fn group_state_round_trips_through_its_document() -> Result<()> {
        use crate::GroupMember;

        let storage = Memory::new("tandem", 111);
        let group_id = "my-subscription-name";

        let detail = GroupDetail {
            generation_id: 3,
            session_timeout_ms: 30_000,
            members: BTreeMap::from([(
                format!("{group_id}-member"),
                GroupMember {
                    topics: vec![String::from("alpha")],
                    last_contact: Some(SystemTime::now()),
                },
            )]),
            assignments: BTreeMap::from([(
                format!("{group_id}-member"),
                vec![Topition::new("alpha", 0)],
            )]),
        };

        let version = storage
            .update_group(group_id, detail.clone(), None)
            .await
            .map_err(|err| Error::Message(err.to_string()))?;

        assert_eq!(Some((version, detail)), storage.group(group_id).await?);

        Ok(())
    }

    #[tokio::test]
    async fn group_update_is_conditional() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let group_id = "my-subscription-name";

        let v0 = storage
            .update_group(group_id, GroupDetail::default(), None)
            .await
            .map_err(|err| Error::Message(err.to_string()))?;
        assert_eq!(0, v0);

        let detail = GroupDetail {
            generation_id: 1,
            ..GroupDetail::default()
        };

        let v1 = storage
            .update_group(group_id, detail, Some(v0))
            .await
            .map_err(|err| Error::Message(err.to_string()))?;
        assert_eq!(1, v1);

        // a second writer with the stale version is outdated
        assert!(matches!(
            storage
                .update_group(group_id, GroupDetail::default(), Some(v0))
                .await,
            Err(UpdateError::Outdated { version: 1, .. })
        ));

        Ok(())
    }
}
