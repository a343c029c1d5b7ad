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

//! Consumer group protocol bodies.
//!
//! Offsets carried by these messages are the storage engine's own
//! offsets, untranslated.

use bytes::{Buf, Bytes, BytesMut};
use uuid::Uuid;

use crate::{
    Error, Record, Result,
    primitive::{
        check, get_array, get_i16, get_i32, get_i64, get_nullable_bytes, get_string, put_array,
        put_nullable_bytes, put_string,
    },
};

fn put_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.extend_from_slice(uuid.as_bytes());
}

fn get_uuid(buf: &mut impl Buf) -> Result<Uuid> {
    check(buf, 16)?;

    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

fn get_i8(buf: &mut impl Buf) -> Result<i8> {
    check(buf, 1).map(|()| buf.get_i8())
}

/// Create a topic with a fixed partition count.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CreateTopicRequest {
    pub name: String,
    pub num_partitions: i32,
}

impl CreateTopicRequest {
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn num_partitions(self, num_partitions: i32) -> Self {
        Self {
            num_partitions,
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.name)?;
        buf.extend_from_slice(&self.num_partitions.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            name: get_string(buf)?,
            num_partitions: get_i32(buf)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CreateTopicResponse {
    pub error_code: i16,
    pub topic_id: Uuid,
}

impl CreateTopicResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        put_uuid(buf, &self.topic_id);
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            topic_id: get_uuid(buf)?,
        })
    }
}

/// Query topic metadata, or all topics when none are named.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetadataRequest {
    pub topics: Option<Vec<String>>,
}

impl MetadataRequest {
    pub fn topics(self, topics: Option<Vec<String>>) -> Self {
        Self { topics }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self.topics {
            Some(ref topics) => put_array(buf, topics, |buf, topic| put_string(buf, topic)),

            None => {
                buf.extend_from_slice(&(-1i32).to_be_bytes());
                Ok(())
            }
        }
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        let length = get_i32(buf)?;

        if length < 0 {
            return Ok(Self { topics: None });
        }

        let mut topics = Vec::with_capacity(length.min(1_024) as usize);

        for _ in 0..length {
            topics.push(get_string(buf)?);
        }

        Ok(Self {
            topics: Some(topics),
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetadataResponseTopic {
    pub error_code: i16,
    pub name: String,
    pub topic_id: Uuid,
    pub num_partitions: i32,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetadataResponse {
    pub topics: Vec<MetadataResponseTopic>,
}

impl MetadataResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_array(buf, &self.topics, |buf, topic| {
            buf.extend_from_slice(&topic.error_code.to_be_bytes());
            put_string(buf, &topic.name)?;
            put_uuid(buf, &topic.topic_id);
            buf.extend_from_slice(&topic.num_partitions.to_be_bytes());
            Ok(())
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        get_array(buf, |buf| {
            Ok(MetadataResponseTopic {
                error_code: get_i16(buf)?,
                name: get_string(buf)?,
                topic_id: get_uuid(buf)?,
                num_partitions: get_i32(buf)?,
            })
        })
        .map(|topics| Self { topics })
    }
}

/// A record to append, prior to offset assignment.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProduceRecord {
    pub key: Option<Bytes>,
    pub value: Bytes,
}

/// Append records to a topic.
///
/// When `partition` is negative the broker routes: deterministically by
/// key hash when a key is present, round robin otherwise.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProduceRequest {
    pub topic: String,
    pub partition: i32,
    pub records: Vec<ProduceRecord>,
}

impl ProduceRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn partition(self, partition: i32) -> Self {
        Self { partition, ..self }
    }

    pub fn records(self, records: Vec<ProduceRecord>) -> Self {
        Self { records, ..self }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        buf.extend_from_slice(&self.partition.to_be_bytes());
        put_array(buf, &self.records, |buf, record| {
            put_nullable_bytes(buf, record.key.as_ref());
            put_nullable_bytes(buf, Some(&record.value));
            Ok(())
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            partition: get_i32(buf)?,
            records: get_array(buf, |buf| {
                Ok(ProduceRecord {
                    key: get_nullable_bytes(buf)?,
                    value: get_nullable_bytes(buf)?.unwrap_or_default(),
                })
            })?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProduceResponse {
    pub error_code: i16,
    pub partition: i32,
    pub base_offset: i64,
}

impl ProduceResponse {
    pub fn error_code(self, error_code: i16) -> Self {
        Self { error_code, ..self }
    }

    pub fn partition(self, partition: i32) -> Self {
        Self { partition, ..self }
    }

    pub fn base_offset(self, base_offset: i64) -> Self {
        Self {
            base_offset,
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        buf.extend_from_slice(&self.partition.to_be_bytes());
        buf.extend_from_slice(&self.base_offset.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            partition: get_i32(buf)?,
            base_offset: get_i64(buf)?,
        })
    }
}

/// Read records from a partition, blocking up to `max_wait_ms` until at
/// least one record is available.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FetchRequest {
    pub topic: String,
    pub partition: i32,
    pub fetch_offset: i64,
    pub max_records: i32,
    pub max_wait_ms: i32,
}

impl FetchRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn partition(self, partition: i32) -> Self {
        Self { partition, ..self }
    }

    pub fn fetch_offset(self, fetch_offset: i64) -> Self {
        Self {
            fetch_offset,
            ..self
        }
    }

    pub fn max_records(self, max_records: i32) -> Self {
        Self {
            max_records,
            ..self
        }
    }

    pub fn max_wait_ms(self, max_wait_ms: i32) -> Self {
        Self {
            max_wait_ms,
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        buf.extend_from_slice(&self.partition.to_be_bytes());
        buf.extend_from_slice(&self.fetch_offset.to_be_bytes());
        buf.extend_from_slice(&self.max_records.to_be_bytes());
        buf.extend_from_slice(&self.max_wait_ms.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            partition: get_i32(buf)?,
            fetch_offset: get_i64(buf)?,
            max_records: get_i32(buf)?,
            max_wait_ms: get_i32(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FetchResponse {
    pub error_code: i16,
    pub high_watermark: i64,
    pub log_start: i64,
    pub records: Vec<Record>,
}

impl FetchResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        buf.extend_from_slice(&self.high_watermark.to_be_bytes());
        buf.extend_from_slice(&self.log_start.to_be_bytes());
        put_array(buf, &self.records, |buf, record| record.encode(buf))
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            high_watermark: get_i64(buf)?,
            log_start: get_i64(buf)?,
            records: get_array(buf, Record::decode)?,
        })
    }
}

/// The position within a partition log being asked about.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ListOffset {
    #[default]
    Earliest,
    Latest,
}

impl From<ListOffset> for i8 {
    fn from(value: ListOffset) -> Self {
        match value {
            ListOffset::Earliest => -2,
            ListOffset::Latest => -1,
        }
    }
}

impl TryFrom<i8> for ListOffset {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self> {
        match value {
            -2 => Ok(Self::Earliest),
            -1 => Ok(Self::Latest),
            otherwise => Err(Error::UnknownListOffset(otherwise)),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListOffsetsRequest {
    pub topic: String,
    pub partition: i32,
    pub at: ListOffset,
}

impl ListOffsetsRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn partition(self, partition: i32) -> Self {
        Self { partition, ..self }
    }

    pub fn at(self, at: ListOffset) -> Self {
        Self { at, ..self }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        buf.extend_from_slice(&self.partition.to_be_bytes());
        buf.extend_from_slice(&i8::from(self.at).to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            partition: get_i32(buf)?,
            at: ListOffset::try_from(get_i8(buf)?)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListOffsetsResponse {
    pub error_code: i16,
    pub offset: i64,
}

impl ListOffsetsResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            offset: get_i64(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FindCoordinatorRequest {
    pub group_id: String,
}

impl FindCoordinatorRequest {
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.group_id)
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            group_id: get_string(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FindCoordinatorResponse {
    pub error_code: i16,
    pub host: String,
    pub port: i32,
}

impl FindCoordinatorResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        put_string(buf, &self.host)?;
        buf.extend_from_slice(&self.port.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            host: get_string(buf)?,
            port: get_i32(buf)?,
        })
    }
}

/// Join a group, or rejoin after a rebalance.
///
/// An empty member id asks the coordinator to generate one. Assignment
/// is computed server side and returned in the response: a single round
/// replaces the join/sync pair of the classic protocol.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JoinGroupRequest {
    pub group_id: String,
    pub member_id: String,
    pub topics: Vec<String>,
    pub session_timeout_ms: i32,
}

impl JoinGroupRequest {
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..self
        }
    }

    pub fn member_id(self, member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            ..self
        }
    }

    pub fn topics(self, topics: Vec<String>) -> Self {
        Self { topics, ..self }
    }

    pub fn session_timeout_ms(self, session_timeout_ms: i32) -> Self {
        Self {
            session_timeout_ms,
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.group_id)?;
        put_string(buf, &self.member_id)?;
        put_array(buf, &self.topics, |buf, topic| put_string(buf, topic))?;
        buf.extend_from_slice(&self.session_timeout_ms.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            group_id: get_string(buf)?,
            member_id: get_string(buf)?,
            topics: get_array(buf, |buf| get_string(buf))?,
            session_timeout_ms: get_i32(buf)?,
        })
    }
}

/// The partitions of one topic assigned to a member.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TopicPartitions {
    pub topic: String,
    pub partitions: Vec<i32>,
}

impl TopicPartitions {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        put_array(buf, &self.partitions, |buf, partition| {
            buf.extend_from_slice(&partition.to_be_bytes());
            Ok(())
        })
    }

    fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            partitions: get_array(buf, |buf| get_i32(buf))?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JoinGroupResponse {
    pub error_code: i16,
    pub generation_id: i32,
    pub member_id: String,
    pub assignments: Vec<TopicPartitions>,
}

impl JoinGroupResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        buf.extend_from_slice(&self.generation_id.to_be_bytes());
        put_string(buf, &self.member_id)?;
        put_array(buf, &self.assignments, |buf, assignment| {
            assignment.encode(buf)
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            generation_id: get_i32(buf)?,
            member_id: get_string(buf)?,
            assignments: get_array(buf, TopicPartitions::decode)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HeartbeatRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
}

impl HeartbeatRequest {
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..self
        }
    }

    pub fn generation_id(self, generation_id: i32) -> Self {
        Self {
            generation_id,
            ..self
        }
    }

    pub fn member_id(self, member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.group_id)?;
        buf.extend_from_slice(&self.generation_id.to_be_bytes());
        put_string(buf, &self.member_id)
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            group_id: get_string(buf)?,
            generation_id: get_i32(buf)?,
            member_id: get_string(buf)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HeartbeatResponse {
    pub error_code: i16,
}

impl HeartbeatResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LeaveGroupRequest {
    pub group_id: String,
    pub member_id: String,
}

impl LeaveGroupRequest {
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..self
        }
    }

    pub fn member_id(self, member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.group_id)?;
        put_string(buf, &self.member_id)
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            group_id: get_string(buf)?,
            member_id: get_string(buf)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LeaveGroupResponse {
    pub error_code: i16,
}

impl LeaveGroupResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
        })
    }
}

/// A committed offset for one partition: the next offset the group
/// should read.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetCommitTopition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl OffsetCommitTopition {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        buf.extend_from_slice(&self.partition.to_be_bytes());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        Ok(())
    }

    fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            partition: get_i32(buf)?,
            offset: get_i64(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetCommitRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
    pub offsets: Vec<OffsetCommitTopition>,
}

impl OffsetCommitRequest {
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..self
        }
    }

    pub fn generation_id(self, generation_id: i32) -> Self {
        Self {
            generation_id,
            ..self
        }
    }

    pub fn member_id(self, member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            ..self
        }
    }

    pub fn offsets(self, offsets: Vec<OffsetCommitTopition>) -> Self {
        Self { offsets, ..self }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.group_id)?;
        buf.extend_from_slice(&self.generation_id.to_be_bytes());
        put_string(buf, &self.member_id)?;
        put_array(buf, &self.offsets, |buf, offset| offset.encode(buf))
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            group_id: get_string(buf)?,
            generation_id: get_i32(buf)?,
            member_id: get_string(buf)?,
            offsets: get_array(buf, OffsetCommitTopition::decode)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetCommitResult {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetCommitResponse {
    pub responses: Vec<OffsetCommitResult>,
}

impl OffsetCommitResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_array(buf, &self.responses, |buf, response| {
            put_string(buf, &response.topic)?;
            buf.extend_from_slice(&response.partition.to_be_bytes());
            buf.extend_from_slice(&response.error_code.to_be_bytes());
            Ok(())
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        get_array(buf, |buf| {
            Ok(OffsetCommitResult {
                topic: get_string(buf)?,
                partition: get_i32(buf)?,
                error_code: get_i16(buf)?,
            })
        })
        .map(|responses| Self { responses })
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetFetchTopition {
    pub topic: String,
    pub partition: i32,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetFetchRequest {
    pub group_id: String,
    pub topitions: Vec<OffsetFetchTopition>,
}

impl OffsetFetchRequest {
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..self
        }
    }

    pub fn topitions(self, topitions: Vec<OffsetFetchTopition>) -> Self {
        Self { topitions, ..self }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.group_id)?;
        put_array(buf, &self.topitions, |buf, topition| {
            put_string(buf, &topition.topic)?;
            buf.extend_from_slice(&topition.partition.to_be_bytes());
            Ok(())
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            group_id: get_string(buf)?,
            topitions: get_array(buf, |buf| {
                Ok(OffsetFetchTopition {
                    topic: get_string(buf)?,
                    partition: get_i32(buf)?,
                })
            })?,
        })
    }
}

/// A fetched committed offset, `-1` when the group has never committed
/// for the partition.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetFetchResult {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error_code: i16,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OffsetFetchResponse {
    pub offsets: Vec<OffsetFetchResult>,
}

impl OffsetFetchResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_array(buf, &self.offsets, |buf, offset| {
            put_string(buf, &offset.topic)?;
            buf.extend_from_slice(&offset.partition.to_be_bytes());
            buf.extend_from_slice(&offset.offset.to_be_bytes());
            buf.extend_from_slice(&offset.error_code.to_be_bytes());
            Ok(())
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        get_array(buf, |buf| {
            Ok(OffsetFetchResult {
                topic: get_string(buf)?,
                partition: get_i32(buf)?,
                offset: get_i64(buf)?,
                error_code: get_i16(buf)?,
            })
        })
        .map(|offsets| Self { offsets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn join_group_round_trip() -> Result<()> {
        let request = JoinGroupRequest::default()
            .group_id("my-subscription-name")
            .member_id("")
            .topics(vec!["alpha".into()])
            .session_timeout_ms(30_000);

        let mut buf = BytesMut::new();
        request.encode(&mut buf)?;

        assert_eq!(request, JoinGroupRequest::decode(&mut buf.freeze())?);
        Ok(())
    }

    #[test]
    fn produce_without_partition_routes_on_broker() -> Result<()> {
        let request = ProduceRequest::default()
            .topic("alpha")
            .partition(-1)
            .records(vec![ProduceRecord {
                key: None,
                value: Bytes::from_static(b"hello-0"),
            }]);

        let mut buf = BytesMut::new();
        request.encode(&mut buf)?;

        let decoded = ProduceRequest::decode(&mut buf.freeze())?;
        assert_eq!(-1, decoded.partition);
        assert_eq!(request, decoded);
        Ok(())
    }
}
