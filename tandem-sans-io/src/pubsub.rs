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

//! Native pub/sub protocol bodies.
//!
//! A subscription shares the committed offset space of a consumer group
//! of the same name: acknowledging a record commits its offset plus
//! one, so a subscription and a group with equal names see the same
//! cursor.

use bytes::{Buf, Bytes, BytesMut};

use crate::{
    Record, Result,
    primitive::{
        get_array, get_i16, get_i32, get_i64, get_nullable_bytes, get_string, put_array,
        put_nullable_bytes, put_string,
    },
};

/// Publish one record, optionally pinned to a partition.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PublishRequest {
    pub topic: String,
    pub partition: i32,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

impl PublishRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn partition(self, partition: i32) -> Self {
        Self { partition, ..self }
    }

    pub fn key(self, key: Option<Bytes>) -> Self {
        Self { key, ..self }
    }

    pub fn value(self, value: Bytes) -> Self {
        Self { value, ..self }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        buf.extend_from_slice(&self.partition.to_be_bytes());
        put_nullable_bytes(buf, self.key.as_ref());
        put_nullable_bytes(buf, Some(&self.value));
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            partition: get_i32(buf)?,
            key: get_nullable_bytes(buf)?,
            value: get_nullable_bytes(buf)?.unwrap_or_default(),
        })
    }
}

/// The partition and offset assigned to a published record: the same
/// numeric offset a consumer group client observes for it.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PublishResponse {
    pub error_code: i16,
    pub partition: i32,
    pub offset: i64,
}

impl PublishResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        buf.extend_from_slice(&self.partition.to_be_bytes());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            partition: get_i32(buf)?,
            offset: get_i64(buf)?,
        })
    }
}

/// Attach a named subscription to a topic, creating it at the current
/// committed position when it already exists, or at the earliest
/// retained offset otherwise.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscribeRequest {
    pub topic: String,
    pub subscription: String,
}

impl SubscribeRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn subscription(self, subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        put_string(buf, &self.subscription)
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            subscription: get_string(buf)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscribeResponse {
    pub error_code: i16,
}

impl SubscribeResponse {
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
pub struct ReceiveRequest {
    pub topic: String,
    pub subscription: String,
    pub max_records: i32,
    pub max_wait_ms: i32,
}

impl ReceiveRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn subscription(self, subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
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
        put_string(buf, &self.subscription)?;
        buf.extend_from_slice(&self.max_records.to_be_bytes());
        buf.extend_from_slice(&self.max_wait_ms.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            subscription: get_string(buf)?,
            max_records: get_i32(buf)?,
            max_wait_ms: get_i32(buf)?,
        })
    }
}

/// A received record with the partition it was read from.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ReceivedRecord {
    pub partition: i32,
    pub record: Record,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ReceiveResponse {
    pub error_code: i16,
    pub records: Vec<ReceivedRecord>,
}

impl ReceiveResponse {
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.error_code.to_be_bytes());
        put_array(buf, &self.records, |buf, received| {
            buf.extend_from_slice(&received.partition.to_be_bytes());
            received.record.encode(buf)
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            error_code: get_i16(buf)?,
            records: get_array(buf, |buf| {
                Ok(ReceivedRecord {
                    partition: get_i32(buf)?,
                    record: Record::decode(buf)?,
                })
            })?,
        })
    }
}

/// Cumulatively acknowledge records up to an offset per partition.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Acknowledgment {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AcknowledgeRequest {
    pub topic: String,
    pub subscription: String,
    pub acknowledgments: Vec<Acknowledgment>,
}

impl AcknowledgeRequest {
    pub fn topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn subscription(self, subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ..self
        }
    }

    pub fn acknowledgments(self, acknowledgments: Vec<Acknowledgment>) -> Self {
        Self {
            acknowledgments,
            ..self
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, &self.topic)?;
        put_string(buf, &self.subscription)?;
        put_array(buf, &self.acknowledgments, |buf, ack| {
            buf.extend_from_slice(&ack.partition.to_be_bytes());
            buf.extend_from_slice(&ack.offset.to_be_bytes());
            Ok(())
        })
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            topic: get_string(buf)?,
            subscription: get_string(buf)?,
            acknowledgments: get_array(buf, |buf| {
                Ok(Acknowledgment {
                    partition: get_i32(buf)?,
                    offset: get_i64(buf)?,
                })
            })?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AcknowledgeResponse {
    pub error_code: i16,
}

impl AcknowledgeResponse {
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn receive_response_round_trip() -> Result<()> {
        let response = ReceiveResponse {
            error_code: 0,
            records: vec![ReceivedRecord {
                partition: 2,
                record: Record::new(
                    Some(Bytes::from_static(b"0")),
                    Bytes::from_static(b"hello-0"),
                )
                .offset(17)
                .timestamp(1_736_000_000_000),
            }],
        };

        let mut buf = BytesMut::new();
        response.encode(&mut buf)?;

        assert_eq!(response, ReceiveResponse::decode(&mut buf.freeze())?);
        Ok(())
    }
}
