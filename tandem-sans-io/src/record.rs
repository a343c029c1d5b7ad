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

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    primitive::{get_i64, get_nullable_bytes, put_nullable_bytes},
};

/// A single log record.
///
/// The offset and timestamp are assigned by storage at append time and
/// are immutable thereafter. The same numeric offset is visible through
/// every protocol view of the log.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Record {
    pub offset: i64,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Option<Bytes>, value: Bytes) -> Self {
        Self {
            offset: -1,
            timestamp: -1,
            key,
            value,
        }
    }

    pub fn offset(self, offset: i64) -> Self {
        Self { offset, ..self }
    }

    pub fn timestamp(self, timestamp: i64) -> Self {
        Self { timestamp, ..self }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        put_nullable_bytes(buf, self.key.as_ref());
        put_nullable_bytes(buf, Some(&self.value));
        Ok(())
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        let offset = get_i64(buf)?;
        let timestamp = get_i64(buf)?;
        let key = get_nullable_bytes(buf)?;
        let value = get_nullable_bytes(buf)?.unwrap_or_default();

        Ok(Self {
            offset,
            timestamp,
            key,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keyed_record_round_trip() -> Result<()> {
        let record = Record::new(
            Some(Bytes::from_static(b"5")),
            Bytes::from_static(b"hello-5"),
        )
        .offset(32)
        .timestamp(1_736_000_000_000);

        let mut buf = BytesMut::new();
        record.encode(&mut buf)?;

        assert_eq!(record, Record::decode(&mut buf.freeze())?);
        Ok(())
    }
}
