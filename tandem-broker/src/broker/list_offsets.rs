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

use tandem_sans_io::{Body, ErrorCode, ListOffset, ListOffsetsResponse};
use tandem_storage::{Storage, Topition};
use tracing::debug;

use crate::Result;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListOffsetsRequest<S> {
    storage: S,
}

impl<S> ListOffsetsRequest<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    pub async fn response(self, topic: &str, partition: i32, at: ListOffset) -> Result<Body> {
        debug!(topic, partition, ?at);

        let tp = Topition::new(topic, partition);

        match self.storage.offset_stage(&tp).await {
            Ok(stage) => Ok(ListOffsetsResponse {
                error_code: ErrorCode::None.into(),
                offset: match at {
                    ListOffset::Earliest => stage.log_start(),
                    ListOffset::Latest => stage.high_watermark(),
                },
            }
            .into()),

            Err(tandem_storage::Error::Api(error_code)) => Ok(ListOffsetsResponse {
                error_code: error_code.into(),
                offset: -1,
            }
            .into()),

            Err(otherwise) => Err(otherwise.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tandem_sans_io::Record;
    use tandem_storage::Memory;

    #[tokio::test]
    async fn earliest_and_latest() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);

        _ = storage
            .produce(
                &tp,
                vec![
                    Record::new(None, Bytes::from_static(b"a")),
                    Record::new(None, Bytes::from_static(b"b")),
                ],
            )
            .await?;
        _ = storage.delete_records(&tp, 1).await?;

        let earliest = ListOffsetsResponse::try_from(
            ListOffsetsRequest::with_storage(storage.clone())
                .response("alpha", 0, ListOffset::Earliest)
                .await?,
        )?;
        assert_eq!(1, earliest.offset);

        let latest = ListOffsetsResponse::try_from(
            ListOffsetsRequest::with_storage(storage)
                .response("alpha", 0, ListOffset::Latest)
                .await?,
        )?;
        assert_eq!(2, latest.offset);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_topic() -> Result<()> {
        let response = ListOffsetsResponse::try_from(
            ListOffsetsRequest::with_storage(Memory::new("tandem", 111))
                .response("missing", 0, ListOffset::Latest)
                .await?,
        )?;

        assert_eq!(
            i16::from(ErrorCode::UnknownTopicOrPartition),
            response.error_code
        );
        assert_eq!(-1, response.offset);

        Ok(())
    }
}
