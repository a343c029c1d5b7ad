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

use tandem_sans_io::{Body, ErrorCode, MetadataResponse, MetadataResponseTopic};
use tandem_storage::Storage;
use tracing::debug;
use uuid::Uuid;

use crate::Result;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetadataRequest<S> {
    storage: S,
}

impl<S> MetadataRequest<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    /// Requested topics that do not exist appear in the response with
    /// an error code rather than being silently dropped.
    pub async fn response(self, topics: Option<&[String]>) -> Result<Body> {
        debug!(?topics);

        let known = self.storage.metadata(topics).await?;

        let mut response = known
            .iter()
            .map(|metadata| MetadataResponseTopic {
                error_code: ErrorCode::None.into(),
                name: metadata.name.clone(),
                topic_id: metadata.id,
                num_partitions: metadata.num_partitions,
            })
            .collect::<Vec<_>>();

        if let Some(topics) = topics {
            for name in topics {
                if !known.iter().any(|metadata| &metadata.name == name) {
                    response.push(MetadataResponseTopic {
                        error_code: ErrorCode::UnknownTopicOrPartition.into(),
                        name: name.clone(),
                        topic_id: Uuid::nil(),
                        num_partitions: -1,
                    });
                }
            }
        }

        Ok(MetadataResponse { topics: response }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tandem_storage::Memory;

    #[tokio::test]
    async fn unknown_topic_is_reported_not_dropped() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 4).await?;

        let response = MetadataResponse::try_from(
            MetadataRequest::with_storage(storage)
                .response(Some(&["alpha".into(), "missing".into()]))
                .await?,
        )?;

        assert_eq!(2, response.topics.len());
        assert_eq!(i16::from(ErrorCode::None), response.topics[0].error_code);
        assert_eq!(4, response.topics[0].num_partitions);
        assert_eq!(
            i16::from(ErrorCode::UnknownTopicOrPartition),
            response.topics[1].error_code
        );

        Ok(())
    }
}
