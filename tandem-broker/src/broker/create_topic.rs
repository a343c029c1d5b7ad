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

use tandem_sans_io::{Body, CreateTopicResponse, ErrorCode};
use tandem_storage::Storage;
use tracing::debug;
use uuid::Uuid;

use crate::Result;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CreateTopic<S> {
    storage: S,
}

impl<S> CreateTopic<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    pub async fn response(self, name: &str, num_partitions: i32) -> Result<Body> {
        debug!(name, num_partitions);

        match self.storage.create_topic(name, num_partitions).await {
            Ok(topic_id) => Ok(CreateTopicResponse {
                error_code: ErrorCode::None.into(),
                topic_id,
            }
            .into()),

            Err(tandem_storage::Error::Api(error_code)) => Ok(CreateTopicResponse {
                error_code: error_code.into(),
                topic_id: Uuid::nil(),
            }
            .into()),

            Err(otherwise) => Err(otherwise.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tandem_storage::Memory;

    #[tokio::test]
    async fn create_then_create_again() -> Result<()> {
        let handler = CreateTopic::with_storage(Memory::new("tandem", 111));

        let created = CreateTopicResponse::try_from(
            handler.clone().response("alpha", 4).await?,
        )?;
        assert_eq!(i16::from(ErrorCode::None), created.error_code);
        assert!(!created.topic_id.is_nil());

        let duplicate = CreateTopicResponse::try_from(handler.response("alpha", 4).await?)?;
        assert_eq!(
            i16::from(ErrorCode::TopicAlreadyExists),
            duplicate.error_code
        );
        assert!(duplicate.topic_id.is_nil());

        Ok(())
    }
}
