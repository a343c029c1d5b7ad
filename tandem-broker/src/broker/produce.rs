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

use tandem_sans_io::{Body, ErrorCode, ProduceRecord, ProduceResponse, Record};
use tandem_storage::{Router, Storage, Topition};
use tracing::{debug, warn};

use crate::Result;

#[derive(Clone, Debug, Default)]
pub struct ProduceRequest<S> {
    storage: S,
    router: Router,
}

impl<S> ProduceRequest<S>
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

    fn error(partition: i32, error_code: ErrorCode) -> Body {
        ProduceResponse {
            error_code: error_code.into(),
            partition,
            base_offset: -1,
        }
        .into()
    }

    /// A negative partition asks the broker to choose one: keyed
    /// batches route on the key of the first record, unkeyed batches
    /// round robin over the partitions of the topic.
    async fn resolve(&self, topic: &str, partition: i32, records: &[ProduceRecord]) -> Result<i32> {
        if partition >= 0 {
            return Ok(partition);
        }

        let num_partitions = self
            .storage
            .metadata(Some(&[topic.to_owned()]))
            .await?
            .into_iter()
            .next()
            .map_or(1, |metadata| metadata.num_partitions);

        let key = records.first().and_then(|record| record.key.as_ref());

        self.router
            .route(topic, key, num_partitions)
            .map_err(Into::into)
    }

    pub async fn response(
        self,
        topic: &str,
        partition: i32,
        records: Vec<ProduceRecord>,
    ) -> Result<Body> {
        debug!(topic, partition, records = records.len());

        let partition = self.resolve(topic, partition, &records).await?;
        let tp = Topition::new(topic, partition);

        let records = records
            .into_iter()
            .map(|record| Record::new(record.key, record.value))
            .collect();

        match self.storage.produce(&tp, records).await {
            Ok(base_offset) => Ok(ProduceResponse {
                error_code: ErrorCode::None.into(),
                partition,
                base_offset,
            }
            .into()),

            Err(tandem_storage::Error::Api(error_code)) => {
                warn!(%tp, ?error_code);

                Ok(Self::error(partition, error_code))
            }

            Err(otherwise) => Err(otherwise.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tandem_storage::Memory;

    fn unkeyed(value: &'static str) -> ProduceRecord {
        ProduceRecord {
            key: None,
            value: Bytes::from_static(value.as_bytes()),
        }
    }

    #[tokio::test]
    async fn pinned_partition_is_respected() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 4).await?;

        let response = ProduceResponse::try_from(
            ProduceRequest::with_storage(storage)
                .response("alpha", 2, vec![unkeyed("a")])
                .await?,
        )?;

        assert_eq!(i16::from(ErrorCode::None), response.error_code);
        assert_eq!(2, response.partition);
        assert_eq!(0, response.base_offset);

        Ok(())
    }

    #[tokio::test]
    async fn negative_partition_is_routed() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 4).await?;

        let router = Router::new();

        for expected in [0, 1, 2, 3, 0] {
            let response = ProduceResponse::try_from(
                ProduceRequest::with_storage(storage.clone())
                    .router(router.clone())
                    .response("alpha", -1, vec![unkeyed("a")])
                    .await?,
            )?;

            assert_eq!(expected, response.partition);
        }

        Ok(())
    }

    #[tokio::test]
    async fn keyed_batches_share_a_partition() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 8).await?;

        let record = || ProduceRecord {
            key: Some(Bytes::from_static(b"order-2181")),
            value: Bytes::from_static(b"a"),
        };

        let first = ProduceResponse::try_from(
            ProduceRequest::with_storage(storage.clone())
                .response("alpha", -1, vec![record()])
                .await?,
        )?;

        let second = ProduceResponse::try_from(
            ProduceRequest::with_storage(storage)
                .response("alpha", -1, vec![record()])
                .await?,
        )?;

        assert_eq!(first.partition, second.partition);
        assert_eq!(first.base_offset + 1, second.base_offset);

        Ok(())
    }
}
