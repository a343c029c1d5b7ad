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

use std::time::Duration;

use tandem_sans_io::{Body, ErrorCode, FetchResponse};
use tandem_storage::{Storage, Topition};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FetchRequest<S> {
    storage: S,
}

impl<S> FetchRequest<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    /// Waits up to `max_wait_ms` for at least one record before
    /// answering with an empty batch.
    pub async fn response(
        self,
        topic: &str,
        partition: i32,
        fetch_offset: i64,
        max_records: i32,
        max_wait_ms: i32,
    ) -> Result<Body> {
        debug!(topic, partition, fetch_offset, max_records, max_wait_ms);

        let tp = Topition::new(topic, partition);
        let deadline = Instant::now() + Duration::from_millis(max_wait_ms.max(0) as u64);

        loop {
            match self
                .storage
                .fetch(&tp, fetch_offset, max_records.max(0) as u32)
                .await
            {
                Ok(records) if records.is_empty() && Instant::now() < deadline => {
                    sleep(POLL_INTERVAL).await;
                    continue;
                }

                Ok(records) => {
                    let stage = self.storage.offset_stage(&tp).await?;

                    return Ok(FetchResponse {
                        error_code: ErrorCode::None.into(),
                        high_watermark: stage.high_watermark(),
                        log_start: stage.log_start(),
                        records,
                    }
                    .into());
                }

                Err(tandem_storage::Error::Api(error_code)) => {
                    return Ok(FetchResponse {
                        error_code: error_code.into(),
                        high_watermark: -1,
                        log_start: -1,
                        records: Vec::new(),
                    }
                    .into());
                }

                Err(otherwise) => return Err(otherwise.into()),
            }
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
    async fn immediate_when_records_are_available() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        let tp = Topition::new("alpha", 0);
        _ = storage
            .produce(&tp, vec![Record::new(None, Bytes::from_static(b"a"))])
            .await?;

        let response = FetchResponse::try_from(
            FetchRequest::with_storage(storage)
                .response("alpha", 0, 0, 100, 5_000)
                .await?,
        )?;

        assert_eq!(i16::from(ErrorCode::None), response.error_code);
        assert_eq!(1, response.records.len());
        assert_eq!(1, response.high_watermark);

        Ok(())
    }

    #[tokio::test]
    async fn blocks_until_a_concurrent_produce() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 1).await?;

        let writer = storage.clone();
        let producer = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            writer
                .produce(
                    &Topition::new("alpha", 0),
                    vec![Record::new(None, Bytes::from_static(b"late"))],
                )
                .await
        });

        let response = FetchResponse::try_from(
            FetchRequest::with_storage(storage)
                .response("alpha", 0, 0, 100, 5_000)
                .await?,
        )?;

        assert_eq!(1, response.records.len());
        assert_eq!(
            Bytes::from_static(b"late"),
            response.records[0].value
        );

        producer.await.expect("join")?;

        Ok(())
    }

    #[tokio::test]
    async fn empty_after_the_wait_expires() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 1).await?;

        let response = FetchResponse::try_from(
            FetchRequest::with_storage(storage)
                .response("alpha", 0, 0, 100, 20)
                .await?,
        )?;

        assert!(response.records.is_empty());
        assert_eq!(i16::from(ErrorCode::None), response.error_code);

        Ok(())
    }

    #[tokio::test]
    async fn negative_offset_is_out_of_range() -> Result<()> {
        let storage = Memory::new("tandem", 111);
        _ = storage.create_topic("alpha", 1).await?;

        let response = FetchResponse::try_from(
            FetchRequest::with_storage(storage)
                .response("alpha", 0, -5, 100, 0)
                .await?,
        )?;

        assert_eq!(
            i16::from(ErrorCode::OffsetOutOfRange),
            response.error_code
        );

        Ok(())
    }
}
