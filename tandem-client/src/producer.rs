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

use bytes::Bytes;
use tandem_sans_io::{ProduceRecord, ProduceRequest};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::{Configuration, Connection, Error, Result, error_code_of};

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Where a produced record landed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordMetadata {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug)]
pub struct Producer {
    connection: Connection,
    bootstrap: Url,
}

impl Producer {
    pub async fn connect(configuration: &Configuration) -> Result<Self> {
        let bootstrap = configuration.bootstrap_servers().clone();

        Connection::open(&bootstrap).await.map(|connection| Self {
            connection,
            bootstrap,
        })
    }

    /// Send a single record, letting the broker pick the partition.
    pub async fn send(
        &mut self,
        topic: &str,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Result<RecordMetadata> {
        self.send_to(topic, -1, key, value).await
    }

    /// Send to a pinned partition. Retriable broker errors and
    /// transport failures are retried a bounded number of times before
    /// surfacing.
    pub async fn send_to(
        &mut self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Result<RecordMetadata> {
        debug!(topic, partition);

        let mut attempt = 0;

        loop {
            let response = match self
                .connection
                .call(
                    ProduceRequest::default()
                        .topic(topic)
                        .partition(partition)
                        .records(vec![ProduceRecord {
                            key: key.clone(),
                            value: value.clone(),
                        }]),
                )
                .await
            {
                Ok(response) => response,

                Err(error @ Error::Io(_)) if attempt < MAX_RETRIES => {
                    warn!(topic, partition, attempt, ?error);
                    attempt += 1;
                    sleep(RETRY_BACKOFF).await;
                    self.reconnect().await;
                    continue;
                }

                Err(error) => return Err(error),
            };

            match error_code_of(response.error_code) {
                Ok(()) => {
                    return Ok(RecordMetadata {
                        partition: response.partition,
                        offset: response.base_offset,
                    });
                }

                Err(error) if error.is_retriable() && attempt < MAX_RETRIES => {
                    warn!(topic, partition, attempt, ?error);
                    attempt += 1;
                    sleep(RETRY_BACKOFF).await;
                }

                Err(error) => return Err(error),
            }
        }
    }

    /// Replace a broken connection. When the broker is still
    /// unreachable the old connection stays, and the next attempt
    /// fails fast.
    async fn reconnect(&mut self) {
        if let Ok(connection) = Connection::open(&self.bootstrap).await {
            self.connection = connection;
        }
    }

    /// UTF-8 convenience over [`Producer::send`].
    pub async fn send_str(&mut self, topic: &str, value: &str) -> Result<RecordMetadata> {
        self.send(topic, None, Bytes::copy_from_slice(value.as_bytes()))
            .await
    }
}
