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
};

use bytes::Bytes;
use crc::{CRC_32_ISCSI, Crc};
use tracing::debug;

use crate::Result;

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Maps a record to a partition when the producer left the choice to
/// the broker.
///
/// Keyed records hash deterministically so that records sharing a key
/// land in the same partition and therefore keep their relative order.
/// Unkeyed records spread over the partitions of a topic with a per
/// topic round robin cursor.
#[derive(Clone, Debug, Default)]
pub struct Router {
    cursors: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, topic: &str, key: Option<&Bytes>, num_partitions: i32) -> Result<i32> {
        debug!(topic, has_key = key.is_some(), num_partitions);

        if num_partitions <= 1 {
            return Ok(0);
        }

        match key {
            Some(key) => Ok((CASTAGNOLI.checksum(key) % num_partitions as u32) as i32),

            None => {
                let mut cursors = self.cursors.lock()?;
                let cursor = cursors.entry(topic.to_owned()).or_default();
                let partition = (*cursor % num_partitions as usize) as i32;
                *cursor = cursor.wrapping_add(1);

                Ok(partition)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keyed_routing_is_deterministic() -> Result<()> {
        let router = Router::new();
        let key = Bytes::from_static(b"order-2181");

        let partition = router.route("orders", Some(&key), 8)?;

        for _ in 0..5 {
            assert_eq!(partition, router.route("orders", Some(&key), 8)?);
        }

        assert!((0..8).contains(&partition));

        Ok(())
    }

    #[test]
    fn unkeyed_routing_round_robins_per_topic() -> Result<()> {
        let router = Router::new();

        let partitions = (0..6)
            .map(|_| router.route("orders", None, 3))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(vec![0, 1, 2, 0, 1, 2], partitions);

        // each topic advances its own cursor
        assert_eq!(0, router.route("shipments", None, 3)?);

        Ok(())
    }

    #[test]
    fn single_partition_topics_skip_the_cursor() -> Result<()> {
        let router = Router::new();

        assert_eq!(0, router.route("orders", Some(&Bytes::from_static(b"k")), 1)?);
        assert_eq!(0, router.route("orders", None, 1)?);

        Ok(())
    }
}
