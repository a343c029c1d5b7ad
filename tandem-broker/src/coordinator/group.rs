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

//! Consumer group coordination.
//!
//! Join is a single round with server side assignment: the broker
//! generates member ids, bumps the generation and recomputes a range
//! assignment whenever membership changes. Group state is a versioned
//! document in storage; conditional writes serialize concurrent
//! rebalances, with losers re-reading and retrying.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use tandem_sans_io::{
    Body, ErrorCode, HeartbeatResponse, JoinGroupResponse, LeaveGroupResponse,
    OffsetCommitResponse, OffsetCommitResult, OffsetCommitTopition, OffsetFetchResponse,
    OffsetFetchResult, OffsetFetchTopition, TopicPartitions,
};
use tandem_storage::{GroupDetail, GroupMember, Storage, Topition, UpdateError};
use tracing::debug;
use uuid::Uuid;

use crate::Result;

#[async_trait]
pub trait Coordinator: Clone + Debug + Send + Sync + 'static {
    async fn join(
        &mut self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        session_timeout_ms: i32,
    ) -> Result<Body>;

    async fn heartbeat(&mut self, group_id: &str, generation_id: i32, member_id: &str)
    -> Result<Body>;

    async fn leave(&mut self, group_id: &str, member_id: &str) -> Result<Body>;

    async fn offset_commit(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        offsets: &[OffsetCommitTopition],
    ) -> Result<Body>;

    async fn offset_fetch(
        &mut self,
        group_id: &str,
        topitions: &[OffsetFetchTopition],
    ) -> Result<Body>;
}

#[derive(Clone, Debug)]
pub struct Controller<S> {
    storage: S,
}

impl<S> Controller<S>
where
    S: Storage,
{
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    /// Range assignment over the union of member subscriptions: for
    /// each topic, its partitions split into contiguous runs over the
    /// subscribed members in member id order, run lengths differing by
    /// at most one.
    async fn assign(&self, detail: &GroupDetail) -> Result<BTreeMap<String, Vec<Topition>>> {
        let mut assignments: BTreeMap<String, Vec<Topition>> = detail
            .members
            .keys()
            .map(|member_id| (member_id.clone(), Vec::new()))
            .collect();

        let topics = detail
            .members
            .values()
            .flat_map(|member| member.topics.iter().cloned())
            .collect::<std::collections::BTreeSet<_>>();

        for topic in topics {
            // a topic that does not exist yet assigns nothing; the
            // next membership change picks it up once created
            let Some(metadata) = self
                .storage
                .metadata(Some(&[topic.clone()]))
                .await?
                .into_iter()
                .next()
            else {
                continue;
            };

            let subscribed = detail
                .members
                .iter()
                .filter(|(_, member)| member.topics.contains(&topic))
                .map(|(member_id, _)| member_id.clone())
                .collect::<Vec<_>>();

            if subscribed.is_empty() {
                continue;
            }

            let partitions = metadata.num_partitions.max(0) as usize;
            let base = partitions / subscribed.len();
            let extra = partitions % subscribed.len();

            let mut partition = 0i32;

            for (rank, member_id) in subscribed.iter().enumerate() {
                let run = base + usize::from(rank < extra);

                for _ in 0..run {
                    if let Some(owned) = assignments.get_mut(member_id) {
                        owned.push(Topition::new(topic.clone(), partition));
                    }

                    partition += 1;
                }
            }
        }

        Ok(assignments)
    }

    fn join_response(detail: &GroupDetail, member_id: &str) -> Body {
        let mut by_topic: BTreeMap<String, Vec<i32>> = BTreeMap::new();

        if let Some(owned) = detail.assignments.get(member_id) {
            for topition in owned {
                by_topic
                    .entry(topition.topic().to_owned())
                    .or_default()
                    .push(topition.partition());
            }
        }

        JoinGroupResponse {
            error_code: ErrorCode::None.into(),
            generation_id: detail.generation_id,
            member_id: member_id.to_owned(),
            assignments: by_topic
                .into_iter()
                .map(|(topic, partitions)| TopicPartitions { topic, partitions })
                .collect(),
        }
        .into()
    }

    fn expire(detail: &mut GroupDetail, now: SystemTime) -> bool {
        if detail.session_timeout_ms <= 0 {
            return false;
        }

        let session = Duration::from_millis(detail.session_timeout_ms as u64);
        let before = detail.members.len();

        detail.members.retain(|_, member| {
            member.last_contact.is_none_or(|last_contact| {
                now.duration_since(last_contact)
                    .is_ok_and(|idle| idle <= session)
                    || now < last_contact
            })
        });

        detail.members.len() != before
    }
}

#[async_trait]
impl<S> Coordinator for Controller<S>
where
    S: Storage,
{
    async fn join(
        &mut self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        session_timeout_ms: i32,
    ) -> Result<Body> {
        debug!(group_id, member_id, ?topics, session_timeout_ms);

        let member_id = if member_id.is_empty() {
            format!("{group_id}-{}", Uuid::new_v4())
        } else {
            member_id.to_owned()
        };

        loop {
            let existing = self.storage.group(group_id).await?;

            let (version, mut detail) = match existing {
                Some((version, detail)) => (Some(version), detail),
                None => (None, GroupDetail::default()),
            };

            let now = SystemTime::now();
            let expired = Self::expire(&mut detail, now);

            let rejoin = detail
                .members
                .get(&member_id)
                .is_some_and(|member| member.topics == topics);

            if rejoin && !expired {
                if let Some(member) = detail.members.get_mut(&member_id) {
                    member.last_contact = Some(now);
                }

                match self
                    .storage
                    .update_group(group_id, detail.clone(), version)
                    .await
                {
                    Ok(_) => return Ok(Self::join_response(&detail, &member_id)),
                    Err(UpdateError::Outdated { .. }) => continue,
                    Err(UpdateError::Storage(error)) => return Err(error.into()),
                }
            }

            _ = detail.members.insert(
                member_id.clone(),
                GroupMember {
                    topics: topics.to_vec(),
                    last_contact: Some(now),
                },
            );
            detail.session_timeout_ms = session_timeout_ms;
            detail.generation_id += 1;
            detail.assignments = self.assign(&detail).await?;

            match self
                .storage
                .update_group(group_id, detail.clone(), version)
                .await
            {
                Ok(_) => return Ok(Self::join_response(&detail, &member_id)),
                Err(UpdateError::Outdated { .. }) => continue,
                Err(UpdateError::Storage(error)) => return Err(error.into()),
            }
        }
    }

    async fn heartbeat(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
    ) -> Result<Body> {
        debug!(group_id, generation_id, member_id);

        loop {
            let Some((version, mut detail)) = self.storage.group(group_id).await? else {
                return Ok(HeartbeatResponse {
                    error_code: ErrorCode::UnknownMemberId.into(),
                }
                .into());
            };

            let Some(member) = detail.members.get_mut(member_id) else {
                return Ok(HeartbeatResponse {
                    error_code: ErrorCode::UnknownMemberId.into(),
                }
                .into());
            };

            if detail.generation_id != generation_id {
                return Ok(HeartbeatResponse {
                    error_code: ErrorCode::RebalanceInProgress.into(),
                }
                .into());
            }

            member.last_contact = Some(SystemTime::now());

            match self
                .storage
                .update_group(group_id, detail, Some(version))
                .await
            {
                Ok(_) => {
                    return Ok(HeartbeatResponse {
                        error_code: ErrorCode::None.into(),
                    }
                    .into());
                }
                Err(UpdateError::Outdated { .. }) => continue,
                Err(UpdateError::Storage(error)) => return Err(error.into()),
            }
        }
    }

    async fn leave(&mut self, group_id: &str, member_id: &str) -> Result<Body> {
        debug!(group_id, member_id);

        loop {
            let Some((version, mut detail)) = self.storage.group(group_id).await? else {
                return Ok(LeaveGroupResponse {
                    error_code: ErrorCode::UnknownMemberId.into(),
                }
                .into());
            };

            if detail.members.remove(member_id).is_none() {
                return Ok(LeaveGroupResponse {
                    error_code: ErrorCode::UnknownMemberId.into(),
                }
                .into());
            }

            detail.generation_id += 1;
            detail.assignments = self.assign(&detail).await?;

            match self
                .storage
                .update_group(group_id, detail, Some(version))
                .await
            {
                Ok(_) => {
                    return Ok(LeaveGroupResponse {
                        error_code: ErrorCode::None.into(),
                    }
                    .into());
                }
                Err(UpdateError::Outdated { .. }) => continue,
                Err(UpdateError::Storage(error)) => return Err(error.into()),
            }
        }
    }

    async fn offset_commit(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        offsets: &[OffsetCommitTopition],
    ) -> Result<Body> {
        debug!(group_id, generation_id, member_id, ?offsets);

        let everywhere = |error_code: ErrorCode| {
            Ok(OffsetCommitResponse {
                responses: offsets
                    .iter()
                    .map(|commit| OffsetCommitResult {
                        topic: commit.topic.clone(),
                        partition: commit.partition,
                        error_code: error_code.into(),
                    })
                    .collect(),
            }
            .into())
        };

        let Some((_, detail)) = self.storage.group(group_id).await? else {
            return everywhere(ErrorCode::UnknownMemberId);
        };

        if !detail.members.contains_key(member_id) {
            return everywhere(ErrorCode::UnknownMemberId);
        }

        if detail.generation_id != generation_id {
            return everywhere(ErrorCode::RebalanceInProgress);
        }

        let offsets = offsets
            .iter()
            .map(|commit| (Topition::new(commit.topic.clone(), commit.partition), commit.offset))
            .collect::<Vec<_>>();

        self.storage
            .offset_commit(group_id, &offsets)
            .await
            .map(|committed| {
                OffsetCommitResponse {
                    responses: committed
                        .into_iter()
                        .map(|(topition, error_code)| OffsetCommitResult {
                            topic: topition.topic().to_owned(),
                            partition: topition.partition(),
                            error_code: error_code.into(),
                        })
                        .collect(),
                }
                .into()
            })
            .map_err(Into::into)
    }

    async fn offset_fetch(
        &mut self,
        group_id: &str,
        topitions: &[OffsetFetchTopition],
    ) -> Result<Body> {
        debug!(group_id, ?topitions);

        let topitions = topitions
            .iter()
            .map(|tp| Topition::new(tp.topic.clone(), tp.partition))
            .collect::<Vec<_>>();

        self.storage
            .offset_fetch(group_id, &topitions)
            .await
            .map(|committed| {
                OffsetFetchResponse {
                    offsets: committed
                        .into_iter()
                        .map(|(topition, offset)| OffsetFetchResult {
                            topic: topition.topic().to_owned(),
                            partition: topition.partition(),
                            offset,
                            error_code: ErrorCode::None.into(),
                        })
                        .collect(),
                }
                .into()
            })
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tandem_sans_io::JoinGroupRequest;
    use tandem_storage::Memory;

    fn controller() -> Controller<Memory> {
        Controller::with_storage(Memory::new("tandem", 111))
    }

    fn joined(body: Body) -> JoinGroupResponse {
        JoinGroupResponse::try_from(body).expect("join group response")
    }

    fn partitions_of(response: &JoinGroupResponse) -> Vec<i32> {
        response
            .assignments
            .iter()
            .flat_map(|tp| tp.partitions.iter().copied())
            .collect()
    }

    #[tokio::test]
    async fn lone_member_owns_every_partition() -> Result<()> {
        let mut controller = controller();
        _ = controller.storage.create_topic("alpha", 8).await?;

        let request = JoinGroupRequest::default()
            .group_id("grp")
            .topics(vec!["alpha".into()])
            .session_timeout_ms(30_000);

        let response = joined(
            controller
                .join(
                    &request.group_id,
                    &request.member_id,
                    &request.topics,
                    request.session_timeout_ms,
                )
                .await?,
        );

        assert_eq!(i16::from(ErrorCode::None), response.error_code);
        assert_eq!(1, response.generation_id);
        assert!(!response.member_id.is_empty());
        assert_eq!((0..8).collect::<Vec<_>>(), partitions_of(&response));

        Ok(())
    }

    #[tokio::test]
    async fn second_member_splits_the_cover() -> Result<()> {
        let mut controller = controller();
        _ = controller.storage.create_topic("alpha", 8).await?;

        let first = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);
        let second = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);

        assert_eq!(2, second.generation_id);

        // the first member rejoins into the new generation
        let first = joined(
            controller
                .join("grp", &first.member_id, &["alpha".into()], 30_000)
                .await?,
        );
        assert_eq!(2, first.generation_id);

        let mut all = partitions_of(&first);
        all.extend(partitions_of(&second));
        all.sort_unstable();

        assert_eq!((0..8).collect::<Vec<_>>(), all);
        assert_eq!(4, partitions_of(&first).len());
        assert_eq!(4, partitions_of(&second).len());

        Ok(())
    }

    #[tokio::test]
    async fn rejoin_by_known_member_is_idempotent() -> Result<()> {
        let mut controller = controller();
        _ = controller.storage.create_topic("alpha", 4).await?;

        let once = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);
        let again = joined(
            controller
                .join("grp", &once.member_id, &["alpha".into()], 30_000)
                .await?,
        );

        assert_eq!(once.generation_id, again.generation_id);
        assert_eq!(once.assignments, again.assignments);

        Ok(())
    }

    #[tokio::test]
    async fn stale_generation_heartbeat_signals_rebalance() -> Result<()> {
        let mut controller = controller();
        _ = controller.storage.create_topic("alpha", 4).await?;

        let first = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);
        _ = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);

        let heartbeat = HeartbeatResponse::try_from(
            controller
                .heartbeat("grp", first.generation_id, &first.member_id)
                .await?,
        )?;

        assert_eq!(
            i16::from(ErrorCode::RebalanceInProgress),
            heartbeat.error_code
        );

        Ok(())
    }

    #[tokio::test]
    async fn unknown_member_heartbeat_is_rejected() -> Result<()> {
        let mut controller = controller();

        let heartbeat =
            HeartbeatResponse::try_from(controller.heartbeat("grp", 1, "nobody").await?)?;

        assert_eq!(i16::from(ErrorCode::UnknownMemberId), heartbeat.error_code);

        Ok(())
    }

    #[tokio::test]
    async fn leave_reassigns_to_the_survivors() -> Result<()> {
        let mut controller = controller();
        _ = controller.storage.create_topic("alpha", 6).await?;

        let first = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);
        let second = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);

        let left =
            LeaveGroupResponse::try_from(controller.leave("grp", &first.member_id).await?)?;
        assert_eq!(i16::from(ErrorCode::None), left.error_code);

        let survivor = joined(
            controller
                .join("grp", &second.member_id, &["alpha".into()], 30_000)
                .await?,
        );

        assert_eq!((0..6).collect::<Vec<_>>(), partitions_of(&survivor));

        Ok(())
    }

    #[tokio::test]
    async fn stale_generation_commit_signals_rebalance() -> Result<()> {
        let mut controller = controller();
        _ = controller.storage.create_topic("alpha", 2).await?;

        let first = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);
        _ = joined(controller.join("grp", "", &["alpha".into()], 30_000).await?);

        let commits = [OffsetCommitTopition {
            topic: "alpha".into(),
            partition: 0,
            offset: 5,
        }];

        let committed = OffsetCommitResponse::try_from(
            controller
                .offset_commit("grp", first.generation_id, &first.member_id, &commits)
                .await?,
        )?;

        assert_eq!(
            vec![i16::from(ErrorCode::RebalanceInProgress)],
            committed
                .responses
                .iter()
                .map(|result| result.error_code)
                .collect::<Vec<_>>()
        );

        Ok(())
    }

    #[tokio::test]
    async fn offset_fetch_of_never_committed_is_negative() -> Result<()> {
        let mut controller = controller();

        let fetched = OffsetFetchResponse::try_from(
            controller
                .offset_fetch(
                    "grp",
                    &[OffsetFetchTopition {
                        topic: "alpha".into(),
                        partition: 0,
                    }],
                )
                .await?,
        )?;

        assert_eq!(-1, fetched.offsets[0].offset);

        Ok(())
    }
}
