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

pub mod create_topic;
pub mod fetch;
pub mod list_offsets;
pub mod metadata;
pub mod produce;
pub mod pubsub;

use std::{
    io::ErrorKind,
    net::{IpAddr, Ipv6Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use bytes::Bytes;
use tandem_sans_io::{Body, ErrorCode, FindCoordinatorResponse, Frame, Header};
use tandem_storage::{Router, Storage};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    signal::unix::{SignalKind, signal},
    sync::broadcast::{self, Receiver},
    task::JoinSet,
    time::sleep,
};
use tracing::{Instrument, Level, debug, error, info, span};
use url::Url;
use uuid::Uuid;

use crate::{CancelKind, Error, Result, coordinator::group::Coordinator};
use pubsub::Subscriptions;

#[derive(Clone, Debug)]
pub struct Broker<G, S> {
    node_id: i32,
    cluster_id: String,
    incarnation_id: Uuid,
    listener: Url,
    pubsub_listener: Url,
    advertised_listener: Url,
    storage: S,
    groups: G,
    router: Router,
    subscriptions: Subscriptions,
}

impl<G, S> Broker<G, S>
where
    G: Coordinator,
    S: Storage,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: i32,
        cluster_id: &str,
        listener: Url,
        pubsub_listener: Url,
        advertised_listener: Url,
        storage: S,
        groups: G,
        incarnation_id: Uuid,
    ) -> Self {
        Self {
            node_id,
            cluster_id: cluster_id.to_owned(),
            incarnation_id,
            listener,
            pubsub_listener,
            advertised_listener,
            storage,
            groups,
            router: Router::new(),
            subscriptions: Subscriptions::new(),
        }
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn incarnation_id(&self) -> Uuid {
        self.incarnation_id
    }

    pub async fn main(self) -> Result<ErrorCode> {
        let mut set = JoinSet::new();

        let (sender, receiver) = broadcast::channel(16);
        debug!(?sender, ?receiver);

        let mut interrupt_signal = signal(SignalKind::interrupt())?;
        let mut terminate_signal = signal(SignalKind::terminate())?;

        {
            let broker = self.clone();
            let interrupts = sender.subscribe();

            _ = set.spawn(async move {
                _ = broker
                    .listen(Protocol::ConsumerGroup, interrupts)
                    .await
                    .inspect_err(|err| error!(?err));
            });
        }

        {
            let broker = self.clone();

            _ = set.spawn(async move {
                _ = broker
                    .listen(Protocol::PubSub, receiver)
                    .await
                    .inspect_err(|err| error!(?err));
            });
        }

        let cancellation = tokio::select! {
            v = set.join_next() => {
                debug!(?v);
                None
            }

            interrupt = interrupt_signal.recv() => {
                debug!(?interrupt);
                Some(CancelKind::Interrupt)
            }

            terminate = terminate_signal.recv() => {
                debug!(?terminate);
                Some(CancelKind::Terminate)
            }
        };

        if let Some(cancellation) = cancellation {
            _ = sender.send(cancellation).inspect_err(|err| debug!(?err))?;

            let cleanup = async {
                while !set.is_empty() {
                    debug!(len = set.len());

                    _ = set.join_next().await;
                }
            };

            let patience = sleep(Duration::from(cancellation));

            tokio::select! {
                v = cleanup => {
                    debug!(?v)
                }

                _ = patience => {
                    debug!(aborting = set.len());
                    set.abort_all();

                    while !set.is_empty() {
                        _ = set.join_next().await;
                    }
                }
            }
        }

        Ok(ErrorCode::None)
    }

    fn bind_address(listener: &Url) -> SocketAddr {
        listener.host().map_or_else(
            || {
                SocketAddr::from((
                    IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                    listener.port().unwrap_or(9092),
                ))
            },
            |host| {
                let port = listener.port().unwrap_or(9092);

                match host {
                    url::Host::Domain(domain) => SocketAddr::from_str(&format!("{domain}:{port}"))
                        .unwrap_or(SocketAddr::from((IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))),
                    url::Host::Ipv4(ipv4_addr) => SocketAddr::from((IpAddr::V4(ipv4_addr), port)),
                    url::Host::Ipv6(ipv6_addr) => SocketAddr::from((IpAddr::V6(ipv6_addr), port)),
                }
            },
        )
    }

    pub async fn listen(
        &self,
        protocol: Protocol,
        mut interrupts: Receiver<CancelKind>,
    ) -> Result<()> {
        let url = match protocol {
            Protocol::ConsumerGroup => &self.listener,
            Protocol::PubSub => &self.pubsub_listener,
        };

        debug!(?protocol, listener = %url);

        let listener = TcpListener::bind(Self::bind_address(url))
            .await
            .inspect_err(|err| error!(?err, %url))?;

        let mut set = JoinSet::new();

        loop {
            tokio::select! {
                Ok((stream, addr)) = listener.accept() => {
                    debug!(?addr);

                    let mut broker = self.clone();

                    let handle = set.spawn(async move {
                        let span = span!(Level::DEBUG, "peer", addr = %addr);

                        async move {
                            match broker.stream_handler(stream).await {
                                Err(Error::Io(ref io))
                                    if io.kind() == ErrorKind::UnexpectedEof
                                        || io.kind() == ErrorKind::BrokenPipe
                                        || io.kind() == ErrorKind::ConnectionReset => {}

                                Err(error) => {
                                    error!(?error);
                                }

                                Ok(_) => {}
                            }
                        }
                        .instrument(span)
                        .await
                    });

                    debug!(?handle);

                    continue;
                }

                v = set.join_next(), if !set.is_empty() => {
                    debug!(?v);
                }

                Ok(message) = interrupts.recv() => {
                    debug!(?message);
                    break;
                }
            }
        }

        while !set.is_empty() {
            debug!(len = set.len());

            _ = set.join_next().await;
        }

        Ok(())
    }

    async fn stream_handler(&mut self, mut stream: TcpStream) -> Result<()> {
        debug!(?stream);

        let mut size = [0u8; 4];

        loop {
            _ = stream
                .read_exact(&mut size)
                .await
                .inspect_err(|error| match error.kind() {
                    ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset => (),

                    _ => error!(?error),
                })?;

            if i32::from_be_bytes(size) == 0 {
                info!("empty read!");
                continue;
            }

            let mut request: Vec<u8> = vec![0u8; i32::from_be_bytes(size) as usize + size.len()];
            request[0..4].copy_from_slice(&size[..]);

            _ = stream
                .read_exact(&mut request[4..])
                .await
                .inspect_err(|error| error!(?size, ?error))?;
            debug!(?request);

            let response = self
                .process_request(&request)
                .await
                .inspect_err(|error| error!(?request, ?error))?;
            debug!(?response);

            stream
                .write_all(&response)
                .await
                .inspect_err(|error| error!(?error))?;
        }
    }

    async fn process_request(&mut self, input: &[u8]) -> Result<Bytes> {
        match Frame::request_from_bytes(input)? {
            Frame {
                header:
                    Header::Request {
                        api_key,
                        api_version,
                        correlation_id,
                    },
                body,
                ..
            } => {
                let span = span!(
                    Level::DEBUG,
                    "request",
                    api_key,
                    api_version,
                    correlation_id
                );

                async move {
                    Frame::response(
                        Header::Response { correlation_id },
                        self.response_for(body)
                            .await
                            .inspect(|body| debug!(?body))
                            .inspect_err(|err| error!(?err))?,
                    )
                    .map_err(Into::into)
                }
                .instrument(span)
                .await
            }

            _ => Err(Error::Api(ErrorCode::InvalidRequest)),
        }
    }

    pub async fn response_for(&mut self, body: Body) -> Result<Body> {
        debug!(?body);

        match body {
            Body::CreateTopicRequest(create) => {
                create_topic::CreateTopic::with_storage(self.storage.clone())
                    .response(&create.name, create.num_partitions)
                    .await
            }

            Body::MetadataRequest(metadata) => {
                metadata::MetadataRequest::with_storage(self.storage.clone())
                    .response(metadata.topics.as_deref())
                    .await
            }

            Body::ProduceRequest(produce) => {
                produce::ProduceRequest::with_storage(self.storage.clone())
                    .router(self.router.clone())
                    .response(&produce.topic, produce.partition, produce.records)
                    .await
            }

            Body::FetchRequest(fetch) => fetch::FetchRequest::with_storage(self.storage.clone())
                .response(
                    &fetch.topic,
                    fetch.partition,
                    fetch.fetch_offset,
                    fetch.max_records,
                    fetch.max_wait_ms,
                )
                .await,

            Body::ListOffsetsRequest(list_offsets) => {
                list_offsets::ListOffsetsRequest::with_storage(self.storage.clone())
                    .response(&list_offsets.topic, list_offsets.partition, list_offsets.at)
                    .await
            }

            Body::FindCoordinatorRequest(find_coordinator) => {
                debug!(group_id = find_coordinator.group_id);

                Ok(FindCoordinatorResponse {
                    error_code: ErrorCode::None.into(),
                    host: self
                        .advertised_listener
                        .host_str()
                        .unwrap_or("localhost")
                        .to_owned(),
                    port: i32::from(self.advertised_listener.port().unwrap_or(9092)),
                }
                .into())
            }

            Body::JoinGroupRequest(join) => {
                self.groups
                    .join(
                        &join.group_id,
                        &join.member_id,
                        &join.topics,
                        join.session_timeout_ms,
                    )
                    .await
            }

            Body::HeartbeatRequest(heartbeat) => {
                self.groups
                    .heartbeat(
                        &heartbeat.group_id,
                        heartbeat.generation_id,
                        &heartbeat.member_id,
                    )
                    .await
            }

            Body::LeaveGroupRequest(leave) => {
                self.groups.leave(&leave.group_id, &leave.member_id).await
            }

            Body::OffsetCommitRequest(commit) => {
                self.groups
                    .offset_commit(
                        &commit.group_id,
                        commit.generation_id,
                        &commit.member_id,
                        &commit.offsets,
                    )
                    .await
            }

            Body::OffsetFetchRequest(fetch) => {
                self.groups
                    .offset_fetch(&fetch.group_id, &fetch.topitions)
                    .await
            }

            Body::PublishRequest(publish) => {
                pubsub::Publish::with_storage(self.storage.clone())
                    .router(self.router.clone())
                    .response(&publish.topic, publish.partition, publish.key, publish.value)
                    .await
            }

            Body::SubscribeRequest(subscribe) => {
                pubsub::Subscribe::with_subscriptions(self.subscriptions.clone())
                    .response(&subscribe.topic, &subscribe.subscription)
                    .await
            }

            Body::ReceiveRequest(receive) => {
                pubsub::Receive::with_storage(self.storage.clone())
                    .subscriptions(self.subscriptions.clone())
                    .response(
                        &receive.topic,
                        &receive.subscription,
                        receive.max_records,
                        receive.max_wait_ms,
                    )
                    .await
            }

            Body::AcknowledgeRequest(acknowledge) => {
                pubsub::Acknowledge::with_storage(self.storage.clone())
                    .response(
                        &acknowledge.topic,
                        &acknowledge.subscription,
                        &acknowledge.acknowledgments,
                    )
                    .await
            }

            otherwise => {
                debug!(?otherwise);

                Err(Error::Api(ErrorCode::InvalidRequest))
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Protocol {
    ConsumerGroup,
    PubSub,
}
