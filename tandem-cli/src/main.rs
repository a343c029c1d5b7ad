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

use clap::{Parser, ValueEnum};
use tandem_broker::{Result, broker::Broker, coordinator::group::Controller};
use tandem_sans_io::ErrorCode;
use tandem_storage::Memory;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan, prelude::*};
use url::Url;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
enum TracingFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Parser)]
#[command(version, about = "tandem broker", long_about = None)]
struct Arg {
    /// All members of the same cluster should use the same id
    #[arg(long, env = "CLUSTER_ID", default_value = "tandem_cluster")]
    cluster_id: String,

    /// Node id of this broker
    #[arg(long, env = "NODE_ID", default_value_t = 111)]
    node_id: i32,

    /// The consumer group protocol listens on this address
    #[arg(long, env = "LISTENER_URL", default_value = "tcp://0.0.0.0:9092")]
    listener_url: Url,

    /// The pub/sub protocol listens on this address
    #[arg(
        long,
        env = "PUBSUB_LISTENER_URL",
        default_value = "tcp://0.0.0.0:6650"
    )]
    pubsub_listener_url: Url,

    /// This location is advertised to clients asking for their
    /// coordinator
    #[arg(
        long,
        env = "ADVERTISED_LISTENER_URL",
        default_value = "tcp://localhost:9092"
    )]
    advertised_listener_url: Url,

    #[arg(long, env = "TRACING_FORMAT", default_value = "text")]
    tracing_format: TracingFormat,
}

#[tokio::main]
async fn main() -> Result<ErrorCode> {
    let arg = Arg::parse();

    match arg.tracing_format {
        TracingFormat::Text => tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_level(true)
                    .with_line_number(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::NONE),
            )
            .init(),

        TracingFormat::Json => tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    debug!(?arg);

    let storage = Memory::new(arg.cluster_id.clone(), arg.node_id);

    Broker::new(
        arg.node_id,
        &arg.cluster_id,
        arg.listener_url,
        arg.pubsub_listener_url,
        arg.advertised_listener_url,
        storage.clone(),
        Controller::with_storage(storage),
        Uuid::new_v4(),
    )
    .main()
    .await
}
