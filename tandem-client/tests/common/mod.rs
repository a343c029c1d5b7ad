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

#![allow(dead_code)]

use std::{net::TcpListener as StdTcpListener, time::Duration};

use rand::{distr::Alphanumeric, prelude::*, rng};
use tandem_broker::{
    broker::{Broker, Protocol},
    coordinator::group::Controller,
};
use tandem_client::{Error, Result};
use tandem_storage::Memory;
use tokio::{net::TcpStream, sync::broadcast, time::sleep};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

pub(crate) fn init_tracing() -> Result<DefaultGuard> {
    use std::{fs::File, sync::Arc, thread};

    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(
                        format!("{}=debug", env!("CARGO_CRATE_NAME"))
                            .parse()
                            .map_err(|err| Error::Message(format!("{err:?}")))?,
                    )
                    .add_directive(
                        "tandem_broker=debug"
                            .parse()
                            .map_err(|err| Error::Message(format!("{err:?}")))?,
                    ),
            )
            .with_writer(
                thread::current()
                    .name()
                    .ok_or(Error::Message(String::from("unnamed thread")))
                    .and_then(|name| {
                        std::fs::create_dir_all(format!("../logs/{}", env!("CARGO_PKG_NAME")))?;

                        File::create(format!(
                            "../logs/{}/{}::{name}.log",
                            env!("CARGO_PKG_NAME"),
                            env!("CARGO_CRATE_NAME")
                        ))
                        .map_err(Into::into)
                    })
                    .map(Arc::new)?,
            )
            .finish(),
    ))
}

pub(crate) fn alphanumeric_string(length: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn free_port() -> Result<u16> {
    StdTcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(Into::into)
}

pub(crate) struct TestBroker {
    pub listener: Url,
    pub pubsub_listener: Url,
    pub storage: Memory,
    // dropping the sender stops both listeners
    interrupts: broadcast::Sender<tandem_broker::CancelKind>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TestBroker {
    /// Abort both listener tasks, severing every open connection as a
    /// crashed broker would.
    pub(crate) fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// An in-process broker on ephemeral ports, serving both protocols
/// until the test ends.
pub(crate) async fn start_broker() -> Result<TestBroker> {
    let listener = Url::parse(&format!("tcp://127.0.0.1:{}", free_port()?))?;
    let pubsub_listener = Url::parse(&format!("tcp://127.0.0.1:{}", free_port()?))?;

    let storage = Memory::new("tandem", 111);

    let broker = Broker::new(
        111,
        "tandem",
        listener.clone(),
        pubsub_listener.clone(),
        listener.clone(),
        storage.clone(),
        Controller::with_storage(storage.clone()),
        Uuid::new_v4(),
    );

    let (interrupts, consumer_interrupts) = broadcast::channel(16);
    let pubsub_interrupts = interrupts.subscribe();

    let mut handles = Vec::new();

    {
        let broker = broker.clone();
        handles.push(tokio::spawn(async move {
            _ = broker
                .listen(Protocol::ConsumerGroup, consumer_interrupts)
                .await;
        }));
    }

    handles.push(tokio::spawn(async move {
        _ = broker.listen(Protocol::PubSub, pubsub_interrupts).await;
    }));

    for url in [&listener, &pubsub_listener] {
        await_listener(url).await?;
    }

    Ok(TestBroker {
        listener,
        pubsub_listener,
        storage,
        interrupts,
        handles,
    })
}

async fn await_listener(url: &Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::UnknownHost(url.clone()))?;
    let port = url.port().unwrap_or(9092);

    for _ in 0..100 {
        if TcpStream::connect((host, port)).await.is_ok() {
            return Ok(());
        }

        sleep(Duration::from_millis(10)).await;
    }

    Err(Error::Message(format!("broker not listening on {url}")))
}
