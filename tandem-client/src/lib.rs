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

//! Tandem client.
//!
//! Compatibility clients for both broker protocols: a consumer group
//! `Producer`/`Consumer` pair and a native pub/sub
//! `Publisher`/`Subscriber` pair, configured through Java style
//! property maps.

use std::{fmt, io, num::ParseIntError, result, str::ParseBoolError, sync::Arc};

use bytes::Bytes;
use tandem_sans_io::{Body, ErrorCode, Frame, Header, Request};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;
use url::Url;

pub mod config;
pub mod consumer;
pub mod producer;
pub mod pubsub;

pub use config::Configuration;
pub use consumer::{Consumer, ConsumerRecord};
pub use producer::Producer;
pub use pubsub::{Publisher, Subscriber};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    Api(ErrorCode),
    IllegalState(&'static str),
    Io(Arc<io::Error>),
    Message(String),
    ParseBool(#[from] ParseBoolError),
    ParseInt(#[from] ParseIntError),
    Protocol(#[from] tandem_sans_io::Error),
    UnknownHost(Url),
    UnrecognisedProperty(String),
    Url(#[from] url::ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "{msg}"),
            error => write!(f, "{error:?}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl Error {
    /// A transient broker condition that a retry or a rejoin clears.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Api(error_code) if error_code.is_retriable())
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

const API_VERSION: i16 = 0;

/// A broker connection with a correlation id.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    correlation_id: i32,
}

impl Connection {
    pub async fn open(broker: &Url) -> Result<Self> {
        debug!(%broker);

        let host = broker
            .host_str()
            .ok_or_else(|| Error::UnknownHost(broker.clone()))?;
        let port = broker.port().unwrap_or(9092);

        TcpStream::connect((host, port))
            .await
            .map(|stream| Self {
                stream,
                correlation_id: 0,
            })
            .map_err(Into::into)
    }

    /// Send a request and demarshall its paired response.
    pub async fn call<Q>(&mut self, req: Q) -> Result<Q::Response>
    where
        Q: Request,
        <Q::Response as TryFrom<Body>>::Error: Into<Error>,
    {
        let payload = Frame::request(
            Header::Request {
                api_key: Q::KEY,
                api_version: API_VERSION,
                correlation_id: self.correlation_id,
            },
            req.into(),
        )?;

        self.stream.write_all(&payload[..]).await?;

        let sent = self.correlation_id;
        self.correlation_id += 1;

        let mut size = [0u8; 4];
        _ = self.stream.read_exact(&mut size).await?;

        let mut buffer: Vec<u8> = vec![0u8; i32::from_be_bytes(size) as usize + size.len()];
        buffer[0..size.len()].copy_from_slice(&size[..]);
        _ = self.stream.read_exact(&mut buffer[4..]).await?;

        let frame = Frame::response_from_bytes(Bytes::from(buffer), Q::KEY)?;

        if frame.correlation_id()? != sent {
            return Err(Error::Message(format!(
                "correlation id mismatch: sent {sent}, received {}",
                frame.correlation_id()?
            )));
        }

        Q::Response::try_from(frame.body)
            .map_err(Into::into)
            .inspect(|response| debug!(?response))
    }
}

fn error_code_of(code: i16) -> Result<()> {
    match ErrorCode::try_from(code)? {
        ErrorCode::None => Ok(()),
        error_code => Err(Error::Api(error_code)),
    }
}
