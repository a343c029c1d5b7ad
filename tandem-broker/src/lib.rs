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

//! Tandem broker.
//!
//! One storage engine exposed over two wire protocols on separate
//! listeners: the consumer group protocol and the native pub/sub
//! protocol. Both views observe the same offsets and the same
//! committed positions.

use std::{
    fmt, io,
    net::AddrParseError,
    num::TryFromIntError,
    result,
    sync::{Arc, PoisonError},
    time::Duration,
};

use tandem_sans_io::ErrorCode;
use thiserror::Error;
use tokio::{sync::broadcast::error::SendError, task::JoinError};

pub mod broker;
pub mod coordinator;

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CancelKind {
    Interrupt,
    Terminate,
}

impl From<CancelKind> for Duration {
    fn from(cancellation: CancelKind) -> Self {
        Duration::from_millis(match cancellation {
            CancelKind::Interrupt => 0,
            CancelKind::Terminate => 5_000,
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    AddrParse(#[from] AddrParseError),
    Api(ErrorCode),
    Io(Arc<io::Error>),
    Join(#[from] JoinError),
    Message(String),
    Poison,
    Protocol(#[from] tandem_sans_io::Error),
    Send(#[from] SendError<CancelKind>),
    Storage(#[from] tandem_storage::Error),
    TryFromInt(#[from] TryFromIntError),
    Url(#[from] url::ParseError),
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "{msg}"),
            error => write!(f, "{error:?}"),
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
