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

//! Tandem wire protocol, sans-io.
//!
//! Both protocol views of the log share one frame layout: a big endian
//! `i32` size prefix, a request or response [`Header`], and a [`Body`].
//! Consumer group apis live in [`consumer`], native pub/sub apis in
//! [`pubsub`]. Nothing in this crate performs io.

use std::{
    fmt::{self, Debug, Display, Formatter},
    process::{ExitCode, Termination},
    result,
    string::FromUtf8Error,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub mod consumer;
mod primitive;
pub mod pubsub;
mod record;

pub use record::Record;

pub use consumer::{
    CreateTopicRequest, CreateTopicResponse, FetchRequest, FetchResponse, FindCoordinatorRequest,
    FindCoordinatorResponse, HeartbeatRequest, HeartbeatResponse, JoinGroupRequest,
    JoinGroupResponse, LeaveGroupRequest, LeaveGroupResponse, ListOffset, ListOffsetsRequest,
    ListOffsetsResponse, MetadataRequest, MetadataResponse, MetadataResponseTopic,
    OffsetCommitRequest, OffsetCommitResponse, OffsetCommitResult, OffsetCommitTopition,
    OffsetFetchRequest, OffsetFetchResponse, OffsetFetchResult, OffsetFetchTopition,
    ProduceRecord, ProduceRequest, ProduceResponse, TopicPartitions,
};
pub use pubsub::{
    AcknowledgeRequest, AcknowledgeResponse, Acknowledgment, PublishRequest, PublishResponse,
    ReceiveRequest, ReceiveResponse, ReceivedRecord, SubscribeRequest, SubscribeResponse,
};

/// Wire protocol errors.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    ExpectedRequestHeader,
    ExpectedResponseHeader,
    Incomplete { needed: usize, remaining: usize },
    NullArray,
    NullString,
    StringTooLong(usize),
    UnexpectedBody(Box<Body>),
    UnknownApiKey(i16),
    UnknownErrorCode(i16),
    UnknownListOffset(i8),
    Utf8(#[from] FromUtf8Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// Response error codes shared by both protocol adapters.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum ErrorCode {
    UnknownServerError,
    #[default]
    None,
    OffsetOutOfRange,
    UnknownTopicOrPartition,
    NotCoordinator,
    IllegalGeneration,
    UnknownMemberId,
    RebalanceInProgress,
    TopicAlreadyExists,
    InvalidRequest,
}

impl ErrorCode {
    /// Whether a client may retry the request that produced this code.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RebalanceInProgress | Self::NotCoordinator | Self::UnknownTopicOrPartition
        )
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Termination for ErrorCode {
    fn report(self) -> ExitCode {
        if let Self::None = self {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

impl From<ErrorCode> for i16 {
    fn from(value: ErrorCode) -> Self {
        match value {
            ErrorCode::UnknownServerError => -1,
            ErrorCode::None => 0,
            ErrorCode::OffsetOutOfRange => 1,
            ErrorCode::UnknownTopicOrPartition => 3,
            ErrorCode::NotCoordinator => 16,
            ErrorCode::IllegalGeneration => 22,
            ErrorCode::UnknownMemberId => 25,
            ErrorCode::RebalanceInProgress => 27,
            ErrorCode::TopicAlreadyExists => 36,
            ErrorCode::InvalidRequest => 42,
        }
    }
}

impl TryFrom<i16> for ErrorCode {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self> {
        match value {
            -1 => Ok(Self::UnknownServerError),
            0 => Ok(Self::None),
            1 => Ok(Self::OffsetOutOfRange),
            3 => Ok(Self::UnknownTopicOrPartition),
            16 => Ok(Self::NotCoordinator),
            22 => Ok(Self::IllegalGeneration),
            25 => Ok(Self::UnknownMemberId),
            27 => Ok(Self::RebalanceInProgress),
            36 => Ok(Self::TopicAlreadyExists),
            42 => Ok(Self::InvalidRequest),
            otherwise => Err(Error::UnknownErrorCode(otherwise)),
        }
    }
}

/// A request, with its api key and paired response type.
pub trait Request: TryFrom<Body, Error = Error> + Into<Body> + Debug + Send {
    const KEY: i16;

    type Response: TryFrom<Body, Error = Error> + Into<Body> + Debug + Send;
}

/// Frame header, correlating responses with their requests.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Header {
    Request {
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
    },

    Response {
        correlation_id: i32,
    },
}

macro_rules! body {
    ($($variant:ident),+ $(,)?) => {
        /// A decoded request or response body.
        #[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub enum Body {
            $($variant($variant),)+
        }

        impl Body {
            fn encode(&self, buf: &mut BytesMut) -> Result<()> {
                match self {
                    $(Self::$variant(inner) => inner.encode(buf),)+
                }
            }
        }

        $(
            impl From<$variant> for Body {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }

            impl TryFrom<Body> for $variant {
                type Error = Error;

                fn try_from(value: Body) -> Result<Self> {
                    if let Body::$variant(inner) = value {
                        Ok(inner)
                    } else {
                        Err(Error::UnexpectedBody(Box::new(value)))
                    }
                }
            }
        )+
    };
}

body!(
    CreateTopicRequest,
    CreateTopicResponse,
    MetadataRequest,
    MetadataResponse,
    ProduceRequest,
    ProduceResponse,
    FetchRequest,
    FetchResponse,
    ListOffsetsRequest,
    ListOffsetsResponse,
    FindCoordinatorRequest,
    FindCoordinatorResponse,
    JoinGroupRequest,
    JoinGroupResponse,
    HeartbeatRequest,
    HeartbeatResponse,
    LeaveGroupRequest,
    LeaveGroupResponse,
    OffsetCommitRequest,
    OffsetCommitResponse,
    OffsetFetchRequest,
    OffsetFetchResponse,
    PublishRequest,
    PublishResponse,
    SubscribeRequest,
    SubscribeResponse,
    ReceiveRequest,
    ReceiveResponse,
    AcknowledgeRequest,
    AcknowledgeResponse,
);

macro_rules! api {
    ($($request:ident => $response:ident = $key:expr),+ $(,)?) => {
        $(
            impl Request for $request {
                const KEY: i16 = $key;

                type Response = $response;
            }
        )+

        impl Body {
            fn decode_request(api_key: i16, buf: &mut impl Buf) -> Result<Self> {
                match api_key {
                    $($key => $request::decode(buf).map(Self::from),)+
                    otherwise => Err(Error::UnknownApiKey(otherwise)),
                }
            }

            fn decode_response(api_key: i16, buf: &mut impl Buf) -> Result<Self> {
                match api_key {
                    $($key => $response::decode(buf).map(Self::from),)+
                    otherwise => Err(Error::UnknownApiKey(otherwise)),
                }
            }
        }
    };
}

api!(
    CreateTopicRequest => CreateTopicResponse = 1,
    MetadataRequest => MetadataResponse = 2,
    ProduceRequest => ProduceResponse = 3,
    FetchRequest => FetchResponse = 4,
    ListOffsetsRequest => ListOffsetsResponse = 5,
    FindCoordinatorRequest => FindCoordinatorResponse = 6,
    JoinGroupRequest => JoinGroupResponse = 7,
    HeartbeatRequest => HeartbeatResponse = 8,
    LeaveGroupRequest => LeaveGroupResponse = 9,
    OffsetCommitRequest => OffsetCommitResponse = 10,
    OffsetFetchRequest => OffsetFetchResponse = 11,
    PublishRequest => PublishResponse = 32,
    SubscribeRequest => SubscribeResponse = 33,
    ReceiveRequest => ReceiveResponse = 34,
    AcknowledgeRequest => AcknowledgeResponse = 35,
);

/// A size prefixed frame.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Frame {
    pub size: i32,
    pub header: Header,
    pub body: Body,
}

impl Frame {
    pub fn api_key(&self) -> Result<i16> {
        match self.header {
            Header::Request { api_key, .. } => Ok(api_key),
            Header::Response { .. } => Err(Error::ExpectedRequestHeader),
        }
    }

    pub fn correlation_id(&self) -> Result<i32> {
        match self.header {
            Header::Request { correlation_id, .. } | Header::Response { correlation_id } => {
                Ok(correlation_id)
            }
        }
    }

    /// Marshall a request into a size prefixed byte sequence.
    pub fn request(header: Header, body: Body) -> Result<Bytes> {
        let Header::Request {
            api_key,
            api_version,
            correlation_id,
        } = header
        else {
            return Err(Error::ExpectedRequestHeader);
        };

        let mut payload = BytesMut::new();
        payload.put_i16(api_key);
        payload.put_i16(api_version);
        payload.put_i32(correlation_id);
        body.encode(&mut payload)?;

        Ok(prefixed(payload))
    }

    /// Marshall a response into a size prefixed byte sequence.
    pub fn response(header: Header, body: Body) -> Result<Bytes> {
        let Header::Response { correlation_id } = header else {
            return Err(Error::ExpectedResponseHeader);
        };

        let mut payload = BytesMut::new();
        payload.put_i32(correlation_id);
        body.encode(&mut payload)?;

        Ok(prefixed(payload))
    }

    /// Demarshall a size prefixed request frame.
    pub fn request_from_bytes(mut encoded: impl Buf) -> Result<Self> {
        let size = primitive::get_i32(&mut encoded)?;
        let api_key = primitive::get_i16(&mut encoded)?;
        let api_version = primitive::get_i16(&mut encoded)?;
        let correlation_id = primitive::get_i32(&mut encoded)?;

        Body::decode_request(api_key, &mut encoded).map(|body| Self {
            size,
            header: Header::Request {
                api_key,
                api_version,
                correlation_id,
            },
            body,
        })
    }

    /// Demarshall a size prefixed response frame, with the api key of
    /// the originating request.
    pub fn response_from_bytes(mut encoded: impl Buf, api_key: i16) -> Result<Self> {
        let size = primitive::get_i32(&mut encoded)?;
        let correlation_id = primitive::get_i32(&mut encoded)?;

        Body::decode_response(api_key, &mut encoded).map(|body| Self {
            size,
            header: Header::Response { correlation_id },
            body,
        })
    }
}

fn prefixed(payload: BytesMut) -> Bytes {
    let mut frame = BytesMut::with_capacity(payload.len() + size_of::<i32>());
    frame.put_i32(payload.len() as i32);
    frame.extend_from_slice(&payload);
    frame.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_frame_round_trip() -> Result<()> {
        let body = Body::from(
            FetchRequest::default()
                .topic("alpha")
                .partition(3)
                .fetch_offset(21)
                .max_records(100)
                .max_wait_ms(50),
        );

        let encoded = Frame::request(
            Header::Request {
                api_key: FetchRequest::KEY,
                api_version: 0,
                correlation_id: 12,
            },
            body.clone(),
        )?;

        let frame = Frame::request_from_bytes(encoded)?;
        assert_eq!(FetchRequest::KEY, frame.api_key()?);
        assert_eq!(12, frame.correlation_id()?);
        assert_eq!(body, frame.body);
        Ok(())
    }

    #[test]
    fn response_frame_round_trip() -> Result<()> {
        let body = Body::from(HeartbeatResponse {
            error_code: ErrorCode::RebalanceInProgress.into(),
        });

        let encoded = Frame::response(Header::Response { correlation_id: 7 }, body.clone())?;

        let frame = Frame::response_from_bytes(encoded, HeartbeatRequest::KEY)?;
        assert_eq!(7, frame.correlation_id()?);
        assert_eq!(body, frame.body);
        Ok(())
    }

    #[test]
    fn mismatched_body_conversion() {
        let body = Body::from(HeartbeatResponse::default());

        assert!(matches!(
            FetchResponse::try_from(body),
            Err(Error::UnexpectedBody(_))
        ));
    }

    #[test]
    fn error_code_round_trip() -> Result<()> {
        for code in [
            ErrorCode::UnknownServerError,
            ErrorCode::None,
            ErrorCode::OffsetOutOfRange,
            ErrorCode::UnknownTopicOrPartition,
            ErrorCode::NotCoordinator,
            ErrorCode::IllegalGeneration,
            ErrorCode::UnknownMemberId,
            ErrorCode::RebalanceInProgress,
            ErrorCode::TopicAlreadyExists,
            ErrorCode::InvalidRequest,
        ] {
            assert_eq!(code, ErrorCode::try_from(i16::from(code))?);
        }

        Ok(())
    }
}
