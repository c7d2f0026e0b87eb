//! Deterministic stand-in for the network.
//!
//! Success replays the fixture (or an empty value when there is none).
//! Error statuses synthesize the fault a real server or network would have
//! produced; the fixture, if any, doubles as the error body so the message
//! key path works exactly as it does against a live server.

use std::io;

use bytes::Bytes;

use crate::endpoint::{Fixture, MockResponse, MockStatus};
use crate::error::{ApiError, Fault};
use crate::transport::{Failure, Payload};

pub(crate) async fn respond(mock: &MockResponse) -> Result<Payload, Failure> {
    let fault = match mock.status {
        MockStatus::Success => {
            return match &mock.fixture {
                Some(fixture) => load(fixture)
                    .await
                    .map(Payload::Body)
                    .map_err(|err| Failure::new(Fault::other(err))),
                None => Ok(Payload::Empty),
            };
        }
        MockStatus::AuthenticationError => Fault::Status { code: 403 },
        MockStatus::ClientError => Fault::Status { code: 400 },
        MockStatus::ServerError => Fault::Status { code: 500 },
        MockStatus::NetworkError => Fault::Synthesized(ApiError::Network(None)),
        MockStatus::SslError => Fault::Synthesized(ApiError::Ssl(None)),
    };

    let body = match &mock.fixture {
        Some(fixture) => load(fixture).await.ok(),
        None => None,
    };
    tracing::debug!(status = ?mock.status, "mock transport synthesized failure");
    Err(Failure { fault, body })
}

async fn load(fixture: &Fixture) -> io::Result<Bytes> {
    match fixture {
        Fixture::File(path) => tokio::fs::read(path).await.map(Bytes::from),
        Fixture::Inline(bytes) => Ok(bytes.clone()),
    }
}
