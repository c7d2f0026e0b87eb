//! Transport selection and the shared decode/classify pipeline.
//!
//! # Design
//! `prepare` snapshots an endpoint into an owned `Prepared` value: the route,
//! the resolved URL, the merged parameters and headers, and the capabilities.
//! A `Call` re-runs `execute` on that snapshot for every subscription.
//!
//! Both transports end in the same place. They produce either a raw payload
//! or a `Failure` (raw fault plus optional body). `execute` decodes the
//! payload, classifies failures with the client's message key path, and
//! reports them to the error hook.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::classify::classify;
use crate::client::Shared;
use crate::config::{merge_headers, merge_parameters, resolve_url};
use crate::endpoint::{Endpoint, Headers, MockResponse, MultiPart, Parameters};
use crate::error::{ApiError, DecodeError, Fault};
use crate::http::Method;
use crate::keypath;
use crate::{mock, real};

/// Which transport serves an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Mock(MockResponse),
    Real,
}

/// Mock iff mocks are enabled and the endpoint is mockable.
pub fn select<E: Endpoint + ?Sized>(endpoint: &E, mock_enabled: bool) -> Route {
    match endpoint.as_mockable() {
        Some(mockable) if mock_enabled => Route::Mock(mockable.mock_response()),
        _ => Route::Real,
    }
}

/// Owned snapshot of an endpoint, ready to dispatch any number of times.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub(crate) route: Route,
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) parameters: Parameters,
    pub(crate) headers: Headers,
    pub(crate) key_path: Option<String>,
    pub(crate) parts: Option<Vec<MultiPart>>,
}

pub(crate) fn prepare<E: Endpoint + ?Sized>(shared: &Shared, endpoint: &E) -> Prepared {
    Prepared {
        route: select(endpoint, shared.mock_enabled),
        method: endpoint.method(),
        url: resolve_url(&shared.base_url, &endpoint.path()),
        parameters: merge_parameters(&shared.default_parameters, endpoint.parameters()),
        headers: merge_headers(&shared.default_headers, endpoint.headers()),
        key_path: endpoint
            .as_unwrappable()
            .map(|u| u.response_key_path().to_string()),
        parts: endpoint.as_uploadable().map(|u| u.multi_parts()),
    }
}

/// What a transport hands back on success.
#[derive(Debug)]
pub(crate) enum Payload {
    Body(Bytes),
    /// Mock success without a fixture.
    Empty,
}

/// A transport failure before classification.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) fault: Fault,
    pub(crate) body: Option<Bytes>,
}

impl Failure {
    pub(crate) fn new(fault: Fault) -> Self {
        Self { fault, body: None }
    }
}

impl From<DecodeError> for Failure {
    fn from(err: DecodeError) -> Self {
        Failure::new(Fault::other(err))
    }
}

/// Run one dispatch of `prepared` and produce the typed result.
pub(crate) async fn execute<T: DeserializeOwned>(
    shared: &Shared,
    prepared: &Prepared,
) -> Result<T, ApiError> {
    let key_path = prepared.key_path.as_deref();
    let result = match &prepared.route {
        Route::Mock(mock) => mock::respond(mock).await,
        Route::Real => real::send(shared, prepared).await,
    }
    .and_then(|payload| match payload {
        Payload::Body(body) => Ok(keypath::decode::<T>(&body, key_path)?),
        Payload::Empty => Ok(keypath::decode_value::<T>(Value::Null, None)?),
    });

    result.map_err(|failure| {
        let err = classify(
            &failure.fault,
            failure.body.as_deref(),
            shared.error_message_key_path.as_deref(),
        );
        tracing::warn!(
            method = %prepared.method,
            url = %prepared.url,
            kind = err.kind(),
            error = %err,
            "request failed"
        );
        if let Some(hook) = &shared.error_hook {
            hook(&err);
        }
        err
    })
}
