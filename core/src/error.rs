//! Error types for the request-execution core.
//!
//! # Design
//! Every failure that reaches application code is an `ApiError`: a fixed
//! six-way taxonomy produced by `classify::classify`. Transport code never
//! builds `ApiError` directly for HTTP or connectivity failures. It reports a
//! raw `Fault` and lets the classifier decide.
//!
//! Underlying causes are held as `Cause` (an `Arc`ed error) so a classified
//! value can be cloned into the error hook, the subscriber and retry
//! operators without losing the source chain.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Shared, clonable underlying error.
#[derive(Clone)]
pub struct Cause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl Cause {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Cause(Arc::new(err))
    }

    /// Wrap a free-form message as a cause.
    pub fn msg(message: impl Into<String>) -> Self {
        Cause::new(Message(message.into()))
    }

    /// Borrow the underlying error, e.g. for `downcast_ref`.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// Classified failure delivered to subscribers and to the error hook.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server answered 401 or 403.
    #[error("authentication error {code}: {message}")]
    Authentication { code: u16, message: String },

    /// The server answered with any other 4xx status.
    #[error("client error {code}: {message}")]
    Client { code: u16, message: String },

    /// The server answered with a 5xx status.
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    /// The host could not be reached.
    #[error("network error{}", fmt_cause(.0))]
    Network(Option<Cause>),

    /// TLS negotiation or certificate pinning failed.
    #[error("ssl error{}", fmt_cause(.0))]
    Ssl(Option<Cause>),

    /// Anything else: decode failures, timeouts, unexpected statuses.
    #[error("uncategorized error{}", fmt_cause(.0))]
    Uncategorized(Option<Cause>),
}

fn fmt_cause(cause: &Option<Cause>) -> String {
    match cause {
        Some(cause) => format!(": {cause}"),
        None => String::new(),
    }
}

impl ApiError {
    /// HTTP status code for the status-bearing variants.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { code, .. }
            | ApiError::Client { code, .. }
            | ApiError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Message extracted from the error body, for the status-bearing variants.
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Authentication { message, .. }
            | ApiError::Client { message, .. }
            | ApiError::Server { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Underlying cause for the cause-bearing variants.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            ApiError::Network(cause) | ApiError::Ssl(cause) | ApiError::Uncategorized(cause) => {
                cause.as_ref()
            }
            _ => None,
        }
    }

    /// Stable name of the variant, used in logs and test vectors.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Authentication { .. } => "authentication",
            ApiError::Client { .. } => "client",
            ApiError::Server { .. } => "server",
            ApiError::Network(_) => "network",
            ApiError::Ssl(_) => "ssl",
            ApiError::Uncategorized(_) => "uncategorized",
        }
    }
}

/// Why a connection never produced an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityKind {
    /// No route to the host: refused, unreachable, DNS failure.
    Offline,
    /// The TLS handshake or certificate validation failed.
    Tls,
}

/// Raw failure reported by a transport, before classification.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The exchange completed with a non-2xx status.
    Status { code: u16 },

    /// The exchange never produced a response.
    Connectivity { kind: ConnectivityKind, cause: Cause },

    /// Already classified by the mock transport.
    Synthesized(ApiError),

    /// Decode failures, timeouts, I/O and everything else.
    Other(Cause),
}

impl Fault {
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Fault::Other(Cause::new(err))
    }
}

/// Failure to turn a response body into the caller's type.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("key path `{0}` not found in response")]
    MissingKeyPath(String),

    #[error("response does not match the expected type: {0}")]
    TypeMismatch(#[source] serde_json::Error),
}

/// Errors returned while building an `ApiClient`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read certificate for `{hostname}`: {source}")]
    CertificateRead {
        hostname: String,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate for `{hostname}` is not a valid X.509 certificate")]
    CertificateInvalid { hostname: String },

    #[error("invalid pin hostname `{0}`")]
    InvalidHostname(String),

    #[error("no tokio runtime available; set one with `Config::runtime`")]
    NoRuntime,

    #[error("cannot start delivery thread: {0}")]
    Delivery(#[source] std::io::Error),

    #[error("cannot build TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error("cannot build certificate verifier: {0}")]
    Verifier(#[from] rustls::client::VerifierBuilderError),

    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("cannot read settings: {0}")]
    SettingsRead(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    SettingsParse(#[from] serde_json::Error),
}
