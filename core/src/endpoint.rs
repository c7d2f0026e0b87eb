//! Endpoint descriptors and their optional capabilities.
//!
//! # Design
//! An endpoint is anything implementing `Endpoint`. Optional behaviour
//! (unwrapping a response envelope, replaying a mock, uploading files) lives in
//! separate capability traits. The dispatcher asks for a capability through
//! the `as_*` accessors, which return `None` unless the endpoint opts in:
//!
//! ```
//! use restcall_core::{Endpoint, Method, Unwrappable};
//!
//! struct SearchUsers { query: String }
//!
//! impl Endpoint for SearchUsers {
//!     fn path(&self) -> String { "/search/users".to_string() }
//!     fn method(&self) -> Method { Method::Get }
//!     fn as_unwrappable(&self) -> Option<&dyn Unwrappable> { Some(self) }
//! }
//!
//! impl Unwrappable for SearchUsers {
//!     fn response_key_path(&self) -> &str { "items" }
//! }
//! ```
//!
//! `Request` is a ready-made descriptor for callers that prefer data over
//! trait impls.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use serde_json::Value;

use crate::http::Method;

/// Request parameters: a JSON object.
pub type Parameters = serde_json::Map<String, Value>;

/// Request headers.
pub type Headers = BTreeMap<String, String>;

/// Description of one API call.
pub trait Endpoint: Send + Sync {
    /// Absolute URL, or a path appended to the configured base URL.
    fn path(&self) -> String;

    fn method(&self) -> Method;

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn headers(&self) -> Headers {
        Headers::new()
    }

    fn as_unwrappable(&self) -> Option<&dyn Unwrappable> {
        None
    }

    fn as_mockable(&self) -> Option<&dyn Mockable> {
        None
    }

    fn as_uploadable(&self) -> Option<&dyn Uploadable> {
        None
    }
}

/// The payload lives under a key path inside the response document.
pub trait Unwrappable {
    fn response_key_path(&self) -> &str;
}

/// The endpoint can be answered by the mock transport.
pub trait Mockable {
    fn mock_response(&self) -> MockResponse;
}

/// The endpoint uploads files as `multipart/form-data`.
pub trait Uploadable {
    fn multi_parts(&self) -> Vec<MultiPart>;
}

/// One file part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPart {
    pub data: Bytes,
    pub name: String,
    pub filename: String,
    pub mime_type: String,
}

impl MultiPart {
    pub fn new(
        data: impl Into<Bytes>,
        name: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Common MIME type strings for multipart uploads.
pub mod mime {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_HTML: &str = "text/html";
    pub const TEXT_CSS: &str = "text/css";
    pub const TEXT_JAVASCRIPT: &str = "text/javascript";
    pub const IMAGE_GIF: &str = "image/gif";
    pub const IMAGE_PNG: &str = "image/png";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_BMP: &str = "image/bmp";
    pub const IMAGE_WEBP: &str = "image/webp";
    pub const AUDIO_MIDI: &str = "audio/midi";
    pub const AUDIO_MPEG: &str = "audio/mpeg";
    pub const AUDIO_WEBM: &str = "audio/webm";
    pub const AUDIO_OGG: &str = "audio/ogg";
    pub const AUDIO_WAV: &str = "audio/wav";
    pub const VIDEO_WEBM: &str = "video/webm";
    pub const VIDEO_OGG: &str = "video/ogg";
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
    pub const APPLICATION_PDF: &str = "application/pdf";
    pub const APPLICATION_PKCS12: &str = "application/pkcs12";
    pub const APPLICATION_POWERPOINT: &str = "application/vnd.mspowerpoint";
    pub const APPLICATION_XHTML: &str = "application/xhtml+xml";
    pub const APPLICATION_XML: &str = "application/xml";
}

/// Outcome the mock transport should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockStatus {
    #[default]
    Success,
    AuthenticationError,
    ClientError,
    ServerError,
    NetworkError,
    SslError,
}

/// Where a mock fixture's JSON comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fixture {
    File(PathBuf),
    Inline(Bytes),
}

/// Canned answer for a mockable endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockResponse {
    pub fixture: Option<Fixture>,
    pub status: MockStatus,
}

impl MockResponse {
    /// Success without a fixture: decodes as an empty value.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            fixture: Some(Fixture::File(path.into())),
            status: MockStatus::Success,
        }
    }

    pub fn inline(json: impl Into<Bytes>) -> Self {
        Self {
            fixture: Some(Fixture::Inline(json.into())),
            status: MockStatus::Success,
        }
    }

    pub fn error(status: MockStatus) -> Self {
        Self {
            fixture: None,
            status,
        }
    }

    pub fn with_status(mut self, status: MockStatus) -> Self {
        self.status = status;
        self
    }
}

/// A data-only `Endpoint` with every capability available on demand.
///
/// Capabilities are present only when the corresponding `with_*` method was
/// called.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    parameters: Parameters,
    headers: Headers,
    response_key_path: Option<String>,
    mock_response: Option<MockResponse>,
    multi_parts: Option<Vec<MultiPart>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            parameters: Parameters::new(),
            headers: Headers::new(),
            response_key_path: None,
            mock_response: None,
            multi_parts: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_response_key_path(mut self, path: impl Into<String>) -> Self {
        self.response_key_path = Some(path.into());
        self
    }

    pub fn with_mock(mut self, mock: MockResponse) -> Self {
        self.mock_response = Some(mock);
        self
    }

    pub fn with_part(mut self, part: MultiPart) -> Self {
        self.multi_parts.get_or_insert_with(Vec::new).push(part);
        self
    }
}

impl Endpoint for Request {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn method(&self) -> Method {
        self.method
    }

    fn parameters(&self) -> Parameters {
        self.parameters.clone()
    }

    fn headers(&self) -> Headers {
        self.headers.clone()
    }

    fn as_unwrappable(&self) -> Option<&dyn Unwrappable> {
        self.response_key_path.as_ref().map(|_| self as &dyn Unwrappable)
    }

    fn as_mockable(&self) -> Option<&dyn Mockable> {
        self.mock_response.as_ref().map(|_| self as &dyn Mockable)
    }

    fn as_uploadable(&self) -> Option<&dyn Uploadable> {
        self.multi_parts.as_ref().map(|_| self as &dyn Uploadable)
    }
}

impl Unwrappable for Request {
    fn response_key_path(&self) -> &str {
        self.response_key_path.as_deref().unwrap_or_default()
    }
}

impl Mockable for Request {
    fn mock_response(&self) -> MockResponse {
        self.mock_response.clone().unwrap_or_default()
    }
}

impl Uploadable for Request {
    fn multi_parts(&self) -> Vec<MultiPart> {
        self.multi_parts.clone().unwrap_or_default()
    }
}
