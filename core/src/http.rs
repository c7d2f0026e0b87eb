//! HTTP exchange types shared by the transports and the log hook.
//!
//! # Design
//! `HttpRequest` and `HttpResponse` describe what went over the wire as plain
//! owned data. The real transport fills them in after every exchange and hands
//! them to the configured log hook, successful or not.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

/// HTTP method for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// How the request body was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Parameters in the query string, no body.
    Query,
    /// Parameters as a JSON object body.
    Json,
    /// `multipart/form-data` with file parts and string fields.
    Multipart,
}

/// A request as it was sent, after URL resolution and merging.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub encoding: Encoding,
}

/// The response side of an exchange.
///
/// `status` is `None` when no response arrived; `error` then describes the
/// transport failure.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Delete.as_str(), "DELETE");
        assert_eq!(reqwest::Method::from(Method::Patch), reqwest::Method::PATCH);
    }

    #[test]
    fn success_range() {
        let mut response = HttpResponse {
            status: Some(204),
            headers: Vec::new(),
            body: Bytes::new(),
            elapsed: Duration::ZERO,
            error: None,
        };
        assert!(response.is_success());
        response.status = Some(304);
        assert!(!response.is_success());
        response.status = None;
        assert!(!response.is_success());
    }
}
