//! Requests, responses and the identity used as the cache key.

use std::fmt;

use bytes::Bytes;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An outgoing request issued by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    url: Url,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Browser extension schemes (`chrome-extension:`, `moz-extension:`, ...).
    pub fn is_extension_scheme(&self) -> bool {
        self.url.scheme().ends_with("-extension")
    }

    pub fn identity(&self) -> RequestIdentity {
        let mut url = self.url.clone();
        url.set_fragment(None);
        RequestIdentity {
            method: self.method.as_str().to_string(),
            url: url.to_string(),
        }
    }
}

/// The (method, URL) pair a stored response is keyed by. Fragments are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub method: String,
    pub url: String,
}

impl RequestIdentity {
    /// Deterministic file-system key: first 16 bytes of SHA256, hex encoded.
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// How a response relates to the application's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin
    Basic,
    /// Cross-origin, readable
    Cors,
    /// Cross-origin, unreadable
    Opaque,
    Error,
}

/// A fully buffered response.
///
/// The body is reference counted, so [`Response::duplicate`] yields an
/// independent copy without re-reading the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 2xx status.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Same-origin 200 responses are the only ones worth storing.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    pub fn duplicate(&self) -> Response {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_identity_ignores_fragment() {
        let a = Request::get(url("https://app.test/index.html#top"));
        let b = Request::get(url("https://app.test/index.html"));
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().key(), b.identity().key());
    }

    #[test]
    fn test_identity_includes_method() {
        let get = Request::get(url("https://app.test/api"));
        let post = Request::new(Method::POST, url("https://app.test/api"));
        assert_ne!(get.identity().key(), post.identity().key());
    }

    #[test]
    fn test_key_is_32_hex_chars() {
        let key = Request::get(url("https://app.test/")).identity().key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_extension_scheme_detection() {
        assert!(Request::get(url("chrome-extension://abc/script.js")).is_extension_scheme());
        assert!(Request::get(url("moz-extension://abc/script.js")).is_extension_scheme());
        assert!(!Request::get(url("https://app.test/app.js")).is_extension_scheme());
    }

    #[test]
    fn test_cacheable_responses() {
        assert!(Response::new(200, "ok").is_cacheable());
        assert!(!Response::new(404, "missing").is_cacheable());
        assert!(!Response::new(206, "partial").is_cacheable());
        assert!(!Response::new(200, "ok")
            .with_type(ResponseType::Cors)
            .is_cacheable());
        assert!(!Response::new(200, "ok")
            .with_type(ResponseType::Opaque)
            .is_cacheable());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = Response::new(200, "x").with_header("Content-Type", "text/html");
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_duplicate_is_independent_copy() {
        let original = Response::new(200, "body");
        let copy = original.duplicate();
        drop(original);
        assert_eq!(copy.body, Bytes::from_static(b"body"));
    }
}
