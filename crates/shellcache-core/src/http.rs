//! Request and response descriptors exchanged between the worker, the cache
//! store and the network.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::network::NetworkError;
use crate::worker::ClientId;

pub use reqwest::Method;

/// Ordered list of header name/value pairs.
///
/// Names are compared case-insensitively and stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header. Existing values with the same name are kept.
    pub fn append(&mut self, name: &str, value: &str) {
        self.0.push((name.to_ascii_lowercase(), value.to_string()));
    }

    /// Set a header, replacing any existing values with the same name.
    pub fn insert(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        self.0.retain(|(n, _)| *n != name);
        self.0.push((name, value.to_string()));
    }

    /// First value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value.as_ref());
        }
        headers
    }
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    /// The page that issued the request. `None` for navigations that have no
    /// client yet.
    pub client_id: Option<ClientId>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            client_id: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Build a request from a method name and an absolute URL string.
    pub fn parse(method: &str, url: &str) -> Result<Self, NetworkError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| NetworkError::InvalidRequest(format!("invalid method: {}", method)))?;
        let url = Url::parse(url)
            .map_err(|e| NetworkError::InvalidRequest(format!("invalid url {}: {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn from_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Only `GET` is served from or stored into the cache.
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    pub fn cache_key(&self) -> CacheKey {
        let mut url = self.url.clone();
        url.set_fragment(None);
        CacheKey(format!("{} {}", self.method, url))
    }
}

/// Identity of a request inside one cache generation: method plus URL with
/// the fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the key, usable as a file name.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        hash.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A response payload, either fresh from the network or replayed from cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn vary(&self) -> Vary {
        Vary::parse(self.headers.get("vary"))
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parsed `Vary` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vary {
    /// `Vary: *`, the stored response never matches a later request.
    Any,
    /// Lowercased request header names that must match.
    Headers(Vec<String>),
}

impl Vary {
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Vary::Headers(Vec::new());
        };
        let mut names = Vec::new();
        for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                return Vary::Any;
            }
            names.push(name.to_ascii_lowercase());
        }
        Vary::Headers(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));

        headers.insert("content-type", "text/css");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("text/css"));
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let a = Request::get(url("http://localhost/index.html#top"));
        let b = Request::get(url("http://localhost/index.html"));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().as_str(), "GET http://localhost/index.html");
    }

    #[test]
    fn test_cache_key_keeps_query_and_method() {
        let a = Request::get(url("http://localhost/app.js?v=1"));
        let b = Request::get(url("http://localhost/app.js?v=2"));
        assert_ne!(a.cache_key(), b.cache_key());

        let post = Request::new(Method::POST, url("http://localhost/app.js?v=1"));
        assert_ne!(a.cache_key(), post.cache_key());
    }

    #[test]
    fn test_cache_key_digest_is_hex_sha256() {
        let key = Request::get(url("http://localhost/")).cache_key();
        let digest = key.digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, key.digest());
    }

    #[test]
    fn test_request_parse() {
        let req = Request::parse("post", "https://example.com/api").unwrap();
        assert_eq!(req.method, Method::POST);
        assert!(!req.is_read());

        assert!(Request::parse("GET", "not a url").is_err());
        assert!(Request::parse("BAD METHOD", "https://example.com").is_err());
    }

    #[test]
    fn test_only_get_is_read() {
        assert!(Request::get(url("http://localhost/")).is_read());
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
            assert!(!Request::new(method, url("http://localhost/")).is_read());
        }
    }

    #[test]
    fn test_vary_parse() {
        assert_eq!(Vary::parse(None), Vary::Headers(vec![]));
        assert_eq!(
            Vary::parse(Some("Accept-Encoding, Accept-Language")),
            Vary::Headers(vec!["accept-encoding".into(), "accept-language".into()])
        );
        assert_eq!(Vary::parse(Some("accept, *")), Vary::Any);
    }

    #[test]
    fn test_response_is_ok() {
        assert!(Response::new(200, "ok").is_ok());
        assert!(Response::new(204, "").is_ok());
        assert!(!Response::new(304, "").is_ok());
        assert!(!Response::new(404, "missing").is_ok());
    }
}
