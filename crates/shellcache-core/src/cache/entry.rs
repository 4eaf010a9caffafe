use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::{CacheKey, Headers, Request, Response, Vary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }
}

/// Human-readable age such as "just now", "5m ago", "2h ago" or "3d ago".
pub fn format_age(cached_at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - cached_at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Request header values a stored response was selected on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaryCapture {
    /// The response carried `Vary: *`.
    Never,
    /// Lowercased header name and the request's value (`None` when absent).
    Headers(Vec<(String, Option<String>)>),
}

impl VaryCapture {
    pub fn capture(vary: Vary, request_headers: &Headers) -> Self {
        match vary {
            Vary::Any => VaryCapture::Never,
            Vary::Headers(names) => VaryCapture::Headers(
                names
                    .into_iter()
                    .map(|name| {
                        let value = request_headers.get(&name).map(str::to_string);
                        (name, value)
                    })
                    .collect(),
            ),
        }
    }

    pub fn matches(&self, request_headers: &Headers) -> bool {
        match self {
            VaryCapture::Never => false,
            VaryCapture::Headers(captured) => captured
                .iter()
                .all(|(name, value)| request_headers.get(name) == value.as_deref()),
        }
    }
}

/// A response stored under the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub key: CacheKey,
    pub url: String,
    pub vary: VaryCapture,
    pub response: Response,
}

impl CachedEntry {
    pub fn new(request: &Request, response: Response) -> Self {
        let vary = VaryCapture::capture(response.vary(), &request.headers);
        Self {
            key: request.cache_key(),
            url: request.url.to_string(),
            vary,
            response,
        }
    }

    pub fn matches(&self, request: &Request) -> bool {
        request.is_read() && request.cache_key() == self.key && self.vary.matches(&request.headers)
    }
}

/// Only `GET` requests may be stored.
pub(crate) fn check_cacheable(request: &Request) -> Result<(), super::StorageError> {
    if request.is_read() {
        Ok(())
    } else {
        Err(super::StorageError::NotCacheable(format!(
            "{} {}",
            request.method, request.url
        )))
    }
}
