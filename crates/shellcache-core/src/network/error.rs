use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl NetworkError {
    pub fn transport(url: &url::Url, err: reqwest::Error) -> Self {
        NetworkError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
