use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The identity provider rejected the request: bad or expired
    /// authorization code, revoked refresh token, or a rejected access token.
    #[error("authentication failed ({code}) {error}: {message}")]
    Auth {
        code: u16,
        error: String,
        message: String,
    },

    #[error("request failed ({code}): {message}")]
    Request { code: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response at `{path}`: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request: {0}")]
    UrlEncoded(#[from] serde_urlencoded::ser::Error),

    /// The flow was driven out of order: missing authorization code, absent
    /// or expired pending verifier, state mismatch.
    #[error("{0}")]
    State(String),
}

impl Error {
    pub(crate) fn file(path: &Path, source: std::io::Error) -> Self {
        Self::File {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn state<S: Into<String>>(message: S) -> Self {
        Self::State(message.into())
    }

    /// Whether a refreshed access token could repair this failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Json {
            path: ".".to_string(),
            source,
        }
    }
}
