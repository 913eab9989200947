pub mod pkce;

pub use pkce::{CodeChallenge, Flow};

use crate::api::{alphabet, uuid, AUTH_BASE_URL, CLIENT_ID, REDIRECT_URI, SCOPES};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
}

impl Credentials {
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("ROBOTAXI_CLIENT_ID")
                .unwrap_or_else(|_| CLIENT_ID.to_string()),
        }
    }
}

/// OAuth2 handler for the identity provider base url, redirect url, scopes,
/// and the per-attempt state param.
#[derive(Debug, Clone)]
pub struct OAuth {
    pub auth_base: String,
    pub redirect: String,
    pub state: String,
    pub scopes: Vec<String>,
}

impl OAuth {
    pub fn new<A, R, S>(auth_base: A, redirect: R, scopes: &[S]) -> Self
    where
        A: Into<String>,
        R: Into<String>,
        S: AsRef<str>,
    {
        Self {
            auth_base: auth_base.into(),
            redirect: redirect.into(),
            state: uuid::<43>(alphabet::STATE),
            scopes: scopes.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("ROBOTAXI_AUTH_URL").unwrap_or_else(|_| AUTH_BASE_URL.to_string()),
            std::env::var("ROBOTAXI_REDIRECT_URI").unwrap_or_else(|_| REDIRECT_URI.to_string()),
            &SCOPES,
        )
    }
}
