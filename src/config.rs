use std::path::PathBuf;

use taxy::{Credentials, Endpoints, OAuth, PendingAuth, TokenStore};

/// Everything the run needs, resolved once in `main` and passed down; no
/// module reads the environment or the home directory behind this.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub oauth: OAuth,
    pub endpoints: Endpoints,
    pub token_path: PathBuf,
    pub pending_path: PathBuf,
    pub out_dir: PathBuf,
    pub open_browser: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            credentials: Credentials::from_env(),
            oauth: OAuth::from_env(),
            endpoints: Endpoints::from_env(),
            token_path: env_path("ROBOTAXI_TOKEN_FILE").unwrap_or_else(TokenStore::default_path),
            pending_path: env_path("ROBOTAXI_PKCE_FILE").unwrap_or_else(PendingAuth::default_path),
            out_dir: PathBuf::from("."),
            open_browser: true,
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).map(PathBuf::from)
}
