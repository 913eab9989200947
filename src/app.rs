use std::path::PathBuf;

use chrono::Local;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use taxy::{Flow, HistoryClient, RideHistory, Token, TokenStore};

use crate::config::Config;
use crate::export;
use crate::retry::RetryPolicy;

/// Which branch a run takes, from the presence of a stored token and a
/// callback url argument. A stored token always wins: the url argument only
/// matters while no token pair is cached yet.
#[derive(Debug)]
pub enum Launch {
    Authorize,
    Exchange(String),
    Refresh(Token),
}

pub fn decide(stored: Option<Token>, callback_url: Option<String>) -> Launch {
    match (stored, callback_url) {
        (Some(token), _) => Launch::Refresh(token),
        (None, Some(url)) => Launch::Exchange(url),
        (None, None) => Launch::Authorize,
    }
}

pub struct App {
    store: TokenStore,
    flow: Flow,
    history: HistoryClient,
    retry: RetryPolicy,
    out_dir: PathBuf,
    open_browser: bool,
}

impl App {
    pub fn new(config: Config) -> Self {
        let store = TokenStore::new(&config.token_path);
        let flow = Flow::new(
            config.credentials,
            config.oauth,
            store.clone(),
            config.pending_path,
        );
        Self {
            store,
            flow,
            history: HistoryClient::new(config.endpoints),
            retry: RetryPolicy::default(),
            out_dir: config.out_dir,
            open_browser: config.open_browser,
        }
    }

    pub async fn run(&self, callback_url: Option<String>) -> Result<()> {
        match decide(self.store.load(), callback_url) {
            Launch::Authorize => self.begin_auth(),
            Launch::Exchange(url) => {
                let token = self
                    .flow
                    .request_access_token(&url)
                    .await
                    .wrap_err("could not complete the sign-in")?;
                println!("Authenticated!");
                self.fetch_and_export(token).await
            }
            Launch::Refresh(stored) => {
                log::info!("refreshing the stored session");
                let token = self.flow.refresh(&stored).await.wrap_err_with(|| {
                    format!(
                        "could not refresh your session; delete {} and run again to sign in from scratch",
                        self.store.path().display()
                    )
                })?;
                self.fetch_and_export(token).await
            }
        }
    }

    /// First invocation of the browser flow: print and open the
    /// authorization url, then stop without touching the history api.
    fn begin_auth(&self) -> Result<()> {
        let url = self.flow.authorization_url()?;

        println!("Opening your browser to sign in...");
        println!("\nIf it does not open, visit this url:\n\n{url}\n");
        println!("After signing in you will land on a blank page. Copy the full");
        println!("url from the address bar and run:");
        println!("\n  robotaxi-history \"PASTE_CALLBACK_URL_HERE\"\n");

        if self.open_browser {
            if let Err(err) = open::that(&url) {
                log::debug!("could not open a browser: {err}");
            }
        }
        Ok(())
    }

    async fn fetch_and_export(&self, token: Token) -> Result<()> {
        let history = self.fetch_with_retry(token).await?;
        if history.is_empty() {
            println!("No ride history found.");
            return Ok(());
        }
        println!("Total rides: {}", history.len());

        let (csv_path, json_path) = export::export_paths(&self.out_dir, Local::now());
        export::write_csv(&history.records, &csv_path)?;
        export::write_json(&history, &json_path)?;

        println!("Exported {} rides to {}", history.len(), csv_path.display());
        println!("Raw JSON saved to {}", json_path.display());
        Ok(())
    }

    /// One refresh-and-retry when the history endpoint rejects the access
    /// token mid-run; any second auth failure is fatal.
    async fn fetch_with_retry(&self, mut token: Token) -> Result<RideHistory> {
        let mut attempt = 0;
        loop {
            match self.history.fetch_all(&token).await {
                Ok(history) => return Ok(history),
                Err(err) if self.retry.should_retry(&err, attempt) => {
                    attempt += 1;
                    log::warn!("access token rejected, refreshing and retrying: {err}");
                    token = self.flow.refresh(&token).await.wrap_err_with(|| {
                        format!(
                            "could not refresh your session; delete {} and run again to sign in from scratch",
                            self.store.path().display()
                        )
                    })?;
                }
                Err(err) => return Err(err).wrap_err("could not fetch your ride history"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token() -> Token {
        Token {
            access_token: "access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires: Local::now() + Duration::hours(8),
        }
    }

    #[test]
    fn decision_table_matches_the_documented_behavior() {
        assert!(matches!(decide(None, None), Launch::Authorize));
        assert!(matches!(
            decide(None, Some("https://cb?code=x".to_string())),
            Launch::Exchange(_)
        ));
        assert!(matches!(decide(Some(token()), None), Launch::Refresh(_)));
        // A stored token wins over a stray callback url.
        assert!(matches!(
            decide(Some(token()), Some("https://cb?code=x".to_string())),
            Launch::Refresh(_)
        ));
    }
}
