use std::path::PathBuf;

use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};

use super::{Credentials, OAuth};
use crate::api::auth::{PendingAuth, Token, TokenStore};
use crate::api::{alphabet, uuid, ApiRequest};
use crate::Error;

#[derive(Debug, Clone)]
pub struct CodeChallenge {
    pub(crate) challenge: String,
    pub(crate) verifier: String,
}

impl CodeChallenge {
    fn sha256<S: AsRef<[u8]>>(value: S) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(value);
        hasher.finalize().to_vec()
    }

    fn base64encode<S: AsRef<[u8]>>(value: S) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value)
    }

    pub fn new() -> Self {
        Self::from_verifier(uuid::<43>(alphabet::PKCE))
    }

    pub fn from_verifier<S: Into<String>>(verifier: S) -> Self {
        let verifier = verifier.into();
        let challenge = Self::base64encode(Self::sha256(&verifier));
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl Default for CodeChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// Authorization-code grant with PKCE, split across two process runs: the
/// first builds the authorization url and parks the verifier on disk, the
/// second trades the pasted callback url for a token pair.
#[derive(Debug, Clone)]
pub struct Flow {
    pub credentials: Credentials,
    pub oauth: OAuth,
    store: TokenStore,
    pending: PathBuf,
}

impl Flow {
    pub fn new(
        credentials: Credentials,
        oauth: OAuth,
        store: TokenStore,
        pending: PathBuf,
    ) -> Self {
        Self {
            credentials,
            oauth,
            store,
            pending,
        }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Build the provider's authorization url with a fresh challenge and
    /// persist the verifier for the follow-up invocation.
    pub fn authorization_url(&self) -> Result<String, Error> {
        let code = CodeChallenge::new();
        PendingAuth::new(code.verifier(), self.oauth.state.clone()).save(&self.pending)?;

        Ok(format!(
            "{}/authorize?{}",
            self.oauth.auth_base,
            serde_urlencoded::to_string([
                ("response_type", "code".to_string()),
                ("client_id", self.credentials.client_id.clone()),
                ("redirect_uri", self.oauth.redirect.clone()),
                ("scope", self.oauth.scopes.join(" ")),
                ("state", self.oauth.state.clone()),
                ("code_challenge", code.challenge().to_string()),
                ("code_challenge_method", "S256".to_string()),
            ])?
        ))
    }

    /// Exchange the authorization code from the pasted callback url for a
    /// token pair. The pending verifier is consumed either way.
    pub async fn request_access_token(&self, callback_url: &str) -> Result<Token, Error> {
        let (auth_code, state) = parse_callback(callback_url)?;
        let pending = PendingAuth::load(&self.pending).ok_or_else(|| {
            Error::state("no pending authentication; run without arguments first")
        })?;

        if pending.is_stale() {
            PendingAuth::clear(&self.pending)?;
            return Err(Error::state(
                "pending authentication expired; run without arguments to start over",
            ));
        }
        if let Some(state) = state {
            if state != pending.state {
                PendingAuth::clear(&self.pending)?;
                return Err(Error::state(
                    "state mismatch in callback url; run without arguments to start over",
                ));
            }
        }

        let body = serde_urlencoded::to_string([
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.credentials.client_id.clone()),
            ("code", auth_code),
            ("code_verifier", pending.code_verifier.clone()),
            ("redirect_uri", self.oauth.redirect.clone()),
        ])?;

        let result = ApiRequest::post(format!("{}/token", self.oauth.auth_base))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await;
        PendingAuth::clear(&self.pending)?;

        let token = Token::from_response(&result?.body)?;
        if token.refresh_token.is_some() {
            self.store.save(&token)?;
        } else {
            log::warn!("token response had no refresh token; it will not be cached");
        }
        Ok(token)
    }

    /// Trade the stored refresh token for a fresh access token and persist
    /// the updated pair.
    pub async fn refresh(&self, current: &Token) -> Result<Token, Error> {
        let refresh_token = current
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth {
                code: 401,
                error: "invalid_request".to_string(),
                message: "stored token has no refresh token".to_string(),
            })?;

        let body = serde_urlencoded::to_string([
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.credentials.client_id.clone()),
            ("refresh_token", refresh_token),
        ])?;

        let response = ApiRequest::post(format!("{}/token", self.oauth.auth_base))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let mut token = Token::from_response(&response.body)?;
        if token.refresh_token.is_none() {
            // Some providers rotate the refresh token, some echo nothing.
            token.refresh_token = current.refresh_token.clone();
        }
        self.store.save(&token)?;
        Ok(token)
    }
}

fn parse_callback(callback_url: &str) -> Result<(String, Option<String>), Error> {
    let url = reqwest::Url::parse(callback_url)
        .map_err(|err| Error::state(format!("invalid callback url: {err}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok((
        code.ok_or_else(|| Error::state("no authorization code found in callback url"))?,
        state,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_uses_the_pkce_alphabet() {
        let code = CodeChallenge::new();
        assert_eq!(code.verifier().len(), 43);
        assert!(code
            .verifier()
            .bytes()
            .all(|b| alphabet::PKCE.contains(&b)));
    }

    #[test]
    fn challenge_is_urlsafe_sha256_of_the_verifier() {
        let code = CodeChallenge::from_verifier("wild-verifier-string");
        let expected = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(Sha256::digest("wild-verifier-string"));
        assert_eq!(code.challenge(), expected);
        assert!(!code.challenge().contains('='));
    }

    #[test]
    fn every_attempt_gets_a_fresh_pair() {
        let a = CodeChallenge::new();
        let b = CodeChallenge::new();
        assert_ne!(a.verifier(), b.verifier());
        assert_ne!(a.challenge(), b.challenge());
    }

    #[test]
    fn callback_parsing_picks_out_code_and_state() {
        let (code, state) = parse_callback(
            "https://auth.tesla.com/void/callback?code=abc123&state=xyz&issuer=test",
        )
        .unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state.as_deref(), Some("xyz"));
    }

    #[test]
    fn callback_without_code_is_rejected() {
        assert!(matches!(
            parse_callback("https://auth.tesla.com/void/callback?state=xyz"),
            Err(Error::State(_))
        ));
        assert!(matches!(
            parse_callback("definitely not a url"),
            Err(Error::State(_))
        ));
    }
}
