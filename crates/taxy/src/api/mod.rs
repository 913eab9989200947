pub mod auth;
pub mod flow;
pub mod history;

use std::fmt::Display;
use std::time::Duration;

use reqwest::header::{HeaderName, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use crate::Error;

pub static AUTH_BASE_URL: &str = "https://auth.tesla.com/oauth2/v3";
pub static CLIENT_ID: &str = "ownerapi";
pub static REDIRECT_URI: &str = "https://auth.tesla.com/void/callback";
pub static SCOPES: [&str; 4] = ["openid", "email", "offline_access", "phone"];

pub(crate) static VENDOR_USER_AGENT: &str = "TeslaApp/4.36.5-2659/abc123/ios/18.0";

/// Wrapper to build and send vendor requests using `reqwest`
pub(crate) struct ApiRequest {
    method: Method,
    url: String,
    headers: Vec<(HeaderName, String)>,
    params: Vec<(String, String)>,
    body: Option<String>,
    bearer: Option<String>,
    timeout: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct ApiResponse {
    #[allow(dead_code)]
    pub status: StatusCode,
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl ApiResponse {
    pub(crate) async fn from_response(response: reqwest::Response) -> Result<Self, Error> {
        let status = response.status();
        let body = String::from_utf8_lossy(&response.bytes().await?).into_owned();

        if status.is_success() {
            return Ok(Self { status, body });
        }

        if let Ok(err) = serde_json::from_str::<ErrorBody>(&body) {
            if let Some(message) = err.error_description {
                return Err(Error::Auth {
                    code: status.as_u16(),
                    error: err.error.unwrap_or_else(|| "invalid_request".to_string()),
                    message,
                });
            }
        }

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(Error::Auth {
                code: status.as_u16(),
                error: "unauthorized".to_string(),
                message: "access token was rejected".to_string(),
            });
        }

        Err(Error::Request {
            code: status.as_u16(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        })
    }
}

impl ApiRequest {
    pub fn new<S: AsRef<str>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.as_ref().to_string(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
            bearer: None,
            timeout: None,
        }
    }

    pub fn get<S: AsRef<str>>(url: S) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post<S: AsRef<str>>(url: S) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header<V: AsRef<str>>(mut self, key: HeaderName, value: V) -> Self {
        self.headers.push((key, value.as_ref().to_string()));
        self
    }

    pub fn param<K: AsRef<str>, V: Display>(mut self, key: K, value: V) -> Self {
        self.params.push((key.as_ref().to_string(), value.to_string()));
        self
    }

    pub fn body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn bearer(mut self, token: &auth::Token) -> Self {
        self.bearer = Some(format!("Bearer {}", token.access()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn send(self) -> Result<ApiResponse, Error> {
        let client = reqwest::Client::new();
        let mut request = match self.method {
            Method::GET => client.get(&self.url),
            Method::POST => client.post(&self.url),
            _ => unimplemented!(),
        };

        if !self.params.is_empty() {
            request = request.query(&self.params);
        }
        for (key, value) in &self.headers {
            request = request.header(key.clone(), value.as_str());
        }
        if let Some(bearer) = &self.bearer {
            request = request.header("Authorization", bearer.as_str());
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = self.body {
            request = request.body(body);
        }

        ApiResponse::from_response(request.send().await?).await
    }
}

pub(crate) fn vendor_headers(request: ApiRequest) -> ApiRequest {
    request
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "*/*")
        .header(ACCEPT_LANGUAGE, "en-US")
        .header(
            HeaderName::from_static("x-tesla-user-agent"),
            VENDOR_USER_AGENT,
        )
}

/// Deserialize a response body, keeping the path to the offending field on
/// failure.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, Error> {
    let mut deserializer = serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| Error::Json {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

pub mod alphabet {
    pub static PKCE: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._~";
    pub static STATE: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";
}

pub fn uuid<const N: usize>(alphabet: &[u8]) -> String {
    debug_assert!(N >= 43);
    debug_assert!(N <= 128);

    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).unwrap();
    let range = alphabet.len();

    buf.iter()
        .map(|b| alphabet[*b as usize % range] as char)
        .collect()
}
