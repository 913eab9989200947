use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::api::parse_json;
use crate::Error;

static DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// How long a pending browser sign-in stays usable before the verifier is
/// discarded and the user has to start over.
pub const PENDING_AUTH_TTL_MINUTES: i64 = 15;

fn serialize_datetime<S>(datetime: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let datetime = datetime.format(DATETIME_FORMAT);
    serializer.serialize_str(datetime.to_string().as_str())
}

fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    let naive = NaiveDateTime::parse_from_str(value.as_str(), DATETIME_FORMAT)
        .map_err(serde::de::Error::custom)?;
    Local
        .from_local_datetime(&naive)
        .latest()
        .ok_or(serde::de::Error::custom("Invalid date"))
}

/// Access/refresh token pair issued by the identity provider.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    #[serde(
        deserialize_with = "deserialize_datetime",
        serialize_with = "serialize_datetime"
    )]
    pub expires: DateTime<Local>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    pub fn access(&self) -> &str {
        &self.access_token
    }

    pub fn ttype(&self) -> &str {
        &self.token_type
    }

    pub fn is_expired(&self) -> bool {
        self.expires <= Local::now()
    }

    pub(crate) fn from_response(body: &str) -> Result<Self, Error> {
        let raw: TokenResponse = parse_json(body)?;
        Ok(Self {
            access_token: raw.access_token,
            token_type: raw.token_type,
            refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
            expires: raw
                .expires_in
                .map(|seconds| Local::now() + Duration::seconds(seconds))
                .unwrap_or_else(Local::now),
        })
    }
}

/// On-disk home of the token pair. Deleting the file is the logout
/// mechanism; nothing in the normal flow removes it.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".robotaxi_tokens.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable token file is a normal first-run condition,
    /// never an error.
    pub fn load(&self) -> Option<Token> {
        let body = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Token>(&body) {
            Ok(token)
                if !token.access_token.is_empty()
                    && token
                        .refresh_token
                        .as_deref()
                        .is_some_and(|t| !t.is_empty()) =>
            {
                Some(token)
            }
            Ok(_) => {
                log::debug!("ignoring token file without a usable token pair");
                None
            }
            Err(err) => {
                log::debug!("ignoring malformed token file: {err}");
                None
            }
        }
    }

    pub fn save(&self, token: &Token) -> Result<(), Error> {
        if token.access_token.is_empty()
            || !token
                .refresh_token
                .as_deref()
                .is_some_and(|t| !t.is_empty())
        {
            return Err(Error::state(
                "refusing to store a token without both access and refresh tokens",
            ));
        }
        write_private(&self.path, &serde_json::to_string_pretty(token)?)
    }

    pub fn delete(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::file(&self.path, err)),
        }
    }
}

/// PKCE verifier persisted between the two invocations of the browser
/// sign-in, consumed and deleted by the second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuth {
    pub code_verifier: String,
    pub state: String,
    #[serde(
        deserialize_with = "deserialize_datetime",
        serialize_with = "serialize_datetime"
    )]
    pub created: DateTime<Local>,
}

impl PendingAuth {
    pub fn new<V: Into<String>, S: Into<String>>(code_verifier: V, state: S) -> Self {
        Self {
            code_verifier: code_verifier.into(),
            state: state.into(),
            created: Local::now(),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".robotaxi_pkce.json")
    }

    pub fn is_stale(&self) -> bool {
        self.created + Duration::minutes(PENDING_AUTH_TTL_MINUTES) <= Local::now()
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        write_private(path, &serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Option<Self> {
        let body = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&body) {
            Ok(pending) => Some(pending),
            Err(err) => {
                log::debug!("ignoring malformed pending auth file: {err}");
                None
            }
        }
    }

    pub fn clear(path: &Path) -> Result<(), Error> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::file(path, err)),
        }
    }
}

/// Owner-only write that lands whole or not at all: the content goes to a
/// sibling temp file first and is renamed over the target.
fn write_private(path: &Path, contents: &str) -> Result<(), Error> {
    let tmp = path.with_extension("tmp");

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp).map_err(|err| Error::file(&tmp, err))?;
    file.write_all(contents.as_bytes())
        .map_err(|err| Error::file(&tmp, err))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|err| Error::file(path, err))
}
