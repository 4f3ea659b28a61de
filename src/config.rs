use std::path::PathBuf;

use crate::store;

pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";
pub const REDIRECT_URI_ENV: &str = "REDIRECT_URI";
pub const DB_PATH_ENV: &str = "DB_PATH";
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";
pub const BIND_ADDR_ENV: &str = "BIND_ADDR";
pub const ACCOUNTS_URL_ENV: &str = "SPOTIFY_ACCOUNTS_URL";
pub const API_URL_ENV: &str = "SPOTIFY_API_URL";

pub const DEFAULT_SECRET_KEY: &str = "change_me";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5001";
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
}

/// Everything the server needs, read once at startup and handed to each
/// component on construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub bind_addr: String,
    pub accounts_url: String,
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let session_secret = get(SECRET_KEY_ENV).unwrap_or_else(|| {
            tracing::warn!("{SECRET_KEY_ENV} not set, falling back to an insecure default");
            DEFAULT_SECRET_KEY.to_string()
        });

        Ok(Self {
            client_id: required(CLIENT_ID_ENV)?,
            client_secret: required(CLIENT_SECRET_ENV)?,
            redirect_uri: required(REDIRECT_URI_ENV)?,
            db_path: get(DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(store::default_path),
            session_secret,
            bind_addr: get(BIND_ADDR_ENV).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            accounts_url: trim_base(get(ACCOUNTS_URL_ENV), DEFAULT_ACCOUNTS_URL),
            api_url: trim_base(get(API_URL_ENV), DEFAULT_API_URL),
        })
    }
}

/// Store location without requiring OAuth credentials (local CLI commands).
pub fn db_path_from_env() -> PathBuf {
    std::env::var(DB_PATH_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(store::default_path)
}

fn trim_base(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
