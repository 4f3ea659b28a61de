use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::spotify::urlencoding;

pub const SCOPE: &str = "user-library-read playlist-read-private playlist-read-collaborative \
    playlist-modify-private user-read-playback-state user-read-currently-playing";

/// Seconds of remaining lifetime below which a token is refreshed before use.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token response did not include a refresh token")]
    MissingRefreshToken,
}

/// Access/refresh token pair held for one browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    scope: Option<String>,
    expires_in: i64,
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_token_info(
        self,
        now: i64,
        previous_refresh_token: Option<&str>,
    ) -> Result<TokenInfo, OAuthError> {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .ok_or(OAuthError::MissingRefreshToken)?;
        Ok(TokenInfo {
            access_token: self.access_token,
            refresh_token,
            expires_at: now + self.expires_in,
            scope: self.scope,
            token_type: self.token_type,
        })
    }
}

/// Anything that can trade a refresh token for a new token pair.
pub trait TokenRefresher {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenInfo, OAuthError>> + Send;
}

/// Authorization-code flow against the accounts service.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    accounts_url: String,
}

impl OAuthClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            accounts_url: config.accounts_url.clone(),
        }
    }

    pub fn authorize_url(&self) -> String {
        format!(
            "{base}/authorize?client_id={client_id}&response_type=code\
             &redirect_uri={redirect}&scope={scope}&show_dialog=false",
            base = self.accounts_url,
            client_id = urlencoding(&self.client_id),
            redirect = urlencoding(&self.redirect_uri),
            scope = urlencoding(SCOPE),
        )
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenInfo, OAuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let resp = self.request_token(&form).await?;
        resp.into_token_info(now_unix(), None)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthError> {
        let resp = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .form(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected { status, body });
        }

        Ok(resp.json::<TokenResponse>().await?)
    }
}

impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenInfo, OAuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let resp = self.request_token(&form).await?;
        resp.into_token_info(now_unix(), Some(refresh_token))
    }
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Resolved state of a session's stored credential.
#[derive(Debug, PartialEq)]
enum TokenState<'a> {
    /// Usable as-is.
    Fresh(&'a str),
    /// Inside the expiry margin; holds the refresh token.
    Expiring(&'a str),
    Missing,
}

fn token_state(token: Option<&TokenInfo>, now: i64) -> TokenState<'_> {
    match token {
        Some(t) if t.expires_at - now > EXPIRY_MARGIN_SECS => TokenState::Fresh(&t.access_token),
        Some(t) => TokenState::Expiring(&t.refresh_token),
        None => TokenState::Missing,
    }
}

/// Return a usable access token for the session, refreshing it once if it is
/// about to expire. A failed refresh clears the credential so the caller
/// falls back to the login flow.
pub async fn ensure_valid_token<R: TokenRefresher>(
    credential: &mut Option<TokenInfo>,
    refresher: &R,
    now: i64,
) -> Option<String> {
    let refresh_token = match token_state(credential.as_ref(), now) {
        TokenState::Fresh(access) => return Some(access.to_string()),
        TokenState::Missing => return None,
        TokenState::Expiring(refresh) => refresh.to_string(),
    };

    match refresher.refresh(&refresh_token).await {
        Ok(fresh) => {
            tracing::debug!(expires_at = fresh.expires_at, "access token refreshed");
            let access = fresh.access_token.clone();
            *credential = Some(fresh);
            Some(access)
        }
        Err(e) => {
            tracing::warn!("token refresh error: {e}");
            *credential = None;
            None
        }
    }
}
