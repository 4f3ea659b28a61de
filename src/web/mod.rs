//! HTTP surface: browser pages and the AJAX API over one shared state.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA, SET_COOKIE};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use rusqlite::Connection;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

mod api;
mod error;
mod html;
mod pages;

pub use error::AppError;

use crate::config::Config;
use crate::oauth::{self, OAuthClient};
use crate::session::{self, Sessions};
use crate::spotify::Spotify;
use crate::store;
use crate::suggest::{self, RecommendationSupport, Seed, Suggestion, TransitionRequest};

/// Inner shared state (not Clone).
struct ServerState {
    config: Config,
    http: reqwest::Client,
    oauth: OAuthClient,
    sessions: Sessions,
    support: RecommendationSupport,
}

#[derive(Clone)]
pub struct AppState {
    state: Arc<ServerState>,
}

/// Session id resolved by the session middleware for the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

impl AppState {
    pub fn new(config: Config, http: reqwest::Client) -> Self {
        let oauth = OAuthClient::new(http.clone(), &config);
        let sessions = Sessions::new(config.session_secret.clone());
        Self {
            state: Arc::new(ServerState {
                config,
                http,
                oauth,
                sessions,
                support: RecommendationSupport::new(),
            }),
        }
    }

    pub fn sessions(&self) -> &Sessions {
        &self.state.sessions
    }

    /// The session's access token, refreshed if needed. A refreshed or
    /// cleared credential is written back only if the session still holds the
    /// one that was read, so a concurrent `/login` or `/callback` wins.
    async fn access_token(&self, session: &SessionId) -> Option<String> {
        let read = self.state.sessions.token(&session.0);
        let mut credential = read.clone();
        let token =
            oauth::ensure_valid_token(&mut credential, &self.state.oauth, oauth::now_unix()).await;
        if let Some(read) = &read
            && credential.as_ref() != Some(read)
            && !self.state.sessions.replace_token(&session.0, read, credential)
        {
            tracing::debug!("session credential changed during refresh, keeping the newer one");
        }
        token
    }

    async fn spotify(&self, session: &SessionId) -> Option<Spotify> {
        let token = self.access_token(session).await?;
        Some(Spotify::new(
            self.state.http.clone(),
            &self.state.config.api_url,
            token,
        ))
    }

    /// Client for AJAX routes: a missing session is a 401, not a redirect.
    async fn require_spotify(&self, session: &SessionId) -> Result<Spotify, AppError> {
        self.spotify(session).await.ok_or(AppError::NotAuthenticated)
    }

    /// Run store work on the blocking pool with a connection opened for this
    /// call only.
    async fn with_store<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.state.config.db_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = store::open(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Internal(format!("store task failed: {e}")))?;
        Ok(result?)
    }

    /// Suggestions for a transition, shared by the JSON and HTML adapters.
    async fn transition_suggestions(
        &self,
        api: &Spotify,
        track_ids: Option<[String; 2]>,
        genres: Option<Vec<String>>,
    ) -> Result<Vec<Suggestion>, AppError> {
        let seeds = match track_ids {
            Some([first, second]) => {
                tracing::info!("track-based transition for {first} -> {second}");
                let ids = (first.clone(), second.clone());
                let (a, b) = self
                    .with_store(move |conn| {
                        Ok((
                            store::get_track_override(conn, &ids.0)?,
                            store::get_track_override(conn, &ids.1)?,
                        ))
                    })
                    .await?;
                Some([
                    Seed {
                        track_id: first,
                        tempo_override: a.tempo,
                        energy_override: a.speed,
                    },
                    Seed {
                        track_id: second,
                        tempo_override: b.tempo,
                        energy_override: b.speed,
                    },
                ])
            }
            None => None,
        };
        let request = TransitionRequest { seeds, genres };
        Ok(suggest::suggest_transition(api, &self.state.support, &request).await?)
    }
}

async fn session_layer(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    let existing = session::cookie_value(req.headers(), session::COOKIE_NAME)
        .and_then(|value| app.state.sessions.verify(value));
    let (id, is_new) = match existing {
        Some(id) => (id, false),
        None => (Sessions::new_id(), true),
    };
    req.extensions_mut().insert(SessionId(id.clone()));

    let mut resp = next.run(req).await;
    if is_new {
        if let Some(signed) = app.state.sessions.sign(&id)
            && let Ok(value) = HeaderValue::from_str(&session::set_cookie_value(&signed))
        {
            resp.headers_mut().append(SET_COOKIE, value);
        }
    }
    resp
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::root))
        .route("/login", get(pages::login))
        .route("/callback", get(pages::callback))
        .route("/playlists", get(pages::playlists))
        .route("/playlist/:playlist_id", get(pages::playlist))
        .route("/transition", get(pages::transition))
        .route("/transition_between", post(api::transition_between))
        .route(
            "/settings/:track_id",
            get(api::get_settings).post(api::save_settings),
        )
        .route(
            "/create_transition_playlist",
            post(api::create_transition_playlist),
        )
        .route("/preview/:track_id", get(api::preview))
        .route("/api/status", get(api::status))
        .route("/api/search", get(api::search))
        .route("/api/popular_tracks", get(api::popular_tracks))
        .route("/api/genres", get(api::genres))
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
