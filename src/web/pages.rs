use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use super::{AppError, AppState, SessionId, html};

/// Send a browser page's failure back as HTML with the error's status.
fn error_page(err: &AppError) -> Response {
    if err.status().is_server_error() {
        tracing::error!("{}: {err}", err.code());
    }
    (err.status(), Html(html::error("Something went wrong", &err.to_string()))).into_response()
}

pub(super) async fn root(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Response {
    if app.access_token(&session).await.is_some() {
        return Redirect::to("/playlists").into_response();
    }
    Html(html::landing(&app.state.oauth.authorize_url())).into_response()
}

pub(super) async fn login(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Redirect {
    app.sessions().clear_token(&session.0);
    Redirect::to(&app.state.oauth.authorize_url())
}

#[derive(Debug, Deserialize)]
pub(super) struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

pub(super) async fn callback(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(params): Query<CallbackQuery>,
) -> Response {
    if let Some(reason) = params.error.as_deref() {
        tracing::warn!("authorization denied: {reason}");
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code.").into_response();
    };
    match app.state.oauth.exchange_code(&code).await {
        Ok(token) => {
            app.sessions().store_token(&session.0, Some(token));
            tracing::info!("session authorized");
            Redirect::to("/playlists").into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

pub(super) async fn playlists(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Response {
    let Some(api) = app.spotify(&session).await else {
        return Redirect::to("/login").into_response();
    };
    match api.current_user_playlists().await {
        Ok(playlists) => {
            tracing::info!("retrieved {} playlists", playlists.len());
            Html(html::playlists(&playlists, crate::oauth::now_unix())).into_response()
        }
        Err(e) => error_page(&AppError::from(e)),
    }
}

pub(super) async fn playlist(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(playlist_id): Path<String>,
) -> Response {
    let Some(api) = app.spotify(&session).await else {
        return Redirect::to("/login").into_response();
    };
    match api.playlist_tracks(&playlist_id).await {
        Ok(tracks) => Html(html::playlist_tracks(&tracks)).into_response(),
        Err(e) => error_page(&AppError::from(e)),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TransitionQuery {
    track_id_1: Option<String>,
    track_id_2: Option<String>,
    genres: Option<String>,
}

impl TransitionQuery {
    fn track_pair(&self) -> Result<Option<[String; 2]>, AppError> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        match (non_empty(&self.track_id_1), non_empty(&self.track_id_2)) {
            (Some(first), Some(second)) => Ok(Some([first, second])),
            (None, None) => Ok(None),
            _ => Err(AppError::BadRequest(
                "Pick both a starting and an ending track".into(),
            )),
        }
    }

    /// Comma separated genre names; blank means none were given.
    fn genres(&self) -> Option<Vec<String>> {
        let genres: Vec<String> = self
            .genres
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect();
        (!genres.is_empty()).then_some(genres)
    }
}

pub(super) async fn transition(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(params): Query<TransitionQuery>,
) -> Response {
    let Some(api) = app.spotify(&session).await else {
        return Redirect::to("/login").into_response();
    };
    let result = match params.track_pair() {
        Ok(track_ids) => {
            app.transition_suggestions(&api, track_ids, params.genres())
                .await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(suggestions) => Html(html::suggestions(&suggestions)).into_response(),
        Err(e) => error_page(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(t1: Option<&str>, t2: Option<&str>, genres: Option<&str>) -> TransitionQuery {
        TransitionQuery {
            track_id_1: t1.map(String::from),
            track_id_2: t2.map(String::from),
            genres: genres.map(String::from),
        }
    }

    #[test]
    fn test_transition_query_genres_split_and_trimmed() {
        assert_eq!(
            query(None, None, Some(" house, techno ,,")).genres(),
            Some(vec!["house".to_string(), "techno".to_string()])
        );
        assert_eq!(query(None, None, Some(" , ")).genres(), None);
        assert_eq!(query(None, None, None).genres(), None);
    }

    #[test]
    fn test_transition_query_track_pair() {
        assert_eq!(
            query(Some("a"), Some("b"), None).track_pair().unwrap(),
            Some(["a".to_string(), "b".to_string()])
        );
        assert_eq!(query(Some(""), None, None).track_pair().unwrap(), None);
        assert!(query(Some("a"), None, None).track_pair().is_err());
    }
}
