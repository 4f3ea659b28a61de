use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{AppError, AppState, SessionId};
use crate::spotify::MusicApi;
use crate::store;
use crate::suggest::{self, DEFAULT_GENRES};

const PLAYLIST_DESCRIPTION: &str = "Auto-generated transitions";
const DEFAULT_PLAYLIST_NAME: &str = "Smooth Transition";
const MIN_QUERY_LEN: usize = 2;
const SEARCH_LIMIT: u32 = 10;
pub(super) const FALLBACK_GENRES: &[&str] = &[
    "pop",
    "rock",
    "hip-hop",
    "electronic",
    "r-n-b",
    "indie",
    "jazz",
    "classical",
    "country",
    "reggae",
    "blues",
    "metal",
];

/// Parse an optional JSON body; an empty body is the type's default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Malformed JSON body: {e}")))
}

/// Accepts both request shapes: `{track_ids: [a, b], use_genres, genres}`
/// and `{track_id_1, track_id_2}`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct TransitionBody {
    #[serde(default)]
    track_ids: Option<Vec<String>>,
    track_id_1: Option<String>,
    track_id_2: Option<String>,
    #[serde(default)]
    use_genres: bool,
    genres: Option<Vec<String>>,
}

impl TransitionBody {
    pub(super) fn track_pair(&self) -> Result<Option<[String; 2]>, AppError> {
        if let Some(ids) = &self.track_ids
            && let [first, second] = ids.as_slice()
        {
            return Ok(Some([first.clone(), second.clone()]));
        }
        match (&self.track_id_1, &self.track_id_2) {
            (Some(first), Some(second)) => Ok(Some([first.clone(), second.clone()])),
            (None, None) => Ok(None),
            _ => Err(AppError::BadRequest(
                "track_id_1 and track_id_2 are both required".into(),
            )),
        }
    }

    /// Defaults apply only when `genres` is absent; an explicit empty list
    /// is kept and ends up served from the popular top-up.
    pub(super) fn genre_hints(&self) -> Option<Vec<String>> {
        if !self.use_genres {
            return None;
        }
        Some(
            self.genres
                .clone()
                .unwrap_or_else(|| DEFAULT_GENRES.iter().map(|g| g.to_string()).collect()),
        )
    }
}

pub(super) async fn transition_between(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let api = app.require_spotify(&session).await?;
    let body: TransitionBody = parse_body(&body)?;
    let track_ids = body.track_pair()?;
    let suggestions = app
        .transition_suggestions(&api, track_ids, body.genre_hints())
        .await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SettingsBody {
    tempo: Option<f64>,
    speed: Option<f64>,
}

pub(super) async fn get_settings(
    State(app): State<AppState>,
    Path(track_id): Path<String>,
) -> Result<Json<store::TrackOverride>, AppError> {
    let entry = app
        .with_store(move |conn| store::get_track_override(conn, &track_id))
        .await?;
    Ok(Json(entry))
}

pub(super) async fn save_settings(
    State(app): State<AppState>,
    Path(track_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body: SettingsBody = parse_body(&body)?;
    let SettingsBody { tempo, speed } = body;
    let key = track_id.clone();
    app.with_store(move |conn| store::set_track_override(conn, &key, tempo, speed))
        .await?;
    tracing::info!("saved settings for {track_id}: tempo={tempo:?} speed={speed:?}");
    Ok(Json(json!({
        "status": "saved",
        "track_id": track_id,
        "tempo": tempo,
        "speed": speed,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CreatePlaylistBody {
    name: Option<String>,
    #[serde(default)]
    track_ids: Vec<String>,
}

pub(super) async fn create_transition_playlist(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let api = app.require_spotify(&session).await?;
    let body: CreatePlaylistBody = parse_body(&body)?;
    if body.track_ids.is_empty() {
        return Err(AppError::BadRequest("track_ids required".into()));
    }
    let name = body
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string());

    let user = api.current_user().await?;
    let playlist_id = api
        .create_playlist(&user.id, &name, false, PLAYLIST_DESCRIPTION)
        .await?;
    api.replace_playlist_items(&playlist_id, &body.track_ids)
        .await?;
    tracing::info!(
        "created playlist {playlist_id} with {} tracks",
        body.track_ids.len()
    );
    Ok(Json(json!({ "playlist_id": playlist_id })))
}

pub(super) async fn preview(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(track_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let api = app.require_spotify(&session).await?;
    let track = api.track(&track_id).await?;
    Ok(Json(json!({ "preview_url": track.preview_url })))
}

pub(super) async fn status(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Response {
    let (connected, message) = match app.spotify(&session).await {
        None => (false, "Not authenticated".to_string()),
        Some(api) => match api.current_user().await {
            Ok(user) => (
                true,
                format!(
                    "Connected as {}",
                    user.display_name.as_deref().unwrap_or(&user.id)
                ),
            ),
            Err(e) => {
                tracing::error!("Spotify connection error: {e}");
                (false, format!("Spotify API error: {e}"))
            }
        },
    };

    if connected {
        Json(json!({ "status": "connected", "message": message })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "message": message })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    #[serde(default)]
    q: String,
}

pub(super) async fn search(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let api = app.require_spotify(&session).await?;
    let query = params.q.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Err(AppError::BadRequest(
            "Query must be at least 2 characters".into(),
        ));
    }

    let results = api.search_tracks(query, SEARCH_LIMIT).await?;
    let mut tracks = Vec::with_capacity(results.len());
    for track in results {
        let Some(id) = track.id.clone() else {
            continue;
        };
        let has_features = matches!(api.audio_features(&id).await, Ok(Some(_)));
        let works_with_recommendations = app.state.support.track_supported(&api, &id).await;
        tracks.push(json!({
            "id": id,
            "name": &track.name,
            "artist": track.primary_artist(),
            "album": track.album_name(),
            "preview_url": &track.preview_url,
            "has_features": has_features,
            "works_with_recommendations": works_with_recommendations,
        }));
    }
    Ok(Json(json!({ "tracks": tracks })))
}

pub(super) async fn popular_tracks(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Json<Value>, AppError> {
    let api = app.require_spotify(&session).await?;
    let mut tracks = Vec::new();
    for track_id in suggest::KNOWN_WORKING_TRACKS {
        match api.track(track_id).await {
            Ok(track) => tracks.push(json!({
                "id": &track.id,
                "name": &track.name,
                "artist": track.primary_artist(),
                "album": track.album_name(),
                "preview_url": &track.preview_url,
            })),
            Err(e) => tracing::warn!("could not fetch track {track_id}: {e}"),
        }
    }
    if tracks.is_empty() {
        return Err(AppError::Internal("Could not fetch any tracks".into()));
    }
    Ok(Json(json!({ "tracks": tracks })))
}

pub(super) async fn genres(
    State(app): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Json<Value>, AppError> {
    let api = app.require_spotify(&session).await?;
    let genres = match api.genre_seeds().await {
        Ok(genres) => genres,
        Err(e) => {
            tracing::error!("genre seeds error: {e}");
            FALLBACK_GENRES.iter().map(|g| g.to_string()).collect()
        }
    };
    Ok(Json(json!({ "genres": genres })))
}
