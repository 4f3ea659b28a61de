//! Thin call-through to the Spotify Web API.
//!
//! Every call carries the session's bearer token. Listing endpoints follow the
//! `next` cursor until the remote side stops returning one; nothing is cached.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PLAYLISTS_PAGE_SIZE: u32 = 50;
const PLAYLIST_ITEMS_PAGE_SIZE: u32 = 100;
/// Max URIs the playlist item endpoints accept per request.
const PLAYLIST_WRITE_CHUNK: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Spotify HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// The remote side rejected the request because of what it asked for
    /// (400/404). Auth failures, throttling and server errors say nothing
    /// about the request's content.
    pub fn is_request_rejection(&self) -> bool {
        matches!(self, ApiError::Status { status: 400 | 404, .. })
    }
}

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("crossfade/", env!("CARGO_PKG_VERSION")))
        .build()
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    /// `None` for local files that only exist in a user's client.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
    pub preview_url: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn album_name(&self) -> &str {
        self.album.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistOwner {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistTracksRef {
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    pub owner: Option<PlaylistOwner>,
    pub tracks: Option<PlaylistTracksRef>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct AudioFeatures {
    pub tempo: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<Track>,
}

#[derive(Deserialize)]
struct AudioFeaturesResponse {
    #[serde(default)]
    audio_features: Vec<Option<AudioFeatures>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<Page<Track>>,
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

#[derive(Deserialize)]
struct GenreSeedsResponse {
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Deserialize)]
struct CreatedPlaylist {
    id: String,
}

/// Parameters for the recommendations endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationQuery {
    pub seed_tracks: Vec<String>,
    pub limit: u32,
    pub target_tempo: Option<f64>,
    pub target_energy: Option<f64>,
}

// ---------------------------------------------------------------------------
// Catalog seam used by the suggestion flow
// ---------------------------------------------------------------------------

/// The subset of the remote API the transition flow needs.
pub trait MusicApi {
    fn audio_features(
        &self,
        track_id: &str,
    ) -> impl Future<Output = Result<Option<AudioFeatures>, ApiError>> + Send;

    fn recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> impl Future<Output = Result<Vec<Track>, ApiError>> + Send;

    fn search_tracks(
        &self,
        query: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Track>, ApiError>> + Send;

    /// First page of a playlist, at most `limit` entries, without following cursors.
    fn playlist_sample(
        &self,
        playlist_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Track>, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One authenticated view of the API, built per request from the session's
/// access token.
#[derive(Clone)]
pub struct Spotify {
    http: Client,
    base_url: String,
    access_token: String,
}

impl Spotify {
    pub fn new(http: Client, base_url: &str, access_token: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.authorized(builder).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.send(self.http.get(url)).await
    }

    /// Walk a paginated listing from `first_url` to the last page.
    async fn collect_pages<T: DeserializeOwned>(&self, first_url: String) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let page: Page<T> = self.get(&url).await?;
            items.extend(page.items);
            next = page.next;
        }
        Ok(items)
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get(&self.url("/me")).await
    }

    pub async fn current_user_playlists(&self) -> Result<Vec<Playlist>, ApiError> {
        let first = self.url(&format!("/me/playlists?limit={PLAYLISTS_PAGE_SIZE}&offset=0"));
        let playlists = self.collect_pages::<Option<Playlist>>(first).await?;
        Ok(playlists.into_iter().flatten().collect())
    }

    /// Every track in a playlist; episodes and removed entries are skipped.
    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ApiError> {
        let first = self.url(&format!(
            "/playlists/{}/tracks?additional_types=track&limit={PLAYLIST_ITEMS_PAGE_SIZE}",
            urlencoding(playlist_id)
        ));
        let items = self.collect_pages::<PlaylistItem>(first).await?;
        Ok(items.into_iter().filter_map(|item| item.track).collect())
    }

    pub async fn track(&self, track_id: &str) -> Result<Track, ApiError> {
        self.get(&self.url(&format!("/tracks/{}", urlencoding(track_id))))
            .await
    }

    pub async fn genre_seeds(&self) -> Result<Vec<String>, ApiError> {
        let resp: GenreSeedsResponse = self
            .get(&self.url("/recommendations/available-genre-seeds"))
            .await?;
        Ok(resp.genres)
    }

    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        public: bool,
        description: &str,
    ) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "name": name,
            "public": public,
            "description": description,
        });
        let created: CreatedPlaylist = self
            .send(
                self.http
                    .post(self.url(&format!("/users/{}/playlists", urlencoding(user_id))))
                    .json(&body),
            )
            .await?;
        Ok(created.id)
    }

    /// Replace a playlist's contents. The first chunk replaces, later chunks append.
    pub async fn replace_playlist_items(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("/playlists/{}/tracks", urlencoding(playlist_id)));
        let uris: Vec<String> = track_ids.iter().map(|id| track_uri(id)).collect();

        if uris.is_empty() {
            let _: serde_json::Value = self
                .send(self.http.put(&url).json(&serde_json::json!({ "uris": [] })))
                .await?;
            return Ok(());
        }

        for (i, chunk) in uris.chunks(PLAYLIST_WRITE_CHUNK).enumerate() {
            let body = serde_json::json!({ "uris": chunk });
            let builder = if i == 0 {
                self.http.put(&url)
            } else {
                self.http.post(&url)
            };
            let _: serde_json::Value = self.send(builder.json(&body)).await?;
        }
        Ok(())
    }
}

impl MusicApi for Spotify {
    async fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ApiError> {
        let resp: AudioFeaturesResponse = self
            .get(&self.url(&format!("/audio-features?ids={}", urlencoding(track_id))))
            .await?;
        Ok(resp.audio_features.into_iter().next().flatten())
    }

    async fn recommendations(&self, query: &RecommendationQuery) -> Result<Vec<Track>, ApiError> {
        let mut url = self.url(&format!(
            "/recommendations?seed_tracks={}&limit={}",
            urlencoding(&query.seed_tracks.join(",")),
            query.limit
        ));
        if let Some(tempo) = query.target_tempo {
            url.push_str(&format!("&target_tempo={tempo}"));
        }
        if let Some(energy) = query.target_energy {
            url.push_str(&format!("&target_energy={energy}"));
        }
        let resp: RecommendationsResponse = self.get(&url).await?;
        Ok(resp.tracks)
    }

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
        let resp: SearchResponse = self
            .get(&self.url(&format!(
                "/search?q={}&type=track&limit={limit}",
                urlencoding(query)
            )))
            .await?;
        Ok(resp.tracks.map(|page| page.items).unwrap_or_default())
    }

    async fn playlist_sample(&self, playlist_id: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
        let page: Page<PlaylistItem> = self
            .get(&self.url(&format!(
                "/playlists/{}/tracks?additional_types=track&limit={limit}",
                urlencoding(playlist_id)
            )))
            .await?;
        Ok(page.items.into_iter().filter_map(|item| item.track).collect())
    }
}

pub fn track_uri(track_id: &str) -> String {
    if track_id.starts_with("spotify:") {
        track_id.to_string()
    } else {
        format!("spotify:track:{track_id}")
    }
}

/// Percent-encode a string for URL query parameters.
pub(crate) fn urlencoding(s: &str) -> String {
    use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
    const SET: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~');
    utf8_percent_encode(s, SET).to_string()
}
