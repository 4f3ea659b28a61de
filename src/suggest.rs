//! Transition suggestions: songs that bridge two tracks.
//!
//! Target tempo and energy are the means of the two seeds. The remote
//! recommendation endpoint is tried first, then genre search, then a sample
//! of fixed popular playlists.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::spotify::{ApiError, AudioFeatures, MusicApi, RecommendationQuery, Track};

pub const MAX_SUGGESTIONS: usize = 10;
const MAX_GENRES: usize = 3;
const TRACKS_PER_GENRE: u32 = 4;
const GENRE_TOP_UP_THRESHOLD: usize = 5;
const GENRE_TOP_UP_SAMPLE: u32 = 5;
const FALLBACK_PLAYLIST_SAMPLE: u32 = 10;
/// Energy used for an overridden seed with no stored energy value.
pub const DEFAULT_ENERGY: f64 = 0.5;
/// Verdicts kept before the support cache is reset.
const MAX_VERDICTS: usize = 4096;
pub const DEFAULT_GENRES: &[&str] = &["pop", "rock"];

/// Global Top 50, Today's Top Hits, RapCaviar.
pub const FALLBACK_PLAYLISTS: &[&str] = &[
    "37i9dQZEVXbMDoHDwVN2tF",
    "37i9dQZF1DXcBWIGoYBM5M",
    "37i9dQZF1DX0XUsuxWHRQd",
];
pub const GENRE_TOP_UP_PLAYLIST: &str = "37i9dQZEVXbMDoHDwVN2tF";

/// Tracks known to be accepted as recommendation seeds.
pub const KNOWN_WORKING_TRACKS: &[&str] = &[
    "6DCZcSspjsKoFjzjrWoCdn", // God's Plan - Drake
    "0e7ipj03S05BNilyu5bRzt", // rockstar - Post Malone
    "3ee8Jmje8o58CHK66QrVC2", // Bad Guy - Billie Eilish
    "0VjIjW4GlUZAMYd2vXMi3b", // Blinding Lights - The Weeknd
    "7qiZfU4dY1lWllzX7mPBI3", // Shape of You - Ed Sheeran
    "5CtI0qwDJkDQGwXD1H1cLb", // Despacito - Luis Fonsi
    "1zi7xx7UVEFkmKfv06H8x0", // One Dance - Drake
    "7KXjTSCq5nL1LoYtL7XAwS", // HUMBLE. - Kendrick Lamar
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl Suggestion {
    fn from_track(track: Track, genre: Option<&str>) -> Option<Self> {
        let artist = track.primary_artist().to_string();
        Some(Self {
            id: track.id?,
            name: track.name,
            artist,
            preview_url: track.preview_url,
            genre: genre.map(str::to_string),
        })
    }
}

/// One side of a requested transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub track_id: String,
    /// Stored tempo override, if the user saved one.
    pub tempo_override: Option<f64>,
    /// Stored `speed` value, read as the seed's energy when the tempo is
    /// overridden. Zero counts as unset.
    pub energy_override: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionRequest {
    pub seeds: Option<[Seed; 2]>,
    /// Genre hints; `None` means the genre path is skipped.
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub tempo: f64,
    pub energy: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("Could not fetch audio features for track {0}.")]
    FeaturesUnavailable(String),
    #[error("{0}")]
    NoSuggestions(String),
    #[error("Error fetching fallback tracks: {0}")]
    Api(#[from] ApiError),
}

pub fn compute_targets(a: AudioFeatures, b: AudioFeatures) -> Targets {
    Targets {
        tempo: (a.tempo + b.tempo) / 2.0,
        energy: (a.energy + b.energy) / 2.0,
    }
}

/// Memoized answers to "does the recommendation endpoint accept this seed".
///
/// Known-good ids are trusted. Other ids get a single one-result probe. A
/// success or a rejection of the seed itself (400/404) is remembered; auth
/// failures, throttling, network errors and 5xx are not, so the next request
/// probes again. The cache is shared by every session and reset once it
/// holds `MAX_VERDICTS` entries.
#[derive(Default)]
pub struct RecommendationSupport {
    verdicts: Mutex<HashMap<String, bool>>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| {
        tracing::warn!("recommendation support cache poisoned, recovering");
        e.into_inner()
    })
}

impl RecommendationSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn track_supported<A: MusicApi + Sync>(&self, api: &A, track_id: &str) -> bool {
        if KNOWN_WORKING_TRACKS.contains(&track_id) {
            return true;
        }
        if let Some(&verdict) = lock_or_recover(&self.verdicts).get(track_id) {
            return verdict;
        }

        let probe = RecommendationQuery {
            seed_tracks: vec![track_id.to_string()],
            limit: 1,
            target_tempo: None,
            target_energy: None,
        };
        match api.recommendations(&probe).await {
            Ok(_) => {
                self.remember(track_id, true);
                true
            }
            Err(e) => {
                tracing::debug!("recommendation probe for {track_id} failed: {e}");
                if e.is_request_rejection() {
                    self.remember(track_id, false);
                }
                false
            }
        }
    }

    fn remember(&self, track_id: &str, verdict: bool) {
        let mut verdicts = lock_or_recover(&self.verdicts);
        if verdicts.len() >= MAX_VERDICTS && !verdicts.contains_key(track_id) {
            tracing::debug!("recommendation support cache full, resetting");
            verdicts.clear();
        }
        verdicts.insert(track_id.to_string(), verdict);
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        lock_or_recover(&self.verdicts).len()
    }
}

/// Tempo and energy for one seed, preferring the stored override.
pub async fn resolve_features<A: MusicApi + Sync>(
    api: &A,
    seed: &Seed,
) -> Result<AudioFeatures, SuggestError> {
    if let Some(tempo) = seed.tempo_override {
        tracing::info!("using stored tempo for {}: {tempo}", seed.track_id);
        let energy = seed
            .energy_override
            .filter(|energy| *energy != 0.0)
            .unwrap_or(DEFAULT_ENERGY);
        return Ok(AudioFeatures { tempo, energy });
    }
    match api.audio_features(&seed.track_id).await {
        Ok(Some(features)) => Ok(features),
        Ok(None) => Err(SuggestError::FeaturesUnavailable(seed.track_id.clone())),
        Err(e) => {
            tracing::warn!("failed to fetch features for {}: {e}", seed.track_id);
            Err(SuggestError::FeaturesUnavailable(seed.track_id.clone()))
        }
    }
}

/// Run the full suggestion cascade for one request.
pub async fn suggest_transition<A: MusicApi + Sync>(
    api: &A,
    support: &RecommendationSupport,
    request: &TransitionRequest,
) -> Result<Vec<Suggestion>, SuggestError> {
    if let Some(seeds) = &request.seeds {
        let first = resolve_features(api, &seeds[0]).await?;
        let second = resolve_features(api, &seeds[1]).await?;
        let targets = compute_targets(first, second);
        tracing::info!(
            "target tempo {:.2}, target energy {:.3}",
            targets.tempo,
            targets.energy
        );

        let suggestions = recommend(api, support, seeds, targets).await;
        if !suggestions.is_empty() {
            return Ok(suggestions);
        }
        tracing::info!("no recommendations for seed pair, falling back");
    }

    if let Some(genres) = &request.genres {
        match genre_suggestions(api, genres).await {
            Ok(suggestions) if !suggestions.is_empty() => return Ok(suggestions),
            Ok(_) => tracing::info!("genre search found nothing, falling back to playlists"),
            Err(e) => tracing::error!("genre search error: {e}"),
        }
    }

    let suggestions = playlist_fallback(api).await?;
    if suggestions.is_empty() {
        let message = if request.genres.is_some() {
            "Could not find any tracks for the selected genres. Please try different genres."
        } else {
            "Could not find any tracks. Please try using genres instead."
        };
        return Err(SuggestError::NoSuggestions(message.to_string()));
    }
    Ok(suggestions)
}

async fn recommend<A: MusicApi + Sync>(
    api: &A,
    support: &RecommendationSupport,
    seeds: &[Seed; 2],
    targets: Targets,
) -> Vec<Suggestion> {
    for seed in seeds {
        if !support.track_supported(api, &seed.track_id).await {
            tracing::info!("{} is not usable as a recommendation seed", seed.track_id);
            return Vec::new();
        }
    }

    let query = RecommendationQuery {
        seed_tracks: seeds.iter().map(|s| s.track_id.clone()).collect(),
        limit: MAX_SUGGESTIONS as u32,
        target_tempo: Some(targets.tempo),
        target_energy: Some(targets.energy),
    };
    match api.recommendations(&query).await {
        Ok(tracks) => tracks
            .into_iter()
            .filter_map(|t| Suggestion::from_track(t, None))
            .take(MAX_SUGGESTIONS)
            .collect(),
        Err(e) => {
            tracing::error!("recommendations error: {e}");
            Vec::new()
        }
    }
}

/// Up to three genres, four tracks each, topped up from a popular playlist
/// when fewer than five turn up.
pub async fn genre_suggestions<A: MusicApi + Sync>(
    api: &A,
    genres: &[String],
) -> Result<Vec<Suggestion>, ApiError> {
    let mut suggestions = Vec::new();
    for genre in genres.iter().take(MAX_GENRES) {
        let tracks = api
            .search_tracks(&format!("genre:{genre}"), TRACKS_PER_GENRE)
            .await?;
        for track in tracks {
            if suggestions.len() >= MAX_SUGGESTIONS {
                break;
            }
            suggestions.extend(Suggestion::from_track(track, Some(genre.as_str())));
        }
    }

    if suggestions.len() < GENRE_TOP_UP_THRESHOLD {
        let tracks = api
            .playlist_sample(GENRE_TOP_UP_PLAYLIST, GENRE_TOP_UP_SAMPLE)
            .await?;
        for track in tracks {
            if suggestions.len() >= MAX_SUGGESTIONS {
                break;
            }
            suggestions.extend(Suggestion::from_track(track, Some("popular")));
        }
    }
    Ok(suggestions)
}

/// Sample the fixed fallback playlists in order until ten tracks are found.
/// A playlist that fails to load is skipped; the error only surfaces when
/// nothing at all could be collected.
pub async fn playlist_fallback<A: MusicApi + Sync>(api: &A) -> Result<Vec<Suggestion>, ApiError> {
    let mut suggestions = Vec::new();
    let mut last_error = None;
    for playlist_id in FALLBACK_PLAYLISTS {
        if suggestions.len() >= MAX_SUGGESTIONS {
            break;
        }
        match api.playlist_sample(playlist_id, FALLBACK_PLAYLIST_SAMPLE).await {
            Ok(tracks) => {
                for track in tracks {
                    if suggestions.len() >= MAX_SUGGESTIONS {
                        break;
                    }
                    suggestions.extend(Suggestion::from_track(track, None));
                }
            }
            Err(e) => {
                tracing::warn!("fallback playlist {playlist_id} unavailable: {e}");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if suggestions.is_empty() => Err(e),
        _ => Ok(suggestions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn track(id: &str, name: &str) -> Track {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "artists": [{"name": format!("{name} Artist")}],
            "album": {"name": "Album"},
            "preview_url": format!("https://preview.example/{id}")
        }))
        .unwrap()
    }

    fn tracks(prefix: &str, n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| track(&format!("{prefix}{i}"), &format!("{prefix} {i}")))
            .collect()
    }

    fn rejected() -> ApiError {
        ApiError::Status {
            status: 400,
            body: "invalid request".into(),
        }
    }

    fn unavailable() -> ApiError {
        ApiError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[derive(Default)]
    struct FakeApi {
        features: HashMap<String, AudioFeatures>,
        /// Tracks returned for the full (two-seed) recommendation call.
        recommendations: Option<Vec<Track>>,
        /// Seeds whose one-result check is rejected.
        unsupported_seeds: Vec<String>,
        support_check_fails: bool,
        /// Statuses returned by the next one-result calls, in order.
        support_check_statuses: Mutex<Vec<u16>>,
        searches: HashMap<String, Vec<Track>>,
        search_fails: bool,
        playlists: HashMap<String, Result<Vec<Track>, u16>>,
        support_checks: AtomicUsize,
        recommendation_queries: Mutex<Vec<RecommendationQuery>>,
    }

    impl MusicApi for FakeApi {
        async fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ApiError> {
            Ok(self.features.get(track_id).copied())
        }

        async fn recommendations(
            &self,
            query: &RecommendationQuery,
        ) -> Result<Vec<Track>, ApiError> {
            if query.limit == 1 {
                self.support_checks.fetch_add(1, Ordering::SeqCst);
                let mut queued = self.support_check_statuses.lock().unwrap();
                if !queued.is_empty() {
                    return Err(ApiError::Status {
                        status: queued.remove(0),
                        body: String::new(),
                    });
                }
                drop(queued);
                if self.support_check_fails {
                    return Err(unavailable());
                }
                if self.unsupported_seeds.contains(&query.seed_tracks[0]) {
                    return Err(rejected());
                }
                return Ok(Vec::new());
            }
            self.recommendation_queries
                .lock()
                .unwrap()
                .push(query.clone());
            self.recommendations.clone().ok_or_else(rejected)
        }

        async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
            if self.search_fails {
                return Err(unavailable());
            }
            Ok(self
                .searches
                .get(query)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .take(limit as usize)
                .collect())
        }

        async fn playlist_sample(
            &self,
            playlist_id: &str,
            limit: u32,
        ) -> Result<Vec<Track>, ApiError> {
            match self.playlists.get(playlist_id) {
                Some(Ok(tracks)) => Ok(tracks.iter().take(limit as usize).cloned().collect()),
                Some(Err(status)) => Err(ApiError::Status {
                    status: *status,
                    body: String::new(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }

    fn seed(id: &str) -> Seed {
        Seed {
            track_id: id.to_string(),
            tempo_override: None,
            energy_override: None,
        }
    }

    fn pair(a: &str, b: &str) -> Option<[Seed; 2]> {
        Some([seed(a), seed(b)])
    }

    fn features(tempo: f64, energy: f64) -> AudioFeatures {
        AudioFeatures { tempo, energy }
    }

    #[test]
    fn test_compute_targets_is_mean_of_both() {
        let targets = compute_targets(features(100.0, 0.4), features(140.0, 0.6));
        assert_eq!(targets.tempo, 120.0);
        assert!((targets.energy - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_override_wins_over_remote_features() {
        let mut api = FakeApi::default();
        api.features.insert("a".into(), features(90.0, 0.9));
        let seed = Seed {
            track_id: "a".into(),
            tempo_override: Some(128.0),
            energy_override: Some(0.8),
        };
        let resolved = resolve_features(&api, &seed).await.unwrap();
        assert_eq!(resolved, features(128.0, 0.8));
    }

    #[tokio::test]
    async fn test_override_without_energy_uses_default() {
        let api = FakeApi::default();
        for energy_override in [None, Some(0.0)] {
            let seed = Seed {
                track_id: "a".into(),
                tempo_override: Some(128.0),
                energy_override,
            };
            let resolved = resolve_features(&api, &seed).await.unwrap();
            assert_eq!(resolved, features(128.0, DEFAULT_ENERGY));
        }
    }

    #[tokio::test]
    async fn test_override_energy_feeds_target() {
        let mut api = FakeApi::default();
        api.features.insert("b".into(), features(100.0, 0.4));
        api.recommendations = Some(tracks("rec", 2));
        let request = TransitionRequest {
            seeds: Some([
                Seed {
                    track_id: "a".into(),
                    tempo_override: Some(128.0),
                    energy_override: Some(0.8),
                },
                seed("b"),
            ]),
            genres: None,
        };

        suggest_transition(&api, &RecommendationSupport::new(), &request)
            .await
            .unwrap();

        let queries = api.recommendation_queries.lock().unwrap();
        assert_eq!(queries[0].target_tempo, Some(114.0));
        let energy = queries[0].target_energy.unwrap();
        assert!((energy - 0.6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_features_is_an_error() {
        let api = FakeApi::default();
        let err = resolve_features(&api, &seed("nope")).await.unwrap_err();
        assert!(matches!(err, SuggestError::FeaturesUnavailable(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_recommendations_use_averaged_targets() {
        let mut api = FakeApi::default();
        api.features.insert("a".into(), features(100.0, 0.4));
        api.features.insert("b".into(), features(140.0, 0.6));
        api.recommendations = Some(tracks("rec", 12));

        let support = RecommendationSupport::new();
        let request = TransitionRequest {
            seeds: pair("a", "b"),
            genres: None,
        };
        let suggestions = suggest_transition(&api, &support, &request).await.unwrap();

        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(suggestions[0].id, "rec0");
        assert_eq!(suggestions[0].artist, "rec 0 Artist");
        assert!(suggestions[0].genre.is_none());

        let queries = api.recommendation_queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].seed_tracks, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queries[0].limit, 10);
        assert_eq!(queries[0].target_tempo, Some(120.0));
        let energy = queries[0].target_energy.unwrap();
        assert!((energy - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unsupported_seed_skips_recommendations() {
        let mut api = FakeApi::default();
        api.features.insert("a".into(), features(100.0, 0.4));
        api.features.insert("b".into(), features(140.0, 0.6));
        api.recommendations = Some(tracks("rec", 3));
        api.unsupported_seeds = vec!["b".into()];
        api.playlists
            .insert(FALLBACK_PLAYLISTS[0].into(), Ok(tracks("top", 4)));

        let support = RecommendationSupport::new();
        let request = TransitionRequest {
            seeds: pair("a", "b"),
            genres: None,
        };
        let suggestions = suggest_transition(&api, &support, &request).await.unwrap();

        assert!(api.recommendation_queries.lock().unwrap().is_empty());
        assert_eq!(suggestions.len(), 4);
        assert_eq!(suggestions[0].id, "top0");
    }

    #[tokio::test]
    async fn test_empty_recommendations_fall_back_to_genres() {
        let mut api = FakeApi::default();
        api.features.insert("a".into(), features(100.0, 0.4));
        api.features.insert("b".into(), features(140.0, 0.6));
        api.recommendations = Some(Vec::new());
        api.searches.insert("genre:house".into(), tracks("house", 4));
        api.searches.insert("genre:techno".into(), tracks("techno", 4));

        let support = RecommendationSupport::new();
        let request = TransitionRequest {
            seeds: pair("a", "b"),
            genres: Some(vec!["house".into(), "techno".into()]),
        };
        let suggestions = suggest_transition(&api, &support, &request).await.unwrap();

        assert_eq!(suggestions.len(), 8);
        assert_eq!(suggestions[0].genre.as_deref(), Some("house"));
        assert_eq!(suggestions[7].genre.as_deref(), Some("techno"));
    }

    #[tokio::test]
    async fn test_genre_search_caps_genres_and_total() {
        let mut api = FakeApi::default();
        for g in ["a", "b", "c", "d"] {
            api.searches.insert(format!("genre:{g}"), tracks(g, 4));
        }
        let genres: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        let suggestions = genre_suggestions(&api, &genres).await.unwrap();

        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert!(suggestions.iter().all(|s| s.genre.as_deref() != Some("d")));
        assert_eq!(suggestions[9].genre.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_genre_search_tops_up_from_popular_playlist() {
        let mut api = FakeApi::default();
        api.searches.insert("genre:jazz".into(), tracks("jazz", 2));
        api.playlists
            .insert(GENRE_TOP_UP_PLAYLIST.into(), Ok(tracks("pop", 8)));

        let suggestions = genre_suggestions(&api, &["jazz".to_string()]).await.unwrap();

        assert_eq!(suggestions.len(), 2 + GENRE_TOP_UP_SAMPLE as usize);
        assert_eq!(suggestions[2].genre.as_deref(), Some("popular"));
    }

    #[tokio::test]
    async fn test_empty_genre_list_is_served_from_popular_playlist() {
        let mut api = FakeApi::default();
        api.playlists
            .insert(GENRE_TOP_UP_PLAYLIST.into(), Ok(tracks("pop", 8)));
        let request = TransitionRequest {
            seeds: None,
            genres: Some(Vec::new()),
        };

        let suggestions = suggest_transition(&api, &RecommendationSupport::new(), &request)
            .await
            .unwrap();

        assert_eq!(suggestions.len(), GENRE_TOP_UP_SAMPLE as usize);
        assert!(suggestions.iter().all(|s| s.genre.as_deref() == Some("popular")));
    }

    #[tokio::test]
    async fn test_fallback_playlists_when_other_paths_yield_nothing() {
        let mut api = FakeApi::default();
        api.playlists
            .insert(FALLBACK_PLAYLISTS[1].into(), Ok(tracks("hits", 6)));
        api.playlists
            .insert(FALLBACK_PLAYLISTS[2].into(), Ok(tracks("rap", 10)));

        let support = RecommendationSupport::new();
        let request = TransitionRequest {
            seeds: None,
            genres: Some(vec!["nothing".into()]),
        };
        let suggestions = suggest_transition(&api, &support, &request).await.unwrap();

        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(suggestions[5].id, "hits5");
        assert_eq!(suggestions[6].id, "rap0");
        assert!(suggestions.iter().all(|s| s.genre.is_none()));
    }

    #[tokio::test]
    async fn test_genre_search_error_still_reaches_fallback() {
        let mut api = FakeApi::default();
        api.search_fails = true;
        api.playlists
            .insert(FALLBACK_PLAYLISTS[2].into(), Ok(tracks("rap", 3)));

        let support = RecommendationSupport::new();
        let request = TransitionRequest {
            seeds: None,
            genres: Some(vec!["pop".into()]),
        };
        let suggestions = suggest_transition(&api, &support, &request).await.unwrap();
        assert_eq!(suggestions.len(), 3);
    }

    #[tokio::test]
    async fn test_everything_empty_is_no_suggestions() {
        let api = FakeApi::default();
        let support = RecommendationSupport::new();
        let err = suggest_transition(&api, &support, &TransitionRequest::default())
            .await
            .unwrap_err();
        match err {
            SuggestError::NoSuggestions(message) => {
                assert!(message.contains("Could not find any tracks"));
            }
            other => panic!("expected NoSuggestions, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_errors_surface_only_when_nothing_collected() {
        let mut api = FakeApi::default();
        for id in FALLBACK_PLAYLISTS {
            api.playlists.insert(id.to_string(), Err(503));
        }
        let err = playlist_fallback(&api).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));

        api.playlists
            .insert(FALLBACK_PLAYLISTS[1].into(), Ok(tracks("hits", 2)));
        let suggestions = playlist_fallback(&api).await.unwrap();
        assert_eq!(suggestions.len(), 2);
    }

    #[tokio::test]
    async fn test_known_tracks_skip_the_support_check() {
        let api = FakeApi::default();
        let support = RecommendationSupport::new();
        assert!(support.track_supported(&api, KNOWN_WORKING_TRACKS[0]).await);
        assert_eq!(api.support_checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_seed_verdicts_are_memoized() {
        let api = FakeApi {
            unsupported_seeds: vec!["bad".into()],
            ..Default::default()
        };
        let support = RecommendationSupport::new();

        assert!(support.track_supported(&api, "good").await);
        assert!(support.track_supported(&api, "good").await);
        assert!(!support.track_supported(&api, "bad").await);
        assert!(!support.track_supported(&api, "bad").await);
        assert_eq!(api.support_checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_check_failure_is_not_memoized() {
        let api = FakeApi {
            support_check_fails: true,
            ..Default::default()
        };
        let support = RecommendationSupport::new();

        assert!(!support.track_supported(&api, "x").await);
        assert!(!support.track_supported(&api, "x").await);
        assert_eq!(api.support_checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_throttled_or_unauthorized_check_is_retried() {
        for status in [429, 401, 403] {
            let api = FakeApi {
                support_check_statuses: Mutex::new(vec![status]),
                ..Default::default()
            };
            let support = RecommendationSupport::new();

            assert!(!support.track_supported(&api, "x").await, "{status}");
            assert!(support.track_supported(&api, "x").await, "{status}");
            assert_eq!(api.support_checks.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test]
    async fn test_not_found_seed_is_remembered() {
        let api = FakeApi {
            support_check_statuses: Mutex::new(vec![404]),
            ..Default::default()
        };
        let support = RecommendationSupport::new();

        assert!(!support.track_supported(&api, "gone").await);
        assert!(!support.track_supported(&api, "gone").await);
        assert_eq!(api.support_checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_verdict_cache_is_bounded() {
        let support = RecommendationSupport::new();
        for i in 0..MAX_VERDICTS {
            support.remember(&format!("t{i}"), true);
        }
        assert_eq!(support.cached(), MAX_VERDICTS);
        support.remember("t0", false);
        assert_eq!(support.cached(), MAX_VERDICTS);
        support.remember("one-more", true);
        assert_eq!(support.cached(), 1);
    }

    #[test]
    fn test_suggestion_serialization_omits_missing_genre() {
        let suggestion = Suggestion::from_track(track("id1", "Song"), None).unwrap();
        let json = serde_json::to_value(&suggestion).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "id1",
                "name": "Song",
                "artist": "Song Artist",
                "preview_url": "https://preview.example/id1"
            })
        );
    }
}
