use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::oauth::OAuthError;
use crate::spotify::ApiError;
use crate::suggest::SuggestError;

/// Failure of a request, shared by the JSON and HTML adapters.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Please log in again")]
    NotAuthenticated,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Suggest(#[from] SuggestError),
    #[error("Spotify API error: {0}")]
    Remote(#[from] ApiError),
    #[error("Authorization failed: {0}")]
    OAuth(#[from] OAuthError),
    #[error("Settings store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Suggest(SuggestError::FeaturesUnavailable(_)) => StatusCode::BAD_REQUEST,
            AppError::Suggest(SuggestError::NoSuggestions(_)) => StatusCode::NOT_FOUND,
            AppError::Suggest(SuggestError::Api(_))
            | AppError::Remote(_)
            | AppError::OAuth(_)
            | AppError::Store(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated => "not_authenticated",
            AppError::BadRequest(_) => "bad_request",
            AppError::Suggest(SuggestError::FeaturesUnavailable(_)) => "features_error",
            AppError::Suggest(SuggestError::NoSuggestions(_)) => "no_tracks_found",
            AppError::Suggest(SuggestError::Api(_)) | AppError::Remote(_) => "spotify_api_error",
            AppError::OAuth(_) => "oauth_error",
            AppError::Store(_) => "store_error",
            AppError::Internal(_) => "server_error",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        if self.status().is_server_error() {
            json!({ "error": self.code(), "detail": self.to_string() })
        } else {
            json!({ "error": self.code(), "message": self.to_string() })
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {self}", self.code());
        } else {
            tracing::debug!("{}: {self}", self.code());
        }
        (status, Json(self.body())).into_response()
    }
}
