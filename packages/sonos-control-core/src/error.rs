//! Centralized error types for the control core.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::sonos::discovery::DiscoveryError;
use crate::sonos::error::{DeviceError, DeviceErrorKind};
use crate::speech::SpeechError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::NoInterfaces => "no_network_interfaces",
            Self::InterfaceScan(_) => "interface_scan_failed",
        }
    }
}

impl ErrorCode for DeviceError {
    fn code(&self) -> &'static str {
        match self.kind() {
            DeviceErrorKind::Protocol => "device_protocol_error",
            DeviceErrorKind::Connection => "device_unreachable",
            DeviceErrorKind::Timeout => "device_timeout",
            DeviceErrorKind::Io => "device_io_error",
            DeviceErrorKind::Parse => "device_parse_error",
        }
    }
}

impl ErrorCode for SpeechError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) | Self::HttpStatus(_) => "speech_render_failed",
            Self::EmptyText => "empty_text",
            Self::Io(_) => "speech_cache_failed",
        }
    }
}

/// Application-wide error type for room operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No speaker is known under the requested room name.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The speaker failed the operation, after any retries.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// No speaker is known at all, so nothing can answer a household query.
    #[error("No speakers available")]
    NoSpeakers,

    /// No favorite matches the requested name.
    #[error("Favorite not found: {name} (available: {})", available.join(", "))]
    FavoriteNotFound { name: String, available: Vec<String> },

    /// The operation needs a group but the room is not part of one.
    #[error("Room is not grouped: {0}")]
    NotGrouped(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The announcement audio could not be produced.
    #[error("Speech failed: {0}")]
    Speech(#[from] SpeechError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room_not_found",
            Self::NoSpeakers => "no_speakers",
            Self::FavoriteNotFound { .. } => "favorite_not_found",
            Self::Device(e) => e.code(),
            Self::NotGrouped(_) => "not_grouped",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Speech(e) => e.code(),
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) | Self::FavoriteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::NoSpeakers => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotGrouped(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Speech(SpeechError::EmptyText) => StatusCode::BAD_REQUEST,
            Self::Device(e) if e.is_connection() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Device(_) | Self::Speech(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the underlying failure means the device is unreachable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Device(e) if e.is_connection())
    }
}

/// Convenient Result alias for room operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("[Server] {}", self);
        }
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        Self::Internal(format!("discovery failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn room_not_found_is_404() {
        let err = ApiError::RoomNotFound("attic".into());
        assert_eq!(err.code(), "room_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn connection_failure_is_503_and_other_device_errors_502() {
        let down = ApiError::from(DeviceError::Connection("refused".into()));
        assert!(down.is_connection());
        assert_eq!(down.code(), "device_unreachable");
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let slow = ApiError::from(DeviceError::Timeout(Duration::from_secs(10)));
        assert!(!slow.is_connection());
        assert_eq!(slow.code(), "device_timeout");
        assert_eq!(slow.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn client_errors_are_400() {
        assert_eq!(
            ApiError::NotGrouped("den".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidRequest("volume".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SpeechError::EmptyText).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn favorite_miss_lists_available_titles() {
        let err = ApiError::FavoriteNotFound {
            name: "jazz".into(),
            available: vec!["Radio Paradise".into(), "Morning Mix".into()],
        };
        assert_eq!(err.code(), "favorite_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("Radio Paradise, Morning Mix"));
    }

    #[test]
    fn no_speakers_is_503() {
        assert_eq!(ApiError::NoSpeakers.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!ApiError::NoSpeakers.is_connection());
    }

    #[test]
    fn internal_is_500() {
        let err = ApiError::Internal("boom".into());
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
