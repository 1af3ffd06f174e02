//! Error type shared by every speaker capability.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Coarse failure category used by retry and rediscovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    /// The device answered, but with a fault or an unexpected status.
    Protocol,
    /// The device could not be reached at all.
    Connection,
    /// The device did not answer in time.
    Timeout,
    /// Local or transport I/O failure.
    Io,
    /// The device answered with something we could not understand.
    Parse,
}

/// Errors returned by speaker control capabilities.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// HTTP transport failure talking to the speaker.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Speaker returned a non-success HTTP status without a SOAP fault.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Speaker returned a SOAP fault response.
    #[error("SOAP fault: {0}")]
    Fault(String),

    /// Speaker could not be reached.
    #[error("device unreachable: {0}")]
    Connection(String),

    /// Speaker did not respond in time.
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response could not be parsed.
    #[error("failed to parse device response: {0}")]
    Parse(String),
}

/// Convenient Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

impl DeviceError {
    /// Classifies this error for retry and rediscovery decisions.
    #[must_use]
    pub fn kind(&self) -> DeviceErrorKind {
        match self {
            // A connect that times out still means the address is stale
            Self::Http(e) if e.is_connect() || is_connection_io(e) => DeviceErrorKind::Connection,
            Self::Http(e) if e.is_timeout() => DeviceErrorKind::Timeout,
            Self::Http(e) if e.is_decode() => DeviceErrorKind::Parse,
            Self::Http(_) => DeviceErrorKind::Io,
            Self::HttpStatus(_, _) | Self::Fault(_) => DeviceErrorKind::Protocol,
            Self::Connection(_) => DeviceErrorKind::Connection,
            Self::Timeout(_) => DeviceErrorKind::Timeout,
            Self::Io(e) if is_connection_io_kind(e.kind()) => DeviceErrorKind::Connection,
            Self::Io(_) => DeviceErrorKind::Io,
            Self::Parse(_) => DeviceErrorKind::Parse,
        }
    }

    /// Returns true when the device itself could not be reached.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        self.kind() == DeviceErrorKind::Connection
    }
}

fn is_connection_io_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
    )
}

/// Walks the source chain looking for a reset, refused or aborted socket.
fn is_connection_io(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if is_connection_io_kind(io.kind()) {
                return true;
            }
        }
        source = e.source();
    }
    false
}
