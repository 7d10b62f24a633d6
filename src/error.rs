use thiserror::Error;

use crate::types::CaptureFailureReason;

/// Capture pipeline errors.
///
/// Every variant is terminal for the pipeline instance that raised it —
/// nothing is retried internally. Retry policy (e.g. reopening the device)
/// belongs to the caller.
#[derive(Debug, Error, PartialEq)]
pub enum CaptureError {
    #[error("no supported resolution for the requested stream")]
    NoSupportedResolution,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("stale {0} handle: a terminal event was already observed")]
    StaleHandle(&'static str),

    #[error("device reported error code {0}")]
    DeviceError(i32),

    #[error("device disconnected")]
    DeviceDisconnected,

    #[error("capture session configuration failed")]
    SessionConfigurationFailed,

    #[error("capture failed: {0}")]
    CaptureFailed(CaptureFailureReason),

    #[error("hardware layer error: {0}")]
    Hal(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CaptureError>;
