//! Device and resolution selection.
//!
//! Pure selection logic run once at startup: pick the front-facing device
//! and the output resolutions the pipeline will stream at.

use crate::error::{CaptureError, Result};
use crate::hal::CameraHal;
use crate::types::{CapabilityDescriptor, DeviceId, LensFacing, Resolution, StreamFormat};

/// Upper bound on the preview stream width.
pub const MAX_PREVIEW_WIDTH: u32 = 1920;
/// Upper bound on the preview stream height.
pub const MAX_PREVIEW_HEIGHT: u32 = 1920;
/// Upper bound on the still-image width.
pub const MAX_STILL_IMAGE_WIDTH: u32 = 1920;
/// Upper bound on the still-image height.
pub const MAX_STILL_IMAGE_HEIGHT: u32 = 1920;

/// Choose the preview resolution from a device's supported set.
///
/// Candidates within the bound are compared by area (widened to `u64` so the
/// multiplication cannot overflow); among equal areas the last-enumerated
/// candidate wins. If no candidate fits the bound, the first-enumerated
/// resolution is returned as a fallback.
///
/// # Errors
///
/// `CaptureError::NoSupportedResolution` if `resolutions` is empty.
pub fn select_preview_size(
    resolutions: &[Resolution],
    max_width: u32,
    max_height: u32,
) -> Result<Resolution> {
    let first = resolutions
        .first()
        .copied()
        .ok_or(CaptureError::NoSupportedResolution)?;

    let best = resolutions
        .iter()
        .copied()
        .filter(|r| r.width <= max_width && r.height <= max_height)
        .max_by_key(|r| r.area());

    Ok(best.unwrap_or(first))
}

/// Choose the still-image resolution matching the preview aspect ratio.
///
/// Same bound filter, max-area comparison and first-enumerated fallback as
/// [`select_preview_size`], but candidates must first satisfy
/// `width == height * preview.width / preview.height` (integer division).
///
/// Not wired into the default pipeline — the repeating preview flow has no
/// still-capture consumer — but exposed as a standalone utility.
///
/// # Errors
///
/// `CaptureError::NoSupportedResolution` if `resolutions` is empty.
pub fn select_still_size(
    resolutions: &[Resolution],
    preview: Resolution,
    max_width: u32,
    max_height: u32,
) -> Result<Resolution> {
    let first = resolutions
        .first()
        .copied()
        .ok_or(CaptureError::NoSupportedResolution)?;

    // A zero-height preview cannot match any aspect ratio.
    if preview.height == 0 {
        return Ok(first);
    }

    let best = resolutions
        .iter()
        .copied()
        .filter(|r| {
            u64::from(r.width)
                == u64::from(r.height) * u64::from(preview.width) / u64::from(preview.height)
        })
        .filter(|r| r.width <= max_width && r.height <= max_height)
        .max_by_key(|r| r.area());

    Ok(best.unwrap_or(first))
}

/// Pick the first front-facing device from an enumeration.
pub fn front_device(
    devices: &[(DeviceId, CapabilityDescriptor)],
) -> Option<&(DeviceId, CapabilityDescriptor)> {
    devices
        .iter()
        .find(|(_, caps)| caps.facing == LensFacing::Front)
}

/// Startup snapshot: the chosen device, its capabilities and the preview
/// resolution the pipeline will bind its output target to.
#[derive(Debug, Clone)]
pub struct CameraParams {
    pub device_id: DeviceId,
    pub capabilities: CapabilityDescriptor,
    pub preview_size: Resolution,
}

impl CameraParams {
    /// Enumerate devices, pick the front-facing one and select its preview
    /// resolution.
    ///
    /// # Errors
    ///
    /// `CaptureError::DeviceNotFound` if no front-facing device exists;
    /// `CaptureError::NoSupportedResolution` if it reports no preview
    /// resolutions.
    pub fn select<H: CameraHal + ?Sized>(hal: &H) -> Result<Self> {
        let devices = hal.enumerate_devices()?;
        let (device_id, capabilities) = front_device(&devices)
            .cloned()
            .ok_or_else(|| CaptureError::DeviceNotFound("no front-facing device".to_string()))?;

        let preview_size = select_preview_size(
            capabilities.resolutions(StreamFormat::PreviewTexture),
            MAX_PREVIEW_WIDTH,
            MAX_PREVIEW_HEIGHT,
        )?;

        tracing::info!("Selected device '{device_id}' with preview size {preview_size}");

        Ok(Self {
            device_id,
            capabilities,
            preview_size,
        })
    }
}
