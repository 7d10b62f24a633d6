use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Stable device identifier as reported by the hardware layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new `DeviceId` from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the inner string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A width × height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel area, widened to `u64` so the multiplication cannot overflow.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which way the device's lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LensFacing {
    Front,
    Back,
    External,
}

/// Auto-focus control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AfMode {
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
}

/// Auto-exposure control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AeMode {
    On,
    OnAutoFlash,
    OnAlwaysFlash,
}

/// Auto-white-balance control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AwbMode {
    Auto,
    Incandescent,
    Daylight,
    Cloudy,
}

/// Top-level 3A control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Auto,
    Off,
}

/// Output stream formats a device can report resolutions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    /// Preview textures streamed into a rendering target.
    PreviewTexture,
    /// Still-image JPEG output.
    Jpeg,
}

/// Immutable snapshot of hardware-reported capabilities.
///
/// Queried once per candidate device at startup; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub facing: LensFacing,
    pub af_modes: Vec<AfMode>,
    pub ae_modes: Vec<AeMode>,
    pub awb_modes: Vec<AwbMode>,
    /// Minimum focus distance in diopters. `None` or `0.0` means the lens
    /// is fixed-focus and cannot run an auto-focus sweep.
    pub min_focus_distance: Option<f32>,
    /// Supported output resolutions per stream format, in the hardware's
    /// enumeration order.
    pub stream_resolutions: HashMap<StreamFormat, Vec<Resolution>>,
}

impl CapabilityDescriptor {
    /// Supported resolutions for a stream format, in enumeration order.
    pub fn resolutions(&self, format: StreamFormat) -> &[Resolution] {
        self.stream_resolutions
            .get(&format)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the lens is fixed-focus (no minimum focus distance reported,
    /// or reported as zero).
    pub fn is_fixed_focus(&self) -> bool {
        match self.min_focus_distance {
            None => true,
            Some(dist) => dist == 0.0,
        }
    }

    pub fn supports_af(&self, mode: AfMode) -> bool {
        self.af_modes.contains(&mode)
    }

    pub fn supports_ae(&self, mode: AeMode) -> bool {
        self.ae_modes.contains(&mode)
    }

    pub fn supports_awb(&self, mode: AwbMode) -> bool {
        self.awb_modes.contains(&mode)
    }
}

/// Identifier for one output target within a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TargetId(pub u32);

/// A rendering destination the hardware streams frames into.
///
/// Created once when the target provider reports readiness; the backing
/// buffer size is bound to the selected preview resolution at that point and
/// the target is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTarget {
    pub id: TargetId,
    /// The target's native dimensions as reported by the provider.
    pub native_size: Resolution,
    /// The backing buffer dimensions the hardware must stream into.
    pub buffer_size: Resolution,
}

impl OutputTarget {
    /// Bind a ready target to the resolution the hardware will produce.
    pub fn bind(id: TargetId, native_size: Resolution, buffer_size: Resolution) -> Self {
        Self {
            id,
            native_size,
            buffer_size,
        }
    }
}

/// Opaque handle to one open hardware device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle(pub u32);

/// Opaque handle to one configured capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionHandle(pub u32);

/// Device lifecycle events delivered by the hardware layer.
///
/// `Closed`, `Disconnected` and `Error` are terminal: no further events for
/// that handle are possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    Opened { device: DeviceHandle },
    Closed { device: DeviceHandle },
    Disconnected { device: DeviceHandle },
    Error { code: i32 },
}

/// Capture session lifecycle events delivered by the hardware layer.
///
/// `ConfigureFailed` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Configured { session: SessionHandle },
    ConfigureFailed,
    Ready { session: SessionHandle },
    Active { session: SessionHandle },
    Closed { session: SessionHandle },
    SurfacePrepared { session: SessionHandle, target: TargetId },
}

/// Why a repeating capture iteration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFailureReason {
    /// The hardware dropped or corrupted the frame.
    Error,
    /// The request was flushed before completion.
    Flushed,
}

impl fmt::Display for CaptureFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "frame error"),
            Self::Flushed => write!(f, "request flushed"),
        }
    }
}

/// Per-frame metadata echoed back by the hardware: the 3A modes that were
/// actually applied to the completed capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    pub af_mode: Option<AfMode>,
    pub ae_mode: Option<AeMode>,
    pub awb_mode: Option<AwbMode>,
}

/// Outcome of a single repeating-request iteration.
///
/// `Failed` is terminal for the stream: the session rejects further delivery
/// after a capture failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureFrameResult {
    #[serde(rename_all = "camelCase")]
    Completed {
        frame_number: u64,
        timestamp_us: u64,
        metadata: FrameMetadata,
    },
    Failed {
        reason: CaptureFailureReason,
    },
}

/// Immutable description of one capture operation: the target surfaces plus
/// the 3A control parameters to apply. Built once and reused for every frame
/// of a repeating request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequestSpec {
    pub targets: Vec<TargetId>,
    pub control_mode: ControlMode,
    /// `None` means auto-focus is left unset (fixed-focus lens).
    pub af_mode: Option<AfMode>,
    pub ae_mode: AeMode,
    /// `None` means auto-white-balance is left at the hardware default.
    pub awb_mode: Option<AwbMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with_focus(min_focus_distance: Option<f32>) -> CapabilityDescriptor {
        CapabilityDescriptor {
            facing: LensFacing::Front,
            af_modes: vec![AfMode::Auto],
            ae_modes: vec![AeMode::On],
            awb_modes: vec![AwbMode::Auto],
            min_focus_distance,
            stream_resolutions: HashMap::new(),
        }
    }

    #[test]
    fn device_id_display_matches_inner() {
        let id = DeviceId::new("front:0");
        assert_eq!(id.to_string(), "front:0");
        assert_eq!(id.as_str(), "front:0");
    }

    #[test]
    fn resolution_area_does_not_overflow_u32() {
        let r = Resolution::new(u32::MAX, u32::MAX);
        assert_eq!(r.area(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn fixed_focus_when_distance_missing() {
        assert!(caps_with_focus(None).is_fixed_focus());
    }

    #[test]
    fn fixed_focus_when_distance_zero() {
        assert!(caps_with_focus(Some(0.0)).is_fixed_focus());
    }

    #[test]
    fn not_fixed_focus_when_distance_nonzero() {
        assert!(!caps_with_focus(Some(10.0)).is_fixed_focus());
    }

    #[test]
    fn resolutions_for_unknown_format_are_empty() {
        let caps = caps_with_focus(None);
        assert!(caps.resolutions(StreamFormat::Jpeg).is_empty());
    }

    #[test]
    fn completed_frame_serializes_with_camel_case_fields() {
        let result = CaptureFrameResult::Completed {
            frame_number: 7,
            timestamp_us: 1_000,
            metadata: FrameMetadata::default(),
        };
        let payload = serde_json::to_value(&result).unwrap();
        assert_eq!(payload["kind"], "completed");
        assert_eq!(payload["frameNumber"], 7);
        assert!(
            payload.get("frame_number").is_none(),
            "must use 'frameNumber' not 'frame_number'"
        );
    }

    #[test]
    fn device_event_serializes_with_kind_tag() {
        let event = DeviceEvent::Error { code: 3 };
        let payload = serde_json::to_value(event).unwrap();
        assert_eq!(payload["kind"], "error");
        assert_eq!(payload["code"], 3);
    }
}
