//! Hardware abstraction layer.
//!
//! [`CameraHal`] is the four-operation contract the pipeline depends on:
//! device enumeration, asynchronous device open/close, asynchronous session
//! creation, and repeating-request submission — all completion-signalled via
//! callbacks. [`mock::MockHal`] implements it in memory for tests and
//! hardware-free development.

pub mod mock;

use crate::error::Result;
use crate::types::{
    CapabilityDescriptor, CaptureFrameResult, CaptureRequestSpec, DeviceEvent, DeviceHandle,
    DeviceId, OutputTarget, SessionEvent, SessionHandle,
};

/// Device lifecycle callback. May fire on any thread the hardware chooses.
pub type DeviceEventCallback = Box<dyn Fn(DeviceEvent) + Send>;

/// Session lifecycle callback. May fire on any thread the hardware chooses.
pub type SessionEventCallback = Box<dyn Fn(SessionEvent) + Send>;

/// Per-frame capture callback. May fire on any thread the hardware chooses.
pub type CaptureEventCallback = Box<dyn Fn(CaptureFrameResult) + Send>;

/// Callback-driven hardware device/session/capture abstraction.
///
/// Every asynchronous operation is fire-and-forget at the call site: a
/// successful return means the request was submitted, and completion arrives
/// through the registered callback. Callbacks fire on unspecified threads —
/// callers must marshal them onto their own dispatch point and never assume
/// caller-thread delivery.
pub trait CameraHal: Send + Sync {
    /// Enumerate devices, returning identifier + capability descriptor pairs.
    fn enumerate_devices(&self) -> Result<Vec<(DeviceId, CapabilityDescriptor)>>;

    /// Request an asynchronous device open.
    ///
    /// The callback receives `Opened` on success, or a terminal
    /// `Error`/`Disconnected`. After any terminal event no further events
    /// for that handle are delivered.
    fn open_device(&self, id: &DeviceId, events: DeviceEventCallback) -> Result<()>;

    /// Request an asynchronous device close.
    ///
    /// The `Closed` event on the device's callback is the authoritative
    /// signal that the handle is invalid.
    fn close_device(&self, device: DeviceHandle) -> Result<()>;

    /// Request asynchronous creation of a capture session bound to `device`
    /// and the given output targets.
    fn create_session(
        &self,
        device: DeviceHandle,
        targets: &[OutputTarget],
        events: SessionEventCallback,
    ) -> Result<()>;

    /// Request an asynchronous session close.
    fn close_session(&self, session: SessionHandle) -> Result<()>;

    /// Submit a repeating capture request against a configured session.
    ///
    /// The callback receives one `CaptureFrameResult` per iteration until
    /// the request is stopped, the session closes, or a `Failed` result
    /// terminates the stream.
    fn set_repeating_request(
        &self,
        session: SessionHandle,
        request: &CaptureRequestSpec,
        events: CaptureEventCallback,
    ) -> Result<()>;

    /// Stop the repeating request on a session.
    ///
    /// Must succeed (as a no-op) when the session is already closed or no
    /// repeating request is active.
    fn stop_repeating(&self, session: SessionHandle) -> Result<()>;
}
