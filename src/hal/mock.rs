//! Mock hardware layer for testing without real capture hardware.
//!
//! Uses a builder pattern to configure devices, open/configure outcomes and
//! the per-frame capture script. Every event is delivered from a spawned
//! thread so consumers exercise the same cross-thread marshalling path real
//! hardware callbacks take. All submitted operations are recorded in a call
//! log for assertions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{CaptureError, Result};
use crate::types::{
    CapabilityDescriptor, CaptureFailureReason, CaptureFrameResult, CaptureRequestSpec,
    DeviceEvent, DeviceHandle, DeviceId, FrameMetadata, OutputTarget, SessionEvent, SessionHandle,
};

use super::{CameraHal, CaptureEventCallback, DeviceEventCallback, SessionEventCallback};

/// Shared, thread-invokable device callback.
type SharedDeviceCallback = Arc<Mutex<DeviceEventCallback>>;
/// Shared, thread-invokable session callback.
type SharedSessionCallback = Arc<Mutex<SessionEventCallback>>;

/// Outcome scripted for `open_device`.
#[derive(Debug, Clone, Copy)]
enum OpenOutcome {
    Opened,
    Error(i32),
}

/// Outcome scripted for `create_session`.
#[derive(Debug, Clone, Copy)]
enum ConfigureOutcome {
    Configured,
    ConfigureFailed,
}

/// One scripted repeating-request iteration.
#[derive(Debug, Clone, Copy)]
enum PlannedFrame {
    Completed,
    Failed(CaptureFailureReason),
}

struct MockState {
    devices: Vec<(DeviceId, CapabilityDescriptor)>,
    open_outcome: OpenOutcome,
    configure_outcome: ConfigureOutcome,
    ready_after_configure: bool,
    frames: Vec<PlannedFrame>,
    calls: Vec<String>,
    next_device: u32,
    next_session: u32,
    device_callbacks: HashMap<u32, SharedDeviceCallback>,
    session_callbacks: HashMap<u32, SharedSessionCallback>,
    sessions_open: HashMap<u32, bool>,
    repeating_active: HashMap<u32, bool>,
}

/// Scriptable in-memory `CameraHal` implementation.
///
/// All state is behind a `Mutex` so the mock satisfies `Send + Sync`.
pub struct MockHal {
    state: Arc<Mutex<MockState>>,
}

impl MockHal {
    /// Create a new empty mock (no devices, opens succeed, sessions
    /// configure, no frames scripted).
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                devices: Vec::new(),
                open_outcome: OpenOutcome::Opened,
                configure_outcome: ConfigureOutcome::Configured,
                ready_after_configure: false,
                frames: Vec::new(),
                calls: Vec::new(),
                next_device: 0,
                next_session: 0,
                device_callbacks: HashMap::new(),
                session_callbacks: HashMap::new(),
                sessions_open: HashMap::new(),
                repeating_active: HashMap::new(),
            })),
        }
    }

    /// Add a device with the given identifier and capabilities.
    pub fn with_device(self, id: DeviceId, capabilities: CapabilityDescriptor) -> Self {
        self.state.lock().devices.push((id, capabilities));
        self
    }

    /// Script `open_device` to deliver a terminal `Error(code)` instead of
    /// `Opened`.
    pub fn with_open_error(self, code: i32) -> Self {
        self.state.lock().open_outcome = OpenOutcome::Error(code);
        self
    }

    /// Script `create_session` to deliver `ConfigureFailed`.
    pub fn with_configure_failure(self) -> Self {
        self.state.lock().configure_outcome = ConfigureOutcome::ConfigureFailed;
        self
    }

    /// Script `create_session` to deliver `Ready` after `Configured`.
    pub fn with_session_ready(self) -> Self {
        self.state.lock().ready_after_configure = true;
        self
    }

    /// Script `count` completed frames for the repeating request.
    pub fn with_frames(self, count: usize) -> Self {
        self.state
            .lock()
            .frames
            .extend(std::iter::repeat(PlannedFrame::Completed).take(count));
        self
    }

    /// Script a capture failure after the already-scripted frames.
    pub fn with_capture_failure(self, reason: CaptureFailureReason) -> Self {
        self.state.lock().frames.push(PlannedFrame::Failed(reason));
        self
    }

    /// All recorded hardware submissions, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// How many times the named operation was submitted.
    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c == &name).count()
    }

    /// Deliver a device event on a background thread, as hardware would for
    /// a spontaneous close or disconnect.
    pub fn emit_device_event(&self, device: DeviceHandle, event: DeviceEvent) {
        let callback = self.state.lock().device_callbacks.get(&device.0).cloned();
        if let Some(callback) = callback {
            std::thread::spawn(move || (callback.lock())(event));
        }
    }

    /// Deliver a session event on a background thread.
    pub fn emit_session_event(&self, session: SessionHandle, event: SessionEvent) {
        let callback = self.state.lock().session_callbacks.get(&session.0).cloned();
        if let Some(callback) = callback {
            std::thread::spawn(move || (callback.lock())(event));
        }
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_string());
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraHal for MockHal {
    fn enumerate_devices(&self) -> Result<Vec<(DeviceId, CapabilityDescriptor)>> {
        self.record("enumerate_devices");
        Ok(self.state.lock().devices.clone())
    }

    fn open_device(&self, id: &DeviceId, events: DeviceEventCallback) -> Result<()> {
        self.record("open_device");
        let mut state = self.state.lock();
        if !state.devices.iter().any(|(known, _)| known == id) {
            return Err(CaptureError::DeviceNotFound(id.to_string()));
        }

        let handle = DeviceHandle(state.next_device);
        state.next_device += 1;
        let callback: SharedDeviceCallback = Arc::new(Mutex::new(events));
        state.device_callbacks.insert(handle.0, Arc::clone(&callback));
        let outcome = state.open_outcome;
        drop(state);

        std::thread::spawn(move || {
            let event = match outcome {
                OpenOutcome::Opened => DeviceEvent::Opened { device: handle },
                OpenOutcome::Error(code) => DeviceEvent::Error { code },
            };
            (callback.lock())(event);
        });
        Ok(())
    }

    fn close_device(&self, device: DeviceHandle) -> Result<()> {
        self.record("close_device");
        let callback = self.state.lock().device_callbacks.get(&device.0).cloned();
        if let Some(callback) = callback {
            std::thread::spawn(move || (callback.lock())(DeviceEvent::Closed { device }));
        }
        Ok(())
    }

    fn create_session(
        &self,
        _device: DeviceHandle,
        _targets: &[OutputTarget],
        events: SessionEventCallback,
    ) -> Result<()> {
        self.record("create_session");
        let mut state = self.state.lock();
        let handle = SessionHandle(state.next_session);
        state.next_session += 1;
        let callback: SharedSessionCallback = Arc::new(Mutex::new(events));
        state.session_callbacks.insert(handle.0, Arc::clone(&callback));
        state.sessions_open.insert(handle.0, true);
        let outcome = state.configure_outcome;
        let emit_ready = state.ready_after_configure;
        drop(state);

        std::thread::spawn(move || match outcome {
            ConfigureOutcome::Configured => {
                (callback.lock())(SessionEvent::Configured { session: handle });
                if emit_ready {
                    (callback.lock())(SessionEvent::Ready { session: handle });
                }
            }
            ConfigureOutcome::ConfigureFailed => {
                (callback.lock())(SessionEvent::ConfigureFailed);
            }
        });
        Ok(())
    }

    fn close_session(&self, session: SessionHandle) -> Result<()> {
        self.record("close_session");
        let mut state = self.state.lock();
        state.sessions_open.insert(session.0, false);
        state.repeating_active.insert(session.0, false);
        let callback = state.session_callbacks.get(&session.0).cloned();
        drop(state);

        if let Some(callback) = callback {
            std::thread::spawn(move || (callback.lock())(SessionEvent::Closed { session }));
        }
        Ok(())
    }

    fn set_repeating_request(
        &self,
        session: SessionHandle,
        request: &CaptureRequestSpec,
        events: CaptureEventCallback,
    ) -> Result<()> {
        self.record("set_repeating_request");
        let mut state = self.state.lock();
        if !state.sessions_open.get(&session.0).copied().unwrap_or(false) {
            return Err(CaptureError::Hal(format!(
                "session {} is not open",
                session.0
            )));
        }
        state.repeating_active.insert(session.0, true);
        let frames = state.frames.clone();
        drop(state);

        let metadata = FrameMetadata {
            af_mode: request.af_mode,
            ae_mode: Some(request.ae_mode),
            awb_mode: request.awb_mode,
        };
        let shared = Arc::clone(&self.state);

        std::thread::spawn(move || {
            for (index, planned) in frames.iter().enumerate() {
                {
                    let state = shared.lock();
                    let open = state.sessions_open.get(&session.0).copied().unwrap_or(false);
                    let active = state
                        .repeating_active
                        .get(&session.0)
                        .copied()
                        .unwrap_or(false);
                    if !open || !active {
                        return;
                    }
                }

                let frame_number = index as u64 + 1;
                let result = match planned {
                    PlannedFrame::Completed => CaptureFrameResult::Completed {
                        frame_number,
                        timestamp_us: frame_number * 33_333,
                        metadata,
                    },
                    PlannedFrame::Failed(reason) => CaptureFrameResult::Failed { reason: *reason },
                };
                let terminal = matches!(result, CaptureFrameResult::Failed { .. });
                events(result);
                if terminal {
                    return;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        Ok(())
    }

    fn stop_repeating(&self, session: SessionHandle) -> Result<()> {
        self.record("stop_repeating");
        // Succeeds even when the session is already closed.
        self.state.lock().repeating_active.insert(session.0, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AeMode, AwbMode, ControlMode, LensFacing, Resolution, StreamFormat};
    use std::sync::mpsc;

    fn test_caps() -> CapabilityDescriptor {
        let mut stream_resolutions = HashMap::new();
        stream_resolutions.insert(
            StreamFormat::PreviewTexture,
            vec![Resolution::new(1280, 720)],
        );
        CapabilityDescriptor {
            facing: LensFacing::Front,
            af_modes: vec![],
            ae_modes: vec![AeMode::On],
            awb_modes: vec![AwbMode::Auto],
            min_focus_distance: None,
            stream_resolutions,
        }
    }

    fn test_request() -> CaptureRequestSpec {
        CaptureRequestSpec {
            targets: vec![],
            control_mode: ControlMode::Auto,
            af_mode: None,
            ae_mode: AeMode::On,
            awb_mode: Some(AwbMode::Auto),
        }
    }

    #[test]
    fn enumerate_returns_configured_devices() {
        let hal = MockHal::new().with_device(DeviceId::new("front:0"), test_caps());
        let devices = hal.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].0, DeviceId::new("front:0"));
    }

    #[test]
    fn open_unknown_device_fails_synchronously() {
        let hal = MockHal::new();
        let result = hal.open_device(&DeviceId::new("missing"), Box::new(|_| {}));
        assert!(matches!(result, Err(CaptureError::DeviceNotFound(_))));
    }

    #[test]
    fn open_delivers_opened_on_a_background_thread() {
        let hal = MockHal::new().with_device(DeviceId::new("front:0"), test_caps());
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        hal.open_device(
            &DeviceId::new("front:0"),
            Box::new(move |event| {
                let _ = tx.send((event, std::thread::current().id()));
            }),
        )
        .unwrap();

        let (event, delivery_thread) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event, DeviceEvent::Opened { device: DeviceHandle(0) });
        assert_ne!(delivery_thread, caller, "events must not arrive on the caller thread");
    }

    #[test]
    fn scripted_open_error_is_delivered() {
        let hal = MockHal::new()
            .with_device(DeviceId::new("front:0"), test_caps())
            .with_open_error(3);
        let (tx, rx) = mpsc::channel();
        hal.open_device(
            &DeviceId::new("front:0"),
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        )
        .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            DeviceEvent::Error { code: 3 }
        );
    }

    #[test]
    fn frames_are_delivered_in_script_order() {
        let hal = MockHal::new().with_device(DeviceId::new("front:0"), test_caps());
        hal.create_session(DeviceHandle(0), &[], Box::new(|_| {})).unwrap();

        let (tx, rx) = mpsc::channel();
        let hal = hal.with_frames(3);
        hal.set_repeating_request(
            SessionHandle(0),
            &test_request(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        )
        .unwrap();

        for expected in 1..=3u64 {
            let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            match result {
                CaptureFrameResult::Completed { frame_number, .. } => {
                    assert_eq!(frame_number, expected);
                }
                CaptureFrameResult::Failed { reason } => panic!("unexpected failure: {reason}"),
            }
        }
    }

    #[test]
    fn repeating_on_closed_session_is_rejected() {
        let hal = MockHal::new();
        let result = hal.set_repeating_request(SessionHandle(9), &test_request(), Box::new(|_| {}));
        assert!(matches!(result, Err(CaptureError::Hal(_))));
    }

    #[test]
    fn stop_repeating_succeeds_without_active_request() {
        let hal = MockHal::new();
        assert!(hal.stop_repeating(SessionHandle(0)).is_ok());
    }

    #[test]
    fn call_log_records_submissions_in_order() {
        let hal = MockHal::new().with_device(DeviceId::new("front:0"), test_caps());
        hal.enumerate_devices().unwrap();
        hal.open_device(&DeviceId::new("front:0"), Box::new(|_| {})).unwrap();
        hal.close_device(DeviceHandle(0)).unwrap();
        assert_eq!(
            hal.calls(),
            vec!["enumerate_devices", "open_device", "close_device"]
        );
        assert_eq!(hal.call_count("open_device"), 1);
    }
}
