//! Capture session stage.
//!
//! `SessionConnection` drives the lifecycle of one capture session bound to
//! an opened device and a fixed, non-empty set of output targets.
//! [`build_capture_request`] is the capability-gated 3A policy applied to
//! every repeating request.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{CaptureError, Result};
use crate::hal::CameraHal;
use crate::types::{
    AeMode, AfMode, AwbMode, CapabilityDescriptor, CaptureRequestSpec, ControlMode, DeviceHandle,
    OutputTarget, SessionEvent, SessionHandle,
};

/// Lifecycle state of a capture session, as observed from its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Creation submitted, no `Configured` yet.
    Configuring,
    Configured,
    Ready,
    Active,
    /// Terminal: the session closed or its device went away.
    Closed,
    /// Terminal: configuration failed.
    Failed,
}

impl SessionState {
    /// Whether the session accepts a repeating request.
    pub fn accepts_repeating(self) -> bool {
        matches!(self, Self::Configured | Self::Ready | Self::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// One asynchronous session creation and the event sequence it produces.
pub struct SessionConnection<H: CameraHal> {
    hal: Arc<H>,
    handle: Option<SessionHandle>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    state: SessionState,
}

impl<H: CameraHal> SessionConnection<H> {
    /// Submit asynchronous session creation against an opened device.
    ///
    /// # Errors
    ///
    /// `CaptureError::SessionConfigurationFailed` if `targets` is empty — a
    /// session needs at least one output target to configure against.
    pub fn create(hal: Arc<H>, device: DeviceHandle, targets: &[OutputTarget]) -> Result<Self> {
        if targets.is_empty() {
            return Err(CaptureError::SessionConfigurationFailed);
        }

        let (tx, events) = mpsc::unbounded_channel();
        hal.create_session(
            device,
            targets,
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        )?;
        tracing::info!("Creating capture session on device {device:?}");
        Ok(Self {
            hal,
            handle: None,
            events,
            state: SessionState::Configuring,
        })
    }

    /// Next session event, in hardware emission order.
    ///
    /// Returns `None` once the sequence has terminated.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.state.is_terminal() {
            return None;
        }
        let event = self.events.recv().await?;
        match event {
            SessionEvent::Configured { session } => {
                self.handle = Some(session);
                self.state = SessionState::Configured;
            }
            SessionEvent::Ready { .. } => self.state = SessionState::Ready,
            SessionEvent::Active { .. } => self.state = SessionState::Active,
            SessionEvent::ConfigureFailed => self.state = SessionState::Failed,
            SessionEvent::Closed { .. } => self.state = SessionState::Closed,
            SessionEvent::SurfacePrepared { .. } => {}
        }
        Some(event)
    }

    /// The handle delivered by `Configured`, if configuration succeeded.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Mark the session invalid without touching the hardware.
    ///
    /// Used when the owning device reported a terminal event: the session
    /// cannot outlive its device, and no close may be issued against a
    /// device handle that no longer exists.
    pub fn invalidate(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Request an asynchronous close.
    ///
    /// A no-op before the session has configured.
    ///
    /// # Errors
    ///
    /// `CaptureError::StaleHandle` if a terminal event was already observed.
    pub fn close(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CaptureError::StaleHandle("session"));
        }
        match self.handle {
            Some(session) => self.hal.close_session(session),
            None => Ok(()),
        }
    }
}

/// Build the capture request for a repeating preview stream.
///
/// The 3A policy, gated on the device's capability descriptor:
/// - control mode is always AUTO;
/// - auto-focus is skipped entirely on fixed-focus lenses, otherwise
///   CONTINUOUS_PICTURE when available, falling back to AUTO;
/// - auto-exposure is ON_AUTO_FLASH when available, else ON (always
///   available);
/// - auto-white-balance is AUTO only when the device lists it — there is no
///   non-auto fallback, since AWB "on" is the implicit default.
pub fn build_capture_request(
    capabilities: &CapabilityDescriptor,
    targets: &[OutputTarget],
) -> CaptureRequestSpec {
    let af_mode = if capabilities.is_fixed_focus() {
        // Fixed-focus lens: an AF sweep is meaningless, leave it unset.
        None
    } else if capabilities.supports_af(AfMode::ContinuousPicture) {
        Some(AfMode::ContinuousPicture)
    } else {
        Some(AfMode::Auto)
    };

    let ae_mode = if capabilities.supports_ae(AeMode::OnAutoFlash) {
        AeMode::OnAutoFlash
    } else {
        AeMode::On
    };

    let awb_mode = capabilities
        .supports_awb(AwbMode::Auto)
        .then_some(AwbMode::Auto);

    CaptureRequestSpec {
        targets: targets.iter().map(|t| t.id).collect(),
        control_mode: ControlMode::Auto,
        af_mode,
        ae_mode,
        awb_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockHal;
    use crate::types::{DeviceId, LensFacing, Resolution, TargetId};
    use std::collections::HashMap;

    fn caps(
        af_modes: Vec<AfMode>,
        ae_modes: Vec<AeMode>,
        awb_modes: Vec<AwbMode>,
        min_focus_distance: Option<f32>,
    ) -> CapabilityDescriptor {
        CapabilityDescriptor {
            facing: LensFacing::Front,
            af_modes,
            ae_modes,
            awb_modes,
            min_focus_distance,
            stream_resolutions: HashMap::new(),
        }
    }

    fn target() -> OutputTarget {
        OutputTarget::bind(
            TargetId(0),
            Resolution::new(1280, 720),
            Resolution::new(1280, 720),
        )
    }

    fn front_hal() -> Arc<MockHal> {
        Arc::new(MockHal::new().with_device(
            DeviceId::new("front:0"),
            caps(vec![], vec![AeMode::On], vec![], None),
        ))
    }

    #[test]
    fn fixed_focus_lens_leaves_af_unset() {
        let caps = caps(
            vec![AfMode::Auto, AfMode::ContinuousPicture],
            vec![AeMode::On],
            vec![],
            Some(0.0),
        );
        let request = build_capture_request(&caps, &[target()]);
        assert_eq!(request.af_mode, None);
    }

    #[test]
    fn missing_focus_distance_leaves_af_unset() {
        let caps = caps(vec![AfMode::Auto], vec![AeMode::On], vec![], None);
        let request = build_capture_request(&caps, &[target()]);
        assert_eq!(request.af_mode, None);
    }

    #[test]
    fn continuous_picture_preferred_when_available() {
        let caps = caps(
            vec![AfMode::Auto, AfMode::ContinuousPicture],
            vec![AeMode::On],
            vec![],
            Some(10.0),
        );
        let request = build_capture_request(&caps, &[target()]);
        assert_eq!(request.af_mode, Some(AfMode::ContinuousPicture));
    }

    #[test]
    fn af_falls_back_to_auto() {
        let caps = caps(vec![AfMode::Auto], vec![AeMode::On], vec![], Some(10.0));
        let request = build_capture_request(&caps, &[target()]);
        assert_eq!(request.af_mode, Some(AfMode::Auto));
    }

    #[test]
    fn ae_prefers_auto_flash_then_on() {
        let with_flash = caps(vec![], vec![AeMode::On, AeMode::OnAutoFlash], vec![], None);
        assert_eq!(
            build_capture_request(&with_flash, &[target()]).ae_mode,
            AeMode::OnAutoFlash
        );

        let without_flash = caps(vec![], vec![AeMode::On], vec![], None);
        assert_eq!(
            build_capture_request(&without_flash, &[target()]).ae_mode,
            AeMode::On
        );
    }

    #[test]
    fn awb_set_only_when_auto_is_available() {
        let with_awb = caps(vec![], vec![AeMode::On], vec![AwbMode::Auto], None);
        assert_eq!(
            build_capture_request(&with_awb, &[target()]).awb_mode,
            Some(AwbMode::Auto)
        );

        let without_awb = caps(vec![], vec![AeMode::On], vec![AwbMode::Daylight], None);
        assert_eq!(build_capture_request(&without_awb, &[target()]).awb_mode, None);
    }

    #[test]
    fn control_mode_is_always_auto_and_targets_attach() {
        let caps = caps(vec![], vec![AeMode::On], vec![], None);
        let request = build_capture_request(&caps, &[target()]);
        assert_eq!(request.control_mode, ControlMode::Auto);
        assert_eq!(request.targets, vec![TargetId(0)]);
    }

    #[test]
    fn create_rejects_empty_target_list() {
        let hal = front_hal();
        let result = SessionConnection::create(hal, DeviceHandle(0), &[]);
        assert_eq!(
            result.err(),
            Some(CaptureError::SessionConfigurationFailed)
        );
    }

    #[tokio::test]
    async fn configured_event_records_handle_and_state() {
        let hal = front_hal();
        let mut conn = SessionConnection::create(hal, DeviceHandle(0), &[target()]).unwrap();

        let event = conn.next_event().await.unwrap();
        assert_eq!(event, SessionEvent::Configured { session: SessionHandle(0) });
        assert_eq!(conn.handle(), Some(SessionHandle(0)));
        assert!(conn.state().accepts_repeating());
    }

    #[tokio::test]
    async fn ready_follows_configured_when_scripted() {
        let hal = Arc::new(
            MockHal::new()
                .with_device(
                    DeviceId::new("front:0"),
                    caps(vec![], vec![AeMode::On], vec![], None),
                )
                .with_session_ready(),
        );
        let mut conn = SessionConnection::create(hal, DeviceHandle(0), &[target()]).unwrap();

        conn.next_event().await;
        let event = conn.next_event().await.unwrap();
        assert_eq!(event, SessionEvent::Ready { session: SessionHandle(0) });
        assert_eq!(conn.state(), SessionState::Ready);
        assert!(conn.state().accepts_repeating());
    }

    #[tokio::test]
    async fn configure_failure_is_terminal() {
        let hal = Arc::new(
            MockHal::new()
                .with_device(
                    DeviceId::new("front:0"),
                    caps(vec![], vec![AeMode::On], vec![], None),
                )
                .with_configure_failure(),
        );
        let mut conn = SessionConnection::create(hal, DeviceHandle(0), &[target()]).unwrap();

        assert_eq!(conn.next_event().await, Some(SessionEvent::ConfigureFailed));
        assert!(conn.is_terminal());
        assert_eq!(conn.next_event().await, None);
        assert_eq!(conn.close(), Err(CaptureError::StaleHandle("session")));
    }

    #[tokio::test]
    async fn invalidate_marks_terminal_without_hardware_calls() {
        let hal = front_hal();
        let mut conn =
            SessionConnection::create(Arc::clone(&hal), DeviceHandle(0), &[target()]).unwrap();
        conn.next_event().await;

        conn.invalidate();
        assert!(conn.is_terminal());
        assert_eq!(conn.close(), Err(CaptureError::StaleHandle("session")));
        assert_eq!(hal.call_count("close_session"), 0);
    }

    #[tokio::test]
    async fn close_submits_and_closed_event_arrives() {
        let hal = front_hal();
        let mut conn =
            SessionConnection::create(Arc::clone(&hal), DeviceHandle(0), &[target()]).unwrap();
        conn.next_event().await;

        conn.close().unwrap();
        assert_eq!(hal.call_count("close_session"), 1);
        assert_eq!(
            conn.next_event().await,
            Some(SessionEvent::Closed { session: SessionHandle(0) })
        );
        assert!(conn.is_terminal());
    }
}
