//! Device lifecycle stage.
//!
//! Wraps the hardware layer's device callbacks into an ordered event
//! sequence. Callbacks arrive on whatever thread the hardware chooses; the
//! channel marshals them so the consumer observes them one at a time, in
//! emission order.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{CaptureError, Result};
use crate::hal::CameraHal;
use crate::types::{DeviceEvent, DeviceHandle, DeviceId};

/// One asynchronous device open and the event sequence it produces.
///
/// `Closed`, `Disconnected` and `Error` are terminal: once one has been
/// observed through [`next_event`](Self::next_event) the sequence ends and
/// any further operation on the connection fails fast with `StaleHandle`.
pub struct DeviceConnection<H: CameraHal> {
    hal: Arc<H>,
    handle: Option<DeviceHandle>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
    terminal: bool,
}

impl<H: CameraHal> DeviceConnection<H> {
    /// Submit an asynchronous device open.
    ///
    /// Returns immediately; the `Opened` (or terminal) event arrives via
    /// [`next_event`](Self::next_event).
    pub fn open(hal: Arc<H>, id: &DeviceId) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        hal.open_device(
            id,
            Box::new(move |event| {
                // The consumer may already be gone during teardown.
                let _ = tx.send(event);
            }),
        )?;
        tracing::info!("Opening device '{id}'");
        Ok(Self {
            hal,
            handle: None,
            events,
            terminal: false,
        })
    }

    /// Next device event, in hardware emission order.
    ///
    /// Returns `None` once the sequence has terminated.
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        if self.terminal {
            return None;
        }
        let event = self.events.recv().await?;
        match event {
            DeviceEvent::Opened { device } => self.handle = Some(device),
            DeviceEvent::Closed { .. }
            | DeviceEvent::Disconnected { .. }
            | DeviceEvent::Error { .. } => self.terminal = true,
        }
        Some(event)
    }

    /// The handle delivered by `Opened`, if the device has opened.
    pub fn handle(&self) -> Option<DeviceHandle> {
        self.handle
    }

    /// Whether a terminal event has been observed.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Request an asynchronous close.
    ///
    /// A no-op before the device has opened. The corresponding `Closed`
    /// event is the authoritative signal that the handle is invalid.
    ///
    /// # Errors
    ///
    /// `CaptureError::StaleHandle` if a terminal event was already observed.
    pub fn close(&mut self) -> Result<()> {
        if self.terminal {
            return Err(CaptureError::StaleHandle("device"));
        }
        match self.handle {
            Some(device) => self.hal.close_device(device),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockHal;
    use crate::types::{
        AeMode, AwbMode, CapabilityDescriptor, LensFacing, Resolution, StreamFormat,
    };
    use std::collections::HashMap;

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

    fn front_hal() -> Arc<MockHal> {
        Arc::new(MockHal::new().with_device(DeviceId::new("front:0"), test_caps()))
    }

    #[tokio::test]
    async fn open_yields_opened_and_records_handle() {
        let hal = front_hal();
        let mut conn = DeviceConnection::open(Arc::clone(&hal), &DeviceId::new("front:0")).unwrap();

        let event = conn.next_event().await.unwrap();
        assert_eq!(event, DeviceEvent::Opened { device: DeviceHandle(0) });
        assert_eq!(conn.handle(), Some(DeviceHandle(0)));
        assert!(!conn.is_terminal());
    }

    #[tokio::test]
    async fn error_event_terminates_the_sequence() {
        let hal = Arc::new(
            MockHal::new()
                .with_device(DeviceId::new("front:0"), test_caps())
                .with_open_error(3),
        );
        let mut conn = DeviceConnection::open(Arc::clone(&hal), &DeviceId::new("front:0")).unwrap();

        assert_eq!(conn.next_event().await, Some(DeviceEvent::Error { code: 3 }));
        assert!(conn.is_terminal());
        assert_eq!(conn.next_event().await, None);
    }

    #[tokio::test]
    async fn close_after_terminal_event_is_stale() {
        let hal = Arc::new(
            MockHal::new()
                .with_device(DeviceId::new("front:0"), test_caps())
                .with_open_error(3),
        );
        let mut conn = DeviceConnection::open(Arc::clone(&hal), &DeviceId::new("front:0")).unwrap();
        conn.next_event().await;

        assert_eq!(conn.close(), Err(CaptureError::StaleHandle("device")));
        assert_eq!(hal.call_count("close_device"), 0);
    }

    #[tokio::test]
    async fn close_before_open_completes_is_a_no_op() {
        let hal = front_hal();
        let mut conn = DeviceConnection::open(Arc::clone(&hal), &DeviceId::new("front:0")).unwrap();

        // No Opened event consumed yet, so there is no handle to close.
        assert!(conn.close().is_ok());
        assert_eq!(hal.call_count("close_device"), 0);
    }

    #[tokio::test]
    async fn close_submits_and_closed_event_arrives() {
        let hal = front_hal();
        let mut conn = DeviceConnection::open(Arc::clone(&hal), &DeviceId::new("front:0")).unwrap();
        conn.next_event().await;

        conn.close().unwrap();
        assert_eq!(hal.call_count("close_device"), 1);
        assert_eq!(
            conn.next_event().await,
            Some(DeviceEvent::Closed { device: DeviceHandle(0) })
        );
        assert!(conn.is_terminal());
    }

    #[test]
    fn open_unknown_device_fails_synchronously() {
        let hal = Arc::new(MockHal::new());
        let result = DeviceConnection::open(hal, &DeviceId::new("missing"));
        assert!(matches!(result, Err(CaptureError::DeviceNotFound(_))));
    }
}
