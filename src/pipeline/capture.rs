//! Repeating capture stage.
//!
//! Submits one capture request as a repeating request against a configured
//! session and yields each iteration's outcome until the stream is stopped,
//! fails, or the session closes.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{CaptureError, Result};
use crate::hal::CameraHal;
use crate::types::{CaptureFrameResult, CaptureRequestSpec, SessionHandle};

use super::session::SessionConnection;

/// One repeating capture request and its per-frame result sequence.
///
/// A `Failed` result is terminal: the session rejects further delivery after
/// a capture failure.
pub struct RepeatingStream<H: CameraHal> {
    hal: Arc<H>,
    session: SessionHandle,
    results: mpsc::UnboundedReceiver<CaptureFrameResult>,
    terminal: bool,
    stopped: bool,
}

impl<H: CameraHal> RepeatingStream<H> {
    /// Submit the repeating request against a configured session.
    ///
    /// # Errors
    ///
    /// `CaptureError::StaleHandle` unless the session is in the configured,
    /// ready or active state.
    pub fn start(
        hal: Arc<H>,
        session: &SessionConnection<H>,
        request: &CaptureRequestSpec,
    ) -> Result<Self> {
        if !session.state().accepts_repeating() {
            return Err(CaptureError::StaleHandle("session"));
        }
        let handle = session
            .handle()
            .ok_or(CaptureError::StaleHandle("session"))?;

        let (tx, results) = mpsc::unbounded_channel();
        hal.set_repeating_request(
            handle,
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        )?;
        tracing::info!("Repeating request started on session {handle:?}");
        Ok(Self {
            hal,
            session: handle,
            results,
            terminal: false,
            stopped: false,
        })
    }

    /// Next frame result, in arrival order.
    ///
    /// Returns `None` once the stream has terminated.
    pub async fn next_result(&mut self) -> Option<CaptureFrameResult> {
        if self.terminal {
            return None;
        }
        let result = self.results.recv().await?;
        if matches!(result, CaptureFrameResult::Failed { .. }) {
            self.terminal = true;
        }
        Some(result)
    }

    /// Whether a terminal `Failed` result has been observed.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Mark the stream stopped without touching the hardware.
    ///
    /// Used when the owning device reported a terminal event.
    pub fn invalidate(&mut self) {
        self.stopped = true;
    }

    /// Stop the repeating request.
    ///
    /// Idempotent: a second stop, or a stop after the stream terminated, is
    /// a no-op. Never fails when the underlying session is already closed —
    /// that guarantee is part of the `CameraHal` contract.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped || self.terminal {
            return Ok(());
        }
        self.stopped = true;
        self.hal.stop_repeating(self.session)
    }
}
