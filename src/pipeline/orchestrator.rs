//! End-to-end pipeline orchestration.
//!
//! Composes the device, session and repeating-capture stages into one flow:
//! wait for an output target → open the device → create the session →
//! submit the repeating request → forward completed frames to the caller.
//! All hardware events funnel into a single `select!` loop, so no two state
//! transitions for one pipeline instance ever run concurrently.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::CaptureError;
use crate::hal::CameraHal;
use crate::strategy::CameraParams;
use crate::types::{
    CaptureFrameResult, DeviceEvent, FrameMetadata, OutputTarget, Resolution, SessionEvent,
    TargetId,
};

use super::capture::RepeatingStream;
use super::device::DeviceConnection;
use super::session::{build_capture_request, SessionConnection};

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Device,
    Session,
    Capture,
}

/// Why the pipeline stopped. Delivered exactly once, after teardown of every
/// stage that was actually reached has completed.
#[derive(Debug, PartialEq)]
pub enum PipelineTermination {
    /// A clean close: cancellation, or the hardware closed an open stage.
    Closed,
    /// A terminal failure, with the stage it originated from.
    Failed {
        stage: PipelineStage,
        error: CaptureError,
    },
}

/// Caller-facing pipeline output: completed frames in arrival order, then
/// exactly one `Terminated`.
#[derive(Debug, PartialEq)]
pub enum PipelineOutput {
    Frame {
        frame_number: u64,
        timestamp_us: u64,
        metadata: FrameMetadata,
    },
    Terminated(PipelineTermination),
}

/// Commands sent from the caller into the dispatch loop.
#[derive(Debug, Clone, Copy)]
enum PipelineCommand {
    TargetReady { native_size: Resolution },
    Cancel,
}

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    AwaitingTarget,
    DeviceOpening,
    SessionConfiguring,
    Streaming,
    Closed,
    Failed,
}

impl PipelineState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Caller handle for one running pipeline.
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    outputs: mpsc::UnboundedReceiver<PipelineOutput>,
}

impl PipelineHandle {
    /// Signal that an output target is ready at its native dimensions.
    ///
    /// Only the first signal per pipeline lifetime is consumed; later ones
    /// are ignored.
    pub fn target_ready(&self, native_size: Resolution) {
        let command = PipelineCommand::TargetReady { native_size };
        if self.commands.send(command).is_err() {
            tracing::debug!("Target-ready signal after pipeline terminated, ignoring");
        }
    }

    /// Cancel the pipeline.
    ///
    /// Idempotent: a second cancellation, or one racing a natural terminal
    /// event, has no effect and never fails.
    pub fn cancel(&self) {
        if self.commands.send(PipelineCommand::Cancel).is_err() {
            tracing::debug!("Cancellation after pipeline terminated, ignoring");
        }
    }

    /// Next pipeline output, in arrival order.
    ///
    /// Yields `None` after `Terminated` has been consumed.
    pub async fn next_output(&mut self) -> Option<PipelineOutput> {
        self.outputs.recv().await
    }
}

/// One end-to-end capture pipeline instance.
///
/// Owns the single output target, device and session for its lifetime; all
/// stage events are dispatched on one task.
pub struct Pipeline<H: CameraHal> {
    hal: Arc<H>,
    params: CameraParams,
    state: PipelineState,
    target: Option<OutputTarget>,
    device: Option<DeviceConnection<H>>,
    session: Option<SessionConnection<H>>,
    stream: Option<RepeatingStream<H>>,
    outputs: mpsc::UnboundedSender<PipelineOutput>,
}

impl<H: CameraHal + 'static> Pipeline<H> {
    /// Start a pipeline for the selected device.
    ///
    /// Spawns the dispatch task on the current tokio runtime and returns
    /// immediately; nothing touches the hardware until the first
    /// [`PipelineHandle::target_ready`] signal.
    pub fn start(hal: Arc<H>, params: CameraParams) -> PipelineHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let pipeline = Self {
            hal,
            params,
            state: PipelineState::AwaitingTarget,
            target: None,
            device: None,
            session: None,
            stream: None,
            outputs: output_tx,
        };
        tokio::spawn(pipeline.run(command_rx));

        PipelineHandle {
            commands: command_tx,
            outputs: output_rx,
        }
    }

    /// The single ordered, non-overlapping dispatch point: every hardware
    /// callback and caller command is evaluated here, one at a time.
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PipelineCommand>) {
        while !self.state.is_terminal() {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Caller dropped the handle: treat as cancellation.
                    None => self.handle_command(PipelineCommand::Cancel),
                },
                Some(event) = next_device_event(&mut self.device) => {
                    self.handle_device_event(event);
                }
                Some(event) = next_session_event(&mut self.session) => {
                    self.handle_session_event(event);
                }
                Some(result) = next_frame_result(&mut self.stream) => {
                    self.handle_frame_result(result);
                }
            }
        }
    }

    fn handle_command(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::TargetReady { native_size } => self.on_target_ready(native_size),
            PipelineCommand::Cancel => self.on_cancel(),
        }
    }

    fn on_target_ready(&mut self, native_size: Resolution) {
        if self.state != PipelineState::AwaitingTarget {
            tracing::debug!("Ignoring target-ready signal in state {:?}", self.state);
            return;
        }

        let target = OutputTarget::bind(TargetId(0), native_size, self.params.preview_size);
        tracing::info!(
            "Target ready at {native_size}, buffer bound to {}",
            self.params.preview_size
        );
        self.target = Some(target);

        match DeviceConnection::open(Arc::clone(&self.hal), &self.params.device_id) {
            Ok(connection) => {
                self.device = Some(connection);
                self.state = PipelineState::DeviceOpening;
            }
            Err(error) => self.fail(PipelineStage::Device, error),
        }
    }

    fn on_cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!("Pipeline cancelled");
        self.teardown();
        self.finish(PipelineTermination::Closed);
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened { device } => {
                if self.state != PipelineState::DeviceOpening {
                    tracing::warn!("Dropping Opened event in state {:?}", self.state);
                    return;
                }
                let Some(target) = self.target.clone() else {
                    tracing::warn!("Opened event without a bound target, dropping");
                    return;
                };
                match SessionConnection::create(Arc::clone(&self.hal), device, &[target]) {
                    Ok(connection) => {
                        self.session = Some(connection);
                        self.state = PipelineState::SessionConfiguring;
                    }
                    Err(error) => self.fail(PipelineStage::Session, error),
                }
            }
            DeviceEvent::Closed { .. } => {
                tracing::info!("Device closed");
                self.invalidate_device_dependents();
                self.teardown();
                self.finish(PipelineTermination::Closed);
            }
            DeviceEvent::Disconnected { .. } => {
                self.invalidate_device_dependents();
                self.fail(PipelineStage::Device, CaptureError::DeviceDisconnected);
            }
            DeviceEvent::Error { code } => {
                self.invalidate_device_dependents();
                self.fail(PipelineStage::Device, CaptureError::DeviceError(code));
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Configured { .. } => {
                if self.state != PipelineState::SessionConfiguring {
                    tracing::warn!("Dropping Configured event in state {:?}", self.state);
                    return;
                }
                let Some(target) = self.target.clone() else {
                    tracing::warn!("Configured event without a bound target, dropping");
                    return;
                };
                let request = build_capture_request(&self.params.capabilities, &[target]);
                let started = match self.session.as_ref() {
                    Some(session) => {
                        RepeatingStream::start(Arc::clone(&self.hal), session, &request)
                    }
                    None => Err(CaptureError::StaleHandle("session")),
                };
                match started {
                    Ok(stream) => {
                        self.stream = Some(stream);
                        self.state = PipelineState::Streaming;
                    }
                    Err(error) => self.fail(PipelineStage::Capture, error),
                }
            }
            SessionEvent::ConfigureFailed => {
                self.fail(
                    PipelineStage::Session,
                    CaptureError::SessionConfigurationFailed,
                );
            }
            SessionEvent::Closed { .. } => {
                tracing::info!("Session closed");
                self.teardown();
                self.finish(PipelineTermination::Closed);
            }
            SessionEvent::Ready { .. } | SessionEvent::Active { .. } => {
                // Session-state bookkeeping happens in the connection.
                tracing::debug!("Session event: {event:?}");
            }
            SessionEvent::SurfacePrepared { target, .. } => {
                tracing::debug!("Surface prepared for target {target:?}");
            }
        }
    }

    fn handle_frame_result(&mut self, result: CaptureFrameResult) {
        match result {
            CaptureFrameResult::Completed {
                frame_number,
                timestamp_us,
                metadata,
            } => {
                if self.state != PipelineState::Streaming {
                    tracing::warn!("Dropping frame {frame_number} in state {:?}", self.state);
                    return;
                }
                let _ = self.outputs.send(PipelineOutput::Frame {
                    frame_number,
                    timestamp_us,
                    metadata,
                });
            }
            CaptureFrameResult::Failed { reason } => {
                self.fail(PipelineStage::Capture, CaptureError::CaptureFailed(reason));
            }
        }
    }

    /// Mark the session and stream invalid after a device-terminal event.
    ///
    /// A session cannot outlive its device; no close may be issued against a
    /// device handle that no longer exists.
    fn invalidate_device_dependents(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.invalidate();
        }
        if let Some(session) = self.session.as_mut() {
            session.invalidate();
        }
    }

    /// Centralized teardown, keyed on the stages actually reached: stop the
    /// repeating request, close the session, close the device — highest
    /// stage first, each at most once, skipping stages that already observed
    /// a terminal event. Closing a stage that never opened is a no-op.
    fn teardown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(error) = stream.stop() {
                tracing::warn!("Failed to stop repeating request: {error}");
            }
        }
        if let Some(mut session) = self.session.take() {
            if !session.is_terminal() {
                if let Err(error) = session.close() {
                    tracing::warn!("Failed to close session: {error}");
                }
            }
        }
        if let Some(mut device) = self.device.take() {
            if !device.is_terminal() {
                if let Err(error) = device.close() {
                    tracing::warn!("Failed to close device: {error}");
                }
            }
        }
    }

    fn fail(&mut self, stage: PipelineStage, error: CaptureError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!("Pipeline failed at {stage:?} stage: {error}");
        self.teardown();
        self.finish(PipelineTermination::Failed { stage, error });
    }

    /// Enter a terminal state and deliver the single terminal notification.
    /// Teardown has already completed by the time this is sent.
    fn finish(&mut self, termination: PipelineTermination) {
        self.state = match termination {
            PipelineTermination::Closed => PipelineState::Closed,
            PipelineTermination::Failed { .. } => PipelineState::Failed,
        };
        let _ = self.outputs.send(PipelineOutput::Terminated(termination));
    }
}

async fn next_device_event<H: CameraHal>(
    device: &mut Option<DeviceConnection<H>>,
) -> Option<DeviceEvent> {
    match device {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_session_event<H: CameraHal>(
    session: &mut Option<SessionConnection<H>>,
) -> Option<SessionEvent> {
    match session {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_frame_result<H: CameraHal>(
    stream: &mut Option<RepeatingStream<H>>,
) -> Option<CaptureFrameResult> {
    match stream {
        Some(stream) => stream.next_result().await,
        None => std::future::pending().await,
    }
}
