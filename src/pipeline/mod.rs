//! The capture pipeline: device open, session configuration and repeating
//! capture, composed into a single orchestrated flow.
//!
//! Each stage wraps the hardware layer's callback interface into an ordered
//! async event sequence; [`orchestrator`] chains them and owns teardown.

pub mod capture;
pub mod device;
pub mod orchestrator;
pub mod session;

pub use capture::RepeatingStream;
pub use device::DeviceConnection;
pub use orchestrator::{
    Pipeline, PipelineHandle, PipelineOutput, PipelineStage, PipelineTermination,
};
pub use session::{build_capture_request, SessionConnection, SessionState};
