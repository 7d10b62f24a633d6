//! Asynchronous camera capture pipeline.
//!
//! Orchestrates the three nested lifecycles a live camera preview needs —
//! open a device, configure a capture session over it, run a repeating
//! capture request on the session — over an asynchronous, callback-driven
//! hardware layer. Callbacks arriving on arbitrary hardware threads are
//! marshalled into ordered event sequences and dispatched on a single task,
//! so state transitions never race.
//!
//! Typical flow:
//!
//! ```no_run
//! use std::sync::Arc;
//! use capture_pipeline::hal::mock::MockHal;
//! use capture_pipeline::pipeline::{Pipeline, PipelineOutput};
//! use capture_pipeline::strategy::CameraParams;
//! use capture_pipeline::types::Resolution;
//!
//! # async fn demo() -> capture_pipeline::error::Result<()> {
//! let hal = Arc::new(MockHal::new());
//! let params = CameraParams::select(hal.as_ref())?;
//! let mut handle = Pipeline::start(Arc::clone(&hal), params);
//!
//! handle.target_ready(Resolution::new(1280, 720));
//! while let Some(output) = handle.next_output().await {
//!     match output {
//!         PipelineOutput::Frame { frame_number, .. } => {
//!             tracing::debug!("frame {frame_number}");
//!         }
//!         PipelineOutput::Terminated(termination) => {
//!             tracing::info!("pipeline over: {termination:?}");
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hal;
pub mod pipeline;
pub mod strategy;
pub mod types;

pub use error::{CaptureError, Result};
pub use hal::CameraHal;
pub use pipeline::{Pipeline, PipelineHandle, PipelineOutput, PipelineStage, PipelineTermination};
pub use strategy::CameraParams;
