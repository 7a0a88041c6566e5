//! Parameter-to-audio synthesis on top of the Csound renderer.
//!
//! The pipeline is strictly one-way:
//!
//! - [`params`] validates agent-facing 0-255 controls and maps them to
//!   physical units
//! - [`document`] turns those units into one orchestra + score document
//! - [`render`] runs the document through an [`Engine`] in a scoped scratch
//!   directory
//! - [`outcome`] classifies the finished run as an artifact or a failure

pub mod document;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod params;
pub mod render;

pub use document::InstrumentDocument;
pub use engine::{CsoundEngine, Engine, EngineRun, Invocation, Termination};
pub use error::{EngineExecutionError, FailureKind, RenderError, ResourceError, ValidationError};
pub use outcome::{Artifact, RenderOutcome, WavInfo};
pub use params::{KickRequest, SynthesisRequest, ToneRequest};
pub use render::{RenderConfig, Renderer};
