//! Classification of engine runs.
//!
//! Exit code 0 with the artifact on disk is a success. Everything else is a
//! failure carrying the engine's streams verbatim, including the case where
//! the engine claims success but wrote nothing.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::{EngineRun, Termination};
use crate::error::{EngineExecutionError, FailureKind};

/// Header facts about a rendered WAV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel.
    pub frames: u32,
    pub duration_secs: f64,
}

impl WavInfo {
    /// Read the header; `None` if the file isn't a WAV `hound` understands.
    pub fn read(path: &Path) -> Option<Self> {
        let reader = hound::WavReader::open(path).ok()?;
        let spec = reader.spec();
        let frames = reader.duration();
        Some(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            frames,
            duration_secs: f64::from(frames) / f64::from(spec.sample_rate.max(1)),
        })
    }
}

impl fmt::Display for WavInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{n}-channel"),
        };
        write!(
            f,
            "{:.2}s of {layout} audio at {} Hz ({} frames)",
            self.duration_secs, self.sample_rate, self.frames
        )
    }
}

/// A successfully rendered file.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub info: Option<WavInfo>,
}

impl Artifact {
    pub fn inspect(path: PathBuf) -> Self {
        let info = WavInfo::read(&path);
        Self { path, info }
    }

    /// Short human-readable summary for the caller.
    pub fn describe(&self) -> String {
        match &self.info {
            Some(info) => format!("Rendered {info}."),
            None => "Rendered audio file (WAV header not readable).".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Success(Artifact),
    Failure(EngineExecutionError),
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<Artifact, EngineExecutionError> {
        match self {
            RenderOutcome::Success(artifact) => Ok(artifact),
            RenderOutcome::Failure(err) => Err(err),
        }
    }
}

/// Decide what a finished engine run produced.
pub fn classify(run: EngineRun, expected: &Path) -> RenderOutcome {
    let EngineRun {
        stdout,
        stderr,
        termination,
    } = run;

    let (kind, exit_code) = match termination {
        Termination::Exited(Some(0)) if expected.is_file() => {
            return RenderOutcome::Success(Artifact::inspect(expected.to_path_buf()));
        }
        Termination::Exited(Some(0)) => (
            FailureKind::MissingArtifact {
                expected: expected.to_path_buf(),
            },
            Some(0),
        ),
        Termination::Exited(code) => (FailureKind::Exit, code),
        Termination::TimedOut(after) => (FailureKind::TimedOut { after }, None),
    };

    RenderOutcome::Failure(EngineExecutionError {
        kind,
        exit_code,
        stdout_text: stdout,
        stderr_text: stderr,
    })
}
