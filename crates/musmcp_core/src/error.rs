use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A request field that was rejected before any rendering work started.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The local environment could not support a render: scratch space, output
/// location or the engine process itself. No engine diagnostics exist.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to create scratch directory: {0}")]
    ScratchDir(#[source] std::io::Error),

    #[error("failed to write document to {}: {source}", .path.display())]
    WriteDocument {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to prepare artifact directory {}: {source}", .path.display())]
    ArtifactDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove existing output {}: {source}", .path.display())]
    ClearOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to resolve output path {}: {source}", .path.display())]
    OutputPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("failed while waiting on `{program}`: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// Why an engine run did not count as a success.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// Non-zero exit code, or killed by a signal.
    Exit,
    /// Exit code 0 but the artifact never appeared.
    MissingArtifact { expected: PathBuf },
    /// Killed after exceeding the configured wall-clock limit.
    TimedOut { after: Duration },
}

/// The engine ran but the render failed.
///
/// Stream text is kept verbatim apart from invalid UTF-8, which is replaced
/// with U+FFFD.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct EngineExecutionError {
    pub kind: FailureKind,
    pub exit_code: Option<i32>,
    pub stdout_text: String,
    pub stderr_text: String,
}

impl EngineExecutionError {
    /// One-line summary of the failure, without the captured streams.
    pub fn reason(&self) -> String {
        match (&self.kind, self.exit_code) {
            (FailureKind::TimedOut { after }, _) => {
                format!("engine timed out after {:.1}s", after.as_secs_f64())
            }
            (FailureKind::MissingArtifact { expected }, _) => format!(
                "engine reported success but produced no file at {}",
                expected.display()
            ),
            (FailureKind::Exit, Some(code)) => format!("engine exited with code {code}"),
            (FailureKind::Exit, None) => "engine terminated without an exit code".to_string(),
        }
    }
}

impl std::fmt::Display for EngineExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Error rendering CSD ({}):\nSTDOUT:\n{}\nSTDERR:\n{}",
            self.reason(),
            self.stdout_text,
            self.stderr_text
        )
    }
}

/// Everything a render request can fail with, as seen by the protocol layer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    EngineExecution(#[from] EngineExecutionError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_field() {
        let err = ValidationError::new("pitch", "must be greater than 0");
        assert_eq!(err.to_string(), "pitch: must be greater than 0");

        let wrapped = RenderError::from(err);
        assert_eq!(wrapped.to_string(), "invalid request: pitch: must be greater than 0");
    }

    #[test]
    fn engine_error_carries_streams_verbatim() {
        let err = EngineExecutionError {
            kind: FailureKind::Exit,
            exit_code: Some(1),
            stdout_text: "line one\nline two".to_string(),
            stderr_text: "error: syntax error, unexpected T_IDENT".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Error rendering CSD (engine exited with code 1):"));
        assert!(text.contains("STDOUT:\nline one\nline two\n"));
        assert!(text.ends_with("STDERR:\nerror: syntax error, unexpected T_IDENT"));
    }

    #[test]
    fn failure_reasons() {
        let mut err = EngineExecutionError {
            kind: FailureKind::TimedOut {
                after: Duration::from_millis(2500),
            },
            exit_code: None,
            stdout_text: String::new(),
            stderr_text: String::new(),
        };
        assert_eq!(err.reason(), "engine timed out after 2.5s");

        err.kind = FailureKind::Exit;
        assert_eq!(err.reason(), "engine terminated without an exit code");

        err.kind = FailureKind::MissingArtifact {
            expected: PathBuf::from("/tmp/out.wav"),
        };
        err.exit_code = Some(0);
        assert!(err.reason().contains("/tmp/out.wav"));
    }
}
