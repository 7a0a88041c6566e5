//! The render executor.
//!
//! A [`RenderJob`] owns one scratch directory for exactly one engine run. The
//! directory is a [`TempDir`], so it is removed whenever the job is dropped:
//! on success, on engine failure, and on any early return in between.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use uuid::Uuid;

use crate::document::{InstrumentDocument, build_kick, build_voice};
use crate::engine::{Engine, Invocation};
use crate::error::{RenderError, ResourceError};
use crate::outcome::{Artifact, RenderOutcome, classify};
use crate::params::{KickRequest, SynthesisRequest, ToneRequest, map_kick, map_synthesis, map_tone};

/// File name of the document inside a job's scratch directory.
pub const DOCUMENT_FILE_NAME: &str = "render.csd";

/// Where renders land and how long they may take.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Home for renders the caller did not name.
    pub artifact_dir: PathBuf,
    /// Base for relative caller file names. `None` means the working directory.
    pub output_dir: Option<PathBuf>,
    /// Wall-clock limit for one engine run. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir().join("musmcp"),
            output_dir: None,
            timeout: None,
        }
    }
}

/// Where the engine should write, and whether we picked the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub generated: bool,
}

/// One document, one scratch directory, one expected output.
pub struct RenderJob {
    scratch: TempDir,
    document_path: PathBuf,
    output_path: PathBuf,
}

impl RenderJob {
    /// Create the scratch directory and write the document into it.
    pub async fn prepare(
        document: &InstrumentDocument,
        output_path: PathBuf,
    ) -> Result<Self, ResourceError> {
        let scratch = tempfile::Builder::new()
            .prefix("musmcp-")
            .tempdir()
            .map_err(ResourceError::ScratchDir)?;
        let document_path = scratch.path().join(DOCUMENT_FILE_NAME);
        tokio::fs::write(&document_path, document.as_str())
            .await
            .map_err(|source| ResourceError::WriteDocument {
                path: document_path.clone(),
                source,
            })?;

        Ok(Self {
            scratch,
            document_path,
            output_path,
        })
    }

    pub fn invocation(&self, timeout: Option<Duration>) -> Invocation<'_> {
        Invocation {
            document: &self.document_path,
            output: &self.output_path,
            working_dir: self.scratch.path(),
            timeout,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Drives documents through an [`Engine`]. Holds no per-request state, so one
/// instance can serve any number of concurrent renders.
#[derive(Debug)]
pub struct Renderer<E> {
    engine: E,
    config: RenderConfig,
}

impl<E: Engine> Renderer<E> {
    pub fn new(engine: E, config: RenderConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Render a document. Engine failures come back as
    /// [`RenderOutcome::Failure`]; only local resource problems are errors.
    pub async fn render(
        &self,
        document: &InstrumentDocument,
        output_filename: Option<&str>,
    ) -> Result<RenderOutcome, ResourceError> {
        let target = self.resolve_output(output_filename).await?;
        // Whatever is at the output path now must not pass for this render's result.
        clear_output(&target.path).await?;
        let job = RenderJob::prepare(document, target.path.clone()).await?;
        tracing::info!(
            output = %target.path.display(),
            scratch = %job.scratch_dir().display(),
            document_bytes = document.as_str().len(),
            "render started"
        );

        let started = Instant::now();
        let run = self.engine.run(&job.invocation(self.config.timeout)).await?;
        let outcome = classify(run, job.output_path());

        match &outcome {
            RenderOutcome::Success(artifact) => tracing::info!(
                output = %artifact.path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "render succeeded"
            ),
            RenderOutcome::Failure(err) => {
                tracing::warn!(
                    reason = %err.reason(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "render failed"
                );
                // Don't leave half-written files under names nobody asked for.
                if target.generated {
                    let _ = tokio::fs::remove_file(&target.path).await;
                }
            }
        }
        Ok(outcome)
    }

    /// Render and flatten the outcome into a single `Result`.
    pub async fn render_to_artifact(
        &self,
        document: &InstrumentDocument,
        output_filename: Option<&str>,
    ) -> Result<Artifact, RenderError> {
        Ok(self.render(document, output_filename).await?.into_result()?)
    }

    /// Raw pass-through: the text goes to the engine untouched.
    pub async fn render_csd(
        &self,
        csd_content: &str,
        output_filename: Option<&str>,
    ) -> Result<Artifact, RenderError> {
        let document = InstrumentDocument::from_raw(csd_content);
        self.render_to_artifact(&document, output_filename).await
    }

    pub async fn synthesize_sawtooth(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Artifact, RenderError> {
        let voice = map_synthesis(request).inspect_err(|err| {
            tracing::debug!(%err, "rejected sawtooth request");
        })?;
        if voice.envelope.compressed {
            tracing::debug!(
                release = voice.envelope.release,
                duration = voice.duration,
                "envelope compressed to fit the note"
            );
        }
        let document = build_voice(&voice);
        self.render_to_artifact(&document, request.output_filename.as_deref())
            .await
    }

    pub async fn synthesize_tone(&self, request: &ToneRequest) -> Result<Artifact, RenderError> {
        let voice = map_tone(request).inspect_err(|err| {
            tracing::debug!(%err, "rejected tone request");
        })?;
        let document = build_voice(&voice);
        self.render_to_artifact(&document, request.output_filename.as_deref())
            .await
    }

    pub async fn synthesize_kick(&self, request: &KickRequest) -> Result<Artifact, RenderError> {
        let kick = map_kick(request).inspect_err(|err| {
            tracing::debug!(%err, "rejected kick request");
        })?;
        let document = build_kick(&kick);
        self.render_to_artifact(&document, request.output_filename.as_deref())
            .await
    }

    /// Work out where the artifact goes.
    ///
    /// Caller names get `.wav` appended when missing and are resolved against
    /// the output directory. Without a name, a fresh `render-<uuid>.wav` goes
    /// in the artifact directory, which is created on demand.
    pub async fn resolve_output(
        &self,
        requested: Option<&str>,
    ) -> Result<OutputTarget, ResourceError> {
        match requested.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => {
                let file = if name.ends_with(".wav") {
                    PathBuf::from(name)
                } else {
                    PathBuf::from(format!("{name}.wav"))
                };
                let joined = match &self.config.output_dir {
                    Some(base) if file.is_relative() => base.join(file),
                    _ => file,
                };
                let path = std::path::absolute(&joined).map_err(|source| {
                    ResourceError::OutputPath {
                        path: joined.clone(),
                        source,
                    }
                })?;
                Ok(OutputTarget {
                    path,
                    generated: false,
                })
            }
            None => {
                let dir = &self.config.artifact_dir;
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| ResourceError::ArtifactDir {
                        path: dir.clone(),
                        source,
                    })?;
                let file = format!("render-{}.wav", Uuid::new_v4());
                let path = std::path::absolute(dir.join(file)).map_err(|source| {
                    ResourceError::OutputPath {
                        path: dir.clone(),
                        source,
                    }
                })?;
                Ok(OutputTarget {
                    path,
                    generated: true,
                })
            }
        }
    }
}

async fn clear_output(path: &Path) -> Result<(), ResourceError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(output = %path.display(), "removed existing output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ResourceError::ClearOutput {
            path: path.to_path_buf(),
            source,
        }),
    }
}
