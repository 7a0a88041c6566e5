//! The external rendering engine.
//!
//! [`Engine`] is the seam between the render pipeline and the host: the real
//! implementation launches `csound`, tests swap in fakes. Every run is a fresh
//! process with no state carried between calls.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::ResourceError;

/// One engine run: render `document` into `output`.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub document: &'a Path,
    pub output: &'a Path,
    /// Scratch directory owned by the job; used as the working directory.
    pub working_dir: &'a Path,
    pub timeout: Option<Duration>,
}

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own. `None` when killed by a signal.
    Exited(Option<i32>),
    /// Killed after running past the timeout.
    TimedOut(Duration),
}

/// Everything the engine said, plus how it ended.
///
/// Stream bytes are decoded lossily: invalid UTF-8 becomes U+FFFD, everything
/// else is kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRun {
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
}

pub trait Engine: Send + Sync {
    /// Run to completion (or timeout). Errors only when the process could not
    /// be launched or waited on; an engine that fails still yields an
    /// [`EngineRun`].
    fn run(
        &self,
        invocation: &Invocation<'_>,
    ) -> impl Future<Output = Result<EngineRun, ResourceError>> + Send;
}

/// Runs the Csound command-line renderer.
///
/// The command line is `<program> [extra_args] -d -W -o <output> <document>`:
/// displays off, WAV output, explicit output path.
#[derive(Debug, Clone)]
pub struct CsoundEngine {
    program: PathBuf,
    extra_args: Vec<OsString>,
}

impl Default for CsoundEngine {
    fn default() -> Self {
        Self::new("csound")
    }
}

impl CsoundEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the standard ones, e.g. a script path when the
    /// program is an interpreter.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Engine for CsoundEngine {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<EngineRun, ResourceError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args)
            .arg("-d")
            .arg("-W")
            .arg("-o")
            .arg(invocation.output)
            .arg(invocation.document)
            .current_dir(invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also takes down anything it forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ResourceError::Spawn {
            program: self.program_name(),
            source,
        })?;
        tracing::debug!(program = %self.program.display(), pid = ?child.id(), "engine started");

        // Drain both pipes concurrently; partial output must survive a timeout.
        let stdout = Capture::spawn(child.stdout.take());
        let stderr = Capture::spawn(child.stderr.take());

        let wait_error = |source| ResourceError::Wait {
            program: self.program_name(),
            source,
        };
        let termination = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Termination::Exited(status.map_err(wait_error)?.code()),
                Err(_) => {
                    tracing::warn!(
                        program = %self.program.display(),
                        timeout_secs = limit.as_secs_f64(),
                        "engine timed out, killing it"
                    );
                    kill_process_group(&mut child).await;
                    Termination::TimedOut(limit)
                }
            },
            None => Termination::Exited(child.wait().await.map_err(wait_error)?.code()),
        };

        // A killed engine may have handed its pipes to something outside the
        // group; don't wait on those forever.
        let grace = match termination {
            Termination::TimedOut(_) => Some(DRAIN_GRACE),
            Termination::Exited(_) => None,
        };
        Ok(EngineRun {
            stdout: stdout.finish(grace).await,
            stderr: stderr.finish(grace).await,
            termination,
        })
    }
}

/// How long pipes may stay open after a timed-out engine is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let group = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(group, Signal::SIGKILL) {
                tracing::debug!(pid, error = %e, "failed to signal engine process group");
            }
        }
    }
    let _ = child.kill().await;
}

/// Drains one pipe on its own task into a shared buffer, so whatever arrived
/// is still there if the drain is cut short.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let task = tokio::spawn(async move {
            let Some(mut stream) = stream else {
                return;
            };
            let mut chunk = [0u8; 8192];
            // A read error just ends the capture.
            while let Ok(n @ 1..) = stream.read(&mut chunk).await {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]);
            }
        });
        Self { buf, task }
    }

    async fn finish(mut self, grace: Option<Duration>) -> String {
        match grace {
            Some(grace) => {
                if tokio::time::timeout(grace, &mut self.task).await.is_err() {
                    self.task.abort();
                }
            }
            None => {
                let _ = (&mut self.task).await;
            }
        }
        let bytes = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
