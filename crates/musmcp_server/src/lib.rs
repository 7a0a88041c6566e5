use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use musmcp_core::{CsoundEngine, Engine, RenderConfig, Renderer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub mod lore;
pub mod protocol;
mod server;
pub mod tools;

pub use protocol::{Request, Response, RpcError};
pub use server::{McpServer, SERVER_NAME};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Csound executable
    pub csound: PathBuf,
    pub timeout: Option<Duration>,
    pub artifact_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub log_level: tracing::Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let render = RenderConfig::default();
        Self {
            csound: PathBuf::from("csound"),
            timeout: render.timeout,
            artifact_dir: render.artifact_dir,
            output_dir: render.output_dir,
            log_level: tracing::Level::INFO,
        }
    }
}

impl ServerConfig {
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            artifact_dir: self.artifact_dir.clone(),
            output_dir: self.output_dir.clone(),
            timeout: self.timeout,
        }
    }
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    // stdout is the protocol channel; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("failed to initialise logging")?;

    tracing::info!(
        csound = %config.csound.display(),
        artifact_dir = %config.artifact_dir.display(),
        timeout_secs = config.timeout.map(|t| t.as_secs_f64()),
        "musmcp starting on stdio"
    );

    let renderer = Renderer::new(CsoundEngine::new(&config.csound), config.render_config());
    let server = Arc::new(McpServer::new(renderer));
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

/// Serve newline-delimited JSON-RPC from `input` until EOF.
///
/// Every request runs on its own task; responses are written in completion
/// order by a single writer. Returns once all in-flight requests are answered.
pub async fn serve<E, R, W>(server: Arc<McpServer<E>>, input: R, output: W) -> anyhow::Result<()>
where
    E: Engine + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_responses(rx, output));

    let mut lines = BufReader::new(input).lines();
    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let server = server.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let Some(response) = server.handle_line(&line).await else {
                return;
            };
            match serde_json::to_string(&response) {
                Ok(frame) => {
                    let _ = tx.send(frame);
                }
                Err(e) => tracing::error!(error = %e, "failed to encode response"),
            }
        });

        while let Some(done) = in_flight.try_join_next() {
            log_join(done);
        }
    }

    while let Some(done) = in_flight.join_next().await {
        log_join(done);
    }
    drop(tx);

    writer.await.context("response writer panicked")?
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<String>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        output
            .write_all(frame.as_bytes())
            .await
            .context("failed to write response")?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "request task failed");
    }
}
