//! musmcp: Csound synthesis tools for agents, over MCP on stdio.
//!
//! Every flag can also be set through the environment variable named in its
//! help text. stdout carries protocol frames only; logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use musmcp_server::{ServerConfig, run_server};

#[derive(Parser)]
#[command(name = "musmcp")]
#[command(about = "MCP server that renders synthesis parameters to WAV files with Csound")]
#[command(version)]
struct Cli {
    /// Csound executable used for rendering
    #[arg(long, env = "MUSMCP_CSOUND", default_value = "csound")]
    csound: PathBuf,

    /// Kill a render that runs longer than this many seconds (default: no limit)
    #[arg(long, env = "MUSMCP_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Directory for renders requested without a file name
    #[arg(long, env = "MUSMCP_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// Base directory for relative output file names (default: working directory)
    #[arg(long, env = "MUSMCP_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Log level written to stderr
    #[arg(long, env = "MUSMCP_LOG", default_value = "info")]
    log_level: tracing::Level,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            csound: self.csound,
            timeout: self.timeout_secs.map(Duration::from_secs),
            artifact_dir: self.artifact_dir.unwrap_or(defaults.artifact_dir),
            output_dir: self.output_dir.or(defaults.output_dir),
            log_level: self.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_server(Cli::parse().into_config()).await
}
