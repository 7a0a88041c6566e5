//! Tool catalogue and dispatch.

use musmcp_core::{Artifact, Engine, KickRequest, RenderError, Renderer, SynthesisRequest, ToneRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{RpcError, ToolDescriptor, ToolResult};

pub const RENDER_CSD: &str = "render_csd";
pub const SYNTHESIZE_TONE: &str = "synthesize_tone";
pub const SYNTHESIZE_SAWTOOTH: &str = "synthesize_sawtooth_lead_bass";
pub const SYNTHESIZE_KICK: &str = "synthesize_kick_drum";

/// Arguments for rendering a caller-written document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderCsdArgs {
    /// The complete Csound orchestra and score, passed to the engine verbatim.
    pub csd_content: String,
    /// Optional name for the output file; `.wav` is appended if missing.
    #[serde(default)]
    pub output_filename: Option<String>,
}

/// A decoded `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    RenderCsd(RenderCsdArgs),
    Tone(ToneRequest),
    Sawtooth(SynthesisRequest),
    Kick(KickRequest),
}

impl ToolCall {
    pub fn parse(name: &str, arguments: Option<Value>) -> Result<Self, RpcError> {
        let arguments = arguments.unwrap_or_else(|| Value::Object(Default::default()));
        let call = match name {
            RENDER_CSD => ToolCall::RenderCsd(decode(name, arguments)?),
            SYNTHESIZE_TONE => ToolCall::Tone(decode(name, arguments)?),
            SYNTHESIZE_SAWTOOTH => ToolCall::Sawtooth(decode(name, arguments)?),
            SYNTHESIZE_KICK => ToolCall::Kick(decode(name, arguments)?),
            other => return Err(RpcError::invalid_params(format!("unknown tool `{other}`"))),
        };
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::RenderCsd(_) => RENDER_CSD,
            ToolCall::Tone(_) => SYNTHESIZE_TONE,
            ToolCall::Sawtooth(_) => SYNTHESIZE_SAWTOOTH,
            ToolCall::Kick(_) => SYNTHESIZE_KICK,
        }
    }

    /// Run the call. Render failures become error results, not RPC errors.
    pub async fn execute<E: Engine>(self, renderer: &Renderer<E>) -> ToolResult {
        let name = self.name();
        let result = match &self {
            ToolCall::RenderCsd(args) => {
                renderer
                    .render_csd(&args.csd_content, args.output_filename.as_deref())
                    .await
            }
            ToolCall::Tone(request) => renderer.synthesize_tone(request).await,
            ToolCall::Sawtooth(request) => renderer.synthesize_sawtooth(request).await,
            ToolCall::Kick(request) => renderer.synthesize_kick(request).await,
        };
        match result {
            Ok(artifact) => ToolResult::text(success_text(&artifact)),
            Err(err) => {
                log_failure(name, &err);
                ToolResult::error(err.to_string())
            }
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, RpcError> {
    serde_json::from_value(arguments)
        .map_err(|e| RpcError::invalid_params(format!("{tool}: {e}")))
}

/// First line is the absolute path; the rest describes the file.
fn success_text(artifact: &Artifact) -> String {
    format!("{}\n{}", artifact.path.display(), artifact.describe())
}

fn log_failure(tool: &str, err: &RenderError) {
    match err {
        RenderError::Validation(e) => tracing::debug!(tool, error = %e, "tool rejected input"),
        RenderError::EngineExecution(e) => {
            tracing::info!(tool, reason = %e.reason(), "tool render failed")
        }
        RenderError::Resource(e) => tracing::error!(tool, error = %e, "tool could not render"),
    }
}

fn schema<T: JsonSchema>() -> Value {
    schemars::schema_for!(T).to_value()
}

/// Everything `tools/list` advertises.
pub fn list() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: RENDER_CSD.to_string(),
            description: "Render a complete Csound (.csd) document to a WAV file. \
                Returns the absolute path of the file, or the engine's full \
                STDOUT and STDERR if rendering fails."
                .to_string(),
            input_schema: schema::<RenderCsdArgs>(),
        },
        ToolDescriptor {
            name: SYNTHESIZE_TONE.to_string(),
            description: "Generate a plain monophonic sine tone at the given pitch \
                and duration. Returns the absolute path of the WAV file."
                .to_string(),
            input_schema: schema::<ToneRequest>(),
        },
        ToolDescriptor {
            name: SYNTHESIZE_SAWTOOTH.to_string(),
            description: "Generate a note with a sawtooth oscillator, an ADSR amplitude \
                envelope and a Moog-style low-pass filter. Good for classic basses, \
                leads, plucks and pads. Envelope controls are integers 0-255; see \
                lore://sound_design for starting points."
                .to_string(),
            input_schema: schema::<SynthesisRequest>(),
        },
        ToolDescriptor {
            name: SYNTHESIZE_KICK.to_string(),
            description: "Generate an analog-style kick drum: a sine with a falling \
                pitch sweep and tanh saturation. Controls are integers 0-255; see \
                lore://drum_design for presets."
                .to_string(),
            input_schema: schema::<KickRequest>(),
        },
    ]
}
