use musmcp_core::{Engine, Renderer};
use serde::Serialize;
use serde_json::{Value, json};

use crate::lore;
use crate::protocol::{
    CallToolParams, InitializeResult, PROTOCOL_VERSION, ReadResourceParams, Request, Response,
    RpcError, ServerInfo, parse_params,
};
use crate::tools::{self, ToolCall};

pub const SERVER_NAME: &str = "musmcp";

const INSTRUCTIONS: &str = "Synthesize audio with Csound. Use synthesize_sawtooth_lead_bass \
for basses, leads, plucks and pads, synthesize_kick_drum for kicks, synthesize_tone for a \
plain sine, and render_csd for hand-written Csound documents. Every tool returns the \
absolute path of a WAV file. Read lore://sound_design and lore://drum_design for \
parameter starting points.";

/// Request handler. Stateless apart from the renderer, so one instance
/// serves every in-flight request.
pub struct McpServer<E> {
    renderer: Renderer<E>,
}

impl<E: Engine> McpServer<E> {
    pub fn new(renderer: Renderer<E>) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &Renderer<E> {
        &self.renderer
    }

    /// Handle one line of input. `None` means nothing goes back on the wire.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable message");
                return Some(Response::failure(Value::Null, RpcError::parse_error(e)));
            }
        };

        let id = value.get("id").cloned().filter(|id| !id.is_null());
        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                return Some(Response::failure(
                    id.unwrap_or(Value::Null),
                    RpcError::invalid_request(e),
                ));
            }
        };
        self.handle(request).await
    }

    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Request {
            id, method, params, ..
        } = request;
        tracing::debug!(%method, id = ?id, "request");

        let result = self.dispatch(&method, params).await;
        let Some(id) = id else {
            if let Err(e) = result {
                tracing::debug!(%method, error = %e, "notification failed");
            }
            return None;
        };
        Some(match result {
            Ok(value) => Response::success(id, value),
            Err(e) => {
                tracing::debug!(%method, error = %e, "request failed");
                Response::failure(id, e)
            }
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => to_value(InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: json!({ "tools": {}, "resources": {} }),
                server_info: ServerInfo {
                    name: SERVER_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                instructions: INSTRUCTIONS.to_string(),
            }),
            "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::list() })),
            "tools/call" => {
                let CallToolParams { name, arguments } = parse_params(params)?;
                let call = ToolCall::parse(&name, arguments)?;
                to_value(call.execute(&self.renderer).await)
            }
            "resources/list" => Ok(json!({ "resources": lore::list() })),
            "resources/read" => {
                let ReadResourceParams { uri } = parse_params(params)?;
                let contents = lore::read(&uri).ok_or_else(|| {
                    RpcError::invalid_params(format!("unknown resource `{uri}`"))
                })?;
                Ok(json!({ "contents": [contents] }))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::internal)
}
