//! Protocol tests driving [`serve`] over an in-memory pipe.
//!
//! Renders go through an in-process engine that writes a real WAV, so the
//! full request path runs without csound installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use musmcp_core::{CsoundEngine, Engine, EngineRun, Invocation, RenderConfig, Renderer, ResourceError, Termination};
use musmcp_server::protocol::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION};
use musmcp_server::{McpServer, serve};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Writes a short silent WAV for every invocation and counts calls.
#[derive(Default)]
struct SilentEngine {
    calls: AtomicUsize,
}

impl Engine for SilentEngine {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<EngineRun, ResourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(invocation.output, spec).unwrap();
        for _ in 0..4_410 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        Ok(EngineRun {
            stdout: String::new(),
            stderr: String::new(),
            termination: Termination::Exited(Some(0)),
        })
    }
}

fn server_with<E: Engine>(engine: E, dir: &Path) -> Arc<McpServer<E>> {
    let config = RenderConfig {
        artifact_dir: dir.join("artifacts"),
        output_dir: Some(dir.to_path_buf()),
        timeout: None,
    };
    Arc::new(McpServer::new(Renderer::new(engine, config)))
}

/// Send `frames` (one per line), close input and collect every response.
async fn exchange<E: Engine + 'static>(server: Arc<McpServer<E>>, frames: &[String]) -> Vec<Value> {
    let (client, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let serving = tokio::spawn(serve(server, server_read, server_write));

    for frame in frames {
        client_write.write_all(frame.as_bytes()).await.unwrap();
        client_write.write_all(b"\n").await.unwrap();
    }
    client_write.shutdown().await.unwrap();

    let mut raw = String::new();
    client_read.read_to_string(&mut raw).await.unwrap();
    serving.await.unwrap().unwrap();

    raw.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn request(id: u64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

fn call(id: u64, tool: &str, arguments: Value) -> String {
    request(id, "tools/call", json!({"name": tool, "arguments": arguments}))
}

fn by_id(responses: &[Value], id: u64) -> &Value {
    responses
        .iter()
        .find(|r| r["id"] == json!(id))
        .unwrap_or_else(|| panic!("no response for id {id} in {responses:?}"))
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

struct Fixture {
    dir: TempDir,
    server: Arc<McpServer<SilentEngine>>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let server = server_with(SilentEngine::default(), dir.path());
        Self { dir, server }
    }

    fn engine_calls(&self) -> usize {
        self.server.renderer().engine().calls.load(Ordering::SeqCst)
    }
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn initialize_advertises_tools_and_resources() {
    let fx = Fixture::new();
    let responses = exchange(
        fx.server.clone(),
        &[request(1, "initialize", json!({"protocolVersion": PROTOCOL_VERSION}))],
    )
    .await;

    let result = &by_id(&responses, 1)["result"];
    assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
    assert_eq!(result["serverInfo"]["name"], json!("musmcp"));
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["resources"].is_object());
    assert!(result["instructions"].as_str().unwrap().contains("render_csd"));
}

#[tokio::test]
async fn notifications_get_no_response() {
    let fx = Fixture::new();
    let responses = exchange(
        fx.server.clone(),
        &[
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            json!({"jsonrpc": "2.0", "method": "no/such/notification"}).to_string(),
            request(2, "ping", json!({})),
        ],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], json!(2));
    assert_eq!(responses[0]["result"], json!({}));
}

#[tokio::test]
async fn protocol_errors_use_json_rpc_codes() {
    let fx = Fixture::new();
    let responses = exchange(
        fx.server.clone(),
        &[
            "{not json".to_string(),
            request(1, "sing", json!({})),
            call(2, "make_coffee", json!({})),
            request(3, "tools/call", json!({})),
            call(4, "synthesize_tone", json!({"pitch": 440.0})),
            request(5, "resources/read", json!({"uri": "lore://nothing"})),
        ],
    )
    .await;
    assert_eq!(responses.len(), 6);

    let parse = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(parse["error"]["code"], json!(PARSE_ERROR));

    assert_eq!(by_id(&responses, 1)["error"]["code"], json!(METHOD_NOT_FOUND));
    for id in 2..=5 {
        assert_eq!(
            by_id(&responses, id)["error"]["code"],
            json!(INVALID_PARAMS),
            "id {id}"
        );
    }
    assert_eq!(fx.engine_calls(), 0);
}

// ─── Tools ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tools_list_has_schemas() {
    let fx = Fixture::new();
    let responses = exchange(fx.server.clone(), &[request(1, "tools/list", json!({}))]).await;

    let tools = by_id(&responses, 1)["result"]["tools"].as_array().unwrap().clone();
    let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        [
            "render_csd",
            "synthesize_tone",
            "synthesize_sawtooth_lead_bass",
            "synthesize_kick_drum"
        ]
    );
    let sawtooth = &tools[2]["inputSchema"];
    for field in ["pitch", "duration", "cutoff_hz", "attack", "decay", "sustain", "release"] {
        assert!(sawtooth["properties"][field].is_object(), "missing {field}");
    }
}

#[tokio::test]
async fn sawtooth_call_returns_absolute_path() {
    let fx = Fixture::new();
    let responses = exchange(
        fx.server.clone(),
        &[call(
            1,
            "synthesize_sawtooth_lead_bass",
            json!({
                "pitch": 55.0, "duration": 1.5, "cutoff_hz": 400.0,
                "attack": 5, "decay": 80, "sustain": 0, "release": 50,
                "output_filename": "bass_pluck"
            }),
        )],
    )
    .await;

    let response = by_id(&responses, 1);
    assert_eq!(response["result"]["isError"], json!(false));
    let text = tool_text(response);
    let path = PathBuf::from(text.lines().next().unwrap());
    assert!(path.is_absolute());
    assert_eq!(path, fx.dir.path().join("bass_pluck.wav"));
    assert!(path.is_file());
    assert!(text.contains("mono audio at 44100 Hz"));
}

#[tokio::test]
async fn invalid_arguments_come_back_as_tool_errors() {
    let fx = Fixture::new();
    let responses = exchange(
        fx.server.clone(),
        &[call(
            1,
            "synthesize_sawtooth_lead_bass",
            json!({
                "pitch": 0.0, "duration": 1.0, "cutoff_hz": 400.0,
                "attack": 5, "decay": 80, "sustain": 0, "release": 50
            }),
        )],
    )
    .await;

    let response = by_id(&responses, 1);
    assert_eq!(response["result"]["isError"], json!(true));
    assert!(tool_text(response).contains("pitch"));
    assert_eq!(fx.engine_calls(), 0);
    assert!(!fx.dir.path().join("artifacts").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn engine_failure_carries_diagnostics() {
    let dir = tempdir().unwrap();
    let engine = CsoundEngine::new("sh").with_extra_args([
        "-c",
        "echo 'compiling'; echo 'error: unknown opcode foo' >&2; exit 1",
        "fake-csound",
    ]);
    let server = server_with(engine, dir.path());

    let responses = exchange(
        server,
        &[call(1, "render_csd", json!({"csd_content": "instr 1 foo endin"}))],
    )
    .await;

    let response = by_id(&responses, 1);
    assert_eq!(response["result"]["isError"], json!(true));
    let text = tool_text(response);
    assert!(text.starts_with("Error rendering CSD (engine exited with code 1)"));
    assert!(text.contains("STDOUT:\ncompiling\n"));
    assert!(text.contains("STDERR:\nerror: unknown opcode foo\n"));
}

#[tokio::test]
async fn concurrent_calls_are_all_answered() {
    let fx = Fixture::new();
    let frames: Vec<String> = (1..=6)
        .map(|id| {
            call(
                id,
                "synthesize_kick_drum",
                json!({"fundamental_hz": 50.0, "punch": 150, "decay": 80, "drive": 50}),
            )
        })
        .collect();

    let responses = exchange(fx.server.clone(), &frames).await;
    assert_eq!(responses.len(), 6);

    let mut paths = Vec::new();
    for id in 1..=6 {
        let response = by_id(&responses, id);
        assert_eq!(response["result"]["isError"], json!(false));
        paths.push(tool_text(response).lines().next().unwrap().to_string());
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 6);
    assert_eq!(fx.engine_calls(), 6);
}

// ─── Resources ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lore_resources_are_listed_and_readable() {
    let fx = Fixture::new();
    let responses = exchange(
        fx.server.clone(),
        &[
            request(1, "resources/list", json!({})),
            request(2, "resources/read", json!({"uri": "lore://sound_design"})),
        ],
    )
    .await;

    let uris: Vec<_> = by_id(&responses, 1)["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(uris, ["lore://sound_design", "lore://drum_design"]);

    let contents = &by_id(&responses, 2)["result"]["contents"][0];
    assert_eq!(contents["mimeType"], json!("text/markdown"));
    assert!(contents["text"].as_str().unwrap().contains("Warm pad"));
}
