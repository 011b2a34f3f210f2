//! Atelier Host Binary
//!
//! Speaks JSON lines over stdio: one command frame per stdin line, one push
//! frame per stdout line. Logging goes to stderr so stdout stays a clean
//! protocol stream.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use atelier_host::models::envelope::{
    channels, AnswerSubmission, Envelope, InitRequest, SendMessageRequest,
};
use atelier_host::services::events::UiSink;
use atelier_host::{
    AgentBridge, ChannelSink, ChatOrchestrator, CliRuntime, HostConfig, TodoStore,
};

/// One command frame read from stdin
#[derive(Debug, Deserialize)]
struct CommandFrame {
    channel: String,
    #[serde(default)]
    payload: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = HostConfig::load().context("Failed to load host configuration")?;
    info!(runtime = %config.runtime_command, "Starting agent host");

    let (sink, mut pushes) = ChannelSink::new();
    let sink = Arc::new(sink);
    let (bridge, commands) = AgentBridge::new(sink.clone(), &config);
    let runtime = Arc::new(CliRuntime::new(config));
    let todos = Arc::new(TodoStore::new());

    let orchestrator = ChatOrchestrator::new(Arc::clone(&bridge), runtime, todos);
    tokio::spawn(async move { orchestrator.run(commands).await });

    // push frames become stdout lines
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = pushes.recv().await {
            let line = match serde_json::to_string(&frame) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Dropping unserializable push frame: {e}");
                    continue;
                }
            };
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                error!("stdout closed, stopping push writer");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CommandFrame>(line) {
            Ok(frame) => handle_frame(&bridge, sink.as_ref(), frame).await,
            Err(e) => warn!("Skipping malformed command frame: {e}"),
        }
    }

    info!("stdin closed, shutting down");
    bridge.stop().await;
    // the orchestrator task keeps the push channel open; give the writer a
    // moment to drain rather than waiting on it
    let _ = tokio::time::timeout(std::time::Duration::from_millis(200), writer).await;
    Ok(())
}

/// Dispatch one command frame and push its reply on `<channel>:reply`
async fn handle_frame(bridge: &AgentBridge, sink: &dyn UiSink, frame: CommandFrame) {
    let reply_channel = format!("{}:reply", frame.channel);
    let reply: Value = match frame.channel.as_str() {
        channels::INIT => match serde_json::from_value::<InitRequest>(frame.payload) {
            Ok(request) => to_reply(None, bridge.init(request).await),
            Err(e) => rejection(None, format!("Invalid init payload: {e}")),
        },
        channels::STATUS => to_reply(None, bridge.status().await),
        channels::SEND_MESSAGE => {
            match serde_json::from_value::<SendMessageRequest>(frame.payload) {
                Ok(request) => {
                    let request_id = request.request_id.clone();
                    match bridge.send_message(request).await {
                        Ok(accepted) => to_reply(Some(request_id), accepted),
                        Err(e) => rejection(Some(request_id), e.to_string()),
                    }
                }
                Err(e) => rejection(None, format!("Invalid message payload: {e}")),
            }
        }
        channels::STOP => to_reply(None, bridge.stop().await),
        channels::ANSWER => match serde_json::from_value::<AnswerSubmission>(frame.payload) {
            Ok(submission) => {
                let request_id = submission.request_id.clone();
                to_reply(Some(request_id), bridge.answer(submission).await)
            }
            Err(e) => rejection(None, format!("Invalid answer payload: {e}")),
        },
        other => rejection(None, format!("Unknown channel: {other}")),
    };
    sink.push(&reply_channel, reply);
}

fn to_reply<T: serde::Serialize>(request_id: Option<String>, payload: T) -> Value {
    serde_json::to_value(Envelope::new(request_id, payload)).unwrap_or(Value::Null)
}

fn rejection(request_id: Option<String>, message: String) -> Value {
    to_reply(
        request_id,
        serde_json::json!({ "success": false, "error": message }),
    )
}
