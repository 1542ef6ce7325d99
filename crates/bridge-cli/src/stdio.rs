//! Local stdio republishing loop
//!
//! Newline-delimited JSON-RPC on stdin/stdout. The loop answers
//! `initialize` and `ping` locally under the bridge's own identity, maps
//! `tools/list` to capability enumeration, and forwards every other request
//! through the remote handle. stdout carries only protocol frames;
//! diagnostics go to stderr.

use bridge_core::{RemoteError, RemoteRequest, RemoteService};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::Result;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// What the republished server announces about itself
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub instructions: Option<String>,
    pub version: String,
}

/// Serve the remote handle on stdin/stdout until EOF
pub async fn serve(service: Box<dyn RemoteService>, identity: ServerIdentity) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    run_loop(service, identity, reader, writer).await
}

pub(crate) async fn run_loop<R, W>(
    service: Box<dyn RemoteService>,
    identity: ServerIdentity,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // one underlying network session for the lifetime of the loop
    service.open().await.map_err(bridge_core::Error::from)?;

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed frame");
                continue;
            }
        };
        if let Some(response) = handle_message(service.as_ref(), &identity, message).await {
            let mut frame = serde_json::to_string(&response)?;
            frame.push('\n');
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    if let Err(e) = service.close().await {
        tracing::debug!(error = %e, "error closing remote session");
    }
    Ok(())
}

async fn handle_message(
    service: &dyn RemoteService,
    identity: &ServerIdentity,
    message: Value,
) -> Option<Value> {
    let method = message.get("method")?.as_str()?.to_string();
    let id = message.get("id").cloned().filter(|id| !id.is_null());
    let params = message.get("params").cloned();

    let Some(id) = id else {
        // client notifications stay local
        tracing::debug!(method, "dropping notification");
        return None;
    };

    let response = match method.as_str() {
        "initialize" => {
            let mut result = json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": identity.name, "version": identity.version},
            });
            if let Some(instructions) = &identity.instructions {
                result["instructions"] = json!(instructions);
            }
            json!({"jsonrpc": "2.0", "id": id, "result": result})
        }
        "ping" => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
        "tools/list" => match service.list_capabilities().await {
            Ok(tools) => json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tools}}),
            Err(error) => error_frame(id, &error),
        },
        _ => match service.invoke(RemoteRequest::new(method, params)).await {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => error_frame(id, &error),
        },
    };
    Some(response)
}

fn error_frame(id: Value, error: &RemoteError) -> Value {
    let code = match error {
        RemoteError::Application { code, .. } => *code,
        _ => -32000,
    };
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": error.to_string()},
    })
}
