//! The protocol server loop.
//!
//! Reads one JSON-RPC message per line from stdin and writes one response
//! per request to stdout. Tool calls run as independent tasks so slow
//! upstream operations do not block the loop; responses funnel through a
//! single writer task. All logging goes to stderr; stdout belongs to the
//! protocol.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::core::Core;
use crate::protocol::{
    tool_result, JsonRpcRequest, JsonRpcResponse, ToolCallParams, INVALID_PARAMS,
    METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};
use crate::registry::ToolRegistry;

pub async fn run(core: Arc<Core>, registry: Arc<ToolRegistry>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            match serde_json::to_string(&response) {
                Ok(line) => {
                    if stdout.write_all(line.as_bytes()).await.is_err()
                        || stdout.write_all(b"\n").await.is_err()
                        || stdout.flush().await.is_err()
                    {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize response"),
            }
        }
    });

    tracing::info!("gateway listening on stdio");

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx
                    .send(JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("invalid JSON: {e}"),
                    ))
                    .await;
                continue;
            }
        };

        dispatch_message(request, core.clone(), registry.clone(), tx.clone()).await;
    }

    drop(tx);
    let _ = writer.await;
    tracing::info!("stdin closed, gateway shutting down");
    Ok(())
}

async fn dispatch_message(
    request: JsonRpcRequest,
    core: Arc<Core>,
    registry: Arc<ToolRegistry>,
    tx: mpsc::Sender<JsonRpcResponse>,
) {
    // Notifications get no response.
    let id = match request.id {
        Some(id) => id,
        None => {
            tracing::debug!(method = %request.method, "notification received");
            return;
        }
    };

    match request.method.as_str() {
        "initialize" => {
            let result = serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": "spgateway",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            });
            let _ = tx.send(JsonRpcResponse::success(id, result)).await;
        }
        "ping" => {
            let _ = tx
                .send(JsonRpcResponse::success(id, serde_json::json!({})))
                .await;
        }
        "tools/list" => {
            let result = serde_json::json!({"tools": registry.list()});
            let _ = tx.send(JsonRpcResponse::success(id, result)).await;
        }
        "tools/call" => {
            let params: ToolCallParams = match request
                .params
                .map(serde_json::from_value)
                .transpose()
            {
                Ok(Some(params)) => params,
                Ok(None) => {
                    let _ = tx
                        .send(JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            "tools/call requires params",
                        ))
                        .await;
                    return;
                }
                Err(e) => {
                    let _ = tx
                        .send(JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            format!("bad tools/call params: {e}"),
                        ))
                        .await;
                    return;
                }
            };

            // Each call is its own task: a stalled upstream never blocks
            // other invocations, and a panicking handler only kills its
            // own task.
            tokio::spawn(async move {
                tracing::debug!(tool = %params.name, "tool call started");
                let envelope = registry.call(&core, &params.name, &params.arguments).await;
                let is_error = !envelope.is_ok();
                let rendered = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "envelope serialization failed");
                        format!(
                            "{{\"status\":\"error\",\"error\":{{\"kind\":\"Internal\",\"message\":\"{e}\"}}}}"
                        )
                    }
                };
                let _ = tx
                    .send(JsonRpcResponse::success(id, tool_result(rendered, is_error)))
                    .await;
            });
        }
        other => {
            let _ = tx
                .send(JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("unknown method '{other}'"),
                ))
                .await;
        }
    }
}
