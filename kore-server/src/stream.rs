//! Server-streaming RPCs: `command/execute` and `events/subscribe`, both
//! delivered as Server-Sent Events. Grounded on the teacher's
//! `a2a/server.rs::handle_stream`, which drives an `async_stream::stream!`
//! off a broadcast receiver and wraps it in `axum::response::sse::Sse`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::rpc::{CommandOutput, CommandOutputType, JsonRpcError, JsonRpcRequest};
use crate::state::ServerState;

#[derive(Deserialize)]
struct ExecuteCommandParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    workdir: Option<std::path::PathBuf>,
    #[serde(default)]
    env: std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
struct SubscribeEventsParams {
    #[serde(default)]
    #[allow(dead_code)]
    session_id: Option<String>,
    #[serde(default)]
    event_types: Vec<String>,
}

pub async fn execute_command(
    State(state): State<ServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let params: ExecuteCommandParams = match serde_json::from_value(request.params.unwrap_or_default()) {
        Ok(params) => params,
        Err(e) => return Err(Json(JsonRpcError::invalid_params(e.to_string()))),
    };

    let ctx = kore_core::localenv::ExecContext { workdir: params.workdir, env: params.env, timeout: None };
    let (mut output_rx, exit_rx) = match state.local_env.execute_stream(&params.command, &params.args, &ctx).await {
        Ok(pair) => pair,
        Err(e) => return Err(Json(JsonRpcError::from_kore_error(&e))),
    };

    let stream = async_stream::stream! {
        loop {
            match output_rx.recv().await {
                Ok(chunk) => {
                    let output = CommandOutput {
                        kind: CommandOutputType::Stdout,
                        data: String::from_utf8_lossy(&chunk).to_string(),
                        exit_code: None,
                    };
                    yield Ok::<_, Infallible>(SseEvent::default().data(serde_json::to_string(&output).unwrap_or_default()));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
        let exit_code = exit_rx.await.unwrap_or(-1);
        let output = CommandOutput { kind: CommandOutputType::Exit, data: String::new(), exit_code: Some(exit_code) };
        yield Ok::<_, Infallible>(SseEvent::default().data(serde_json::to_string(&output).unwrap_or_default()));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive")))
}

pub async fn subscribe_events(
    State(state): State<ServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let params: SubscribeEventsParams = match serde_json::from_value(request.params.unwrap_or_default()) {
        Ok(params) => params,
        Err(e) => return Err(Json(JsonRpcError::invalid_params(e.to_string()))),
    };

    let mut rx = state.events.subscribe();
    let wanted = params.event_types;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !wanted.is_empty() && !wanted.contains(&event.kind) {
                        continue;
                    }
                    yield Ok::<_, Infallible>(SseEvent::default().data(serde_json::to_string(&event).unwrap_or_default()));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    };

    Ok::<_, Json<JsonRpcError>>(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive")))
}
