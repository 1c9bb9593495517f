//! `SendMessage`: a bidirectional stream over a WebSocket. Each inbound
//! frame is a `JsonRpcRequest` with method `session/sendMessage`; the
//! server answers with one outbound frame per message the turn appended
//! (not token-by-token — the agent loop runs a turn to completion, then
//! the newly appended messages are replayed back as the "stream").

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::rpc::{JsonRpcError, JsonRpcResponse, METHOD_SEND_MESSAGE};
use crate::state::ServerState;

#[derive(Deserialize)]
struct SendMessageParams {
    session_id: String,
    content: String,
}

pub async fn send_message(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    while let Some(Ok(message)) = socket.recv().await {
        let WsMessage::Text(text) = message else { continue };
        let request: crate::rpc::JsonRpcRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let _ = send_frame(&mut socket, JsonRpcResponse::error(JsonRpcError::invalid_params(e.to_string()), Value::Null)).await;
                continue;
            }
        };

        if request.method != METHOD_SEND_MESSAGE {
            let _ = send_frame(&mut socket, JsonRpcResponse::error(JsonRpcError::method_not_found(&request.method), request.id)).await;
            continue;
        }

        let params: SendMessageParams = match serde_json::from_value(request.params.unwrap_or_default()) {
            Ok(params) => params,
            Err(e) => {
                let _ = send_frame(&mut socket, JsonRpcResponse::error(JsonRpcError::invalid_params(e.to_string()), request.id)).await;
                continue;
            }
        };

        let lock = state.session_lock(&params.session_id).await;
        let _guard = lock.lock().await;

        let mut session = match state.store.get_session(&params.session_id) {
            Ok(session) => session,
            Err(e) => {
                let _ = send_frame(&mut socket, JsonRpcResponse::error(JsonRpcError::from_kore_error(&e), request.id)).await;
                continue;
            }
        };

        let before = session.messages.len();
        let result = state.agent_loop.run_turn(&mut session, &params.content, CancellationToken::new()).await;

        if let Err(e) = result {
            let _ = send_frame(&mut socket, JsonRpcResponse::error(JsonRpcError::from_kore_error(&e), request.id.clone())).await;
            continue;
        }

        if let Err(e) = state.store.save_messages(&session.id, &session.messages) {
            let _ = send_frame(&mut socket, JsonRpcResponse::error(JsonRpcError::from_kore_error(&e), request.id.clone())).await;
            continue;
        }

        for message in &session.messages[before..] {
            let payload = serde_json::to_value(message).unwrap_or_default();
            if send_frame(&mut socket, JsonRpcResponse::success(payload, request.id.clone())).await.is_err() {
                break;
            }
        }
    }
}

async fn send_frame(socket: &mut WebSocket, response: JsonRpcResponse) -> Result<(), axum::Error> {
    let mut line = serde_json::to_string(&response).unwrap_or_default();
    line.push('\n');
    socket.send(WsMessage::Text(line.into())).await
}
