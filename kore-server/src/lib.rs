//! Kore's session server: a single-process JSON-RPC 2.0 front over
//! `kore-core`'s agent loop and session store. Unary calls (`session/create`,
//! `session/get`, `session/list`, `session/close`) go through `/rpc`; the
//! bidirectional `session/sendMessage` call is a WebSocket at `/ws`;
//! `ExecuteCommand` and `SubscribeEvents` are Server-Sent Events at
//! `/stream/command` and `/stream/events`. Grounded throughout on the
//! teacher's `a2a/{server,rpc}.rs`.

pub mod handlers;
pub mod rpc;
pub mod state;
pub mod stream;
pub mod transport;
pub mod ws;

#[cfg(test)]
mod test_support;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::ServerState;
pub use transport::Transport;

use rpc::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION, METHOD_CLOSE_SESSION,
    METHOD_CREATE_SESSION, METHOD_GET_SESSION, METHOD_LIST_SESSIONS,
};

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/stream/command", post(stream::execute_command))
        .route("/stream/events", post(stream::subscribe_events))
        .route("/ws", get(ws::send_message))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn handle_rpc(State(state): State<ServerState>, Json(request): Json<JsonRpcRequest>) -> Json<JsonRpcResponse> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Json(JsonRpcResponse::error(
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "expected JSON-RPC 2.0"),
            request.id,
        ));
    }

    let result = match request.method.as_str() {
        METHOD_CREATE_SESSION => handlers::create_session(&state, request.params).await,
        METHOD_GET_SESSION => handlers::get_session(&state, request.params).await,
        METHOD_LIST_SESSIONS => handlers::list_sessions(&state, request.params).await,
        METHOD_CLOSE_SESSION => handlers::close_session(&state, request.params).await,
        other => Err(JsonRpcError::method_not_found(other)),
    };

    match result {
        Ok(value) => Json(JsonRpcResponse::success(value, request.id)),
        Err(err) => Json(JsonRpcResponse::error(err, request.id)),
    }
}
