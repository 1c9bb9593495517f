//! Unary RPC method handlers: `session/create`, `session/get`,
//! `session/list`, `session/close`.

use kore_core::data::{AgentMode, Session};
use serde::Deserialize;
use serde_json::Value;

use crate::rpc::JsonRpcError;
use crate::state::ServerState;

#[derive(Deserialize)]
struct CreateSessionParams {
    name: String,
    #[serde(default)]
    agent_mode: Option<String>,
}

#[derive(Deserialize)]
struct SessionIdParams {
    id: String,
}

#[derive(Deserialize, Default)]
struct ListSessionsParams {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    20
}

pub async fn create_session(state: &ServerState, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: CreateSessionParams = serde_json::from_value(params.unwrap_or_default())
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
    let mode = match params.agent_mode {
        Some(raw) => raw.parse::<AgentMode>().map_err(JsonRpcError::invalid_params)?,
        None => AgentMode::Standard,
    };
    let session = Session::new(params.name, mode);
    state
        .store
        .create_session(&session)
        .map_err(|e| JsonRpcError::from_kore_error(&e))?;
    serde_json::to_value(&session).map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}

pub async fn get_session(state: &ServerState, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: SessionIdParams = serde_json::from_value(params.unwrap_or_default())
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
    let session = state.store.get_session(&params.id).map_err(|e| JsonRpcError::from_kore_error(&e))?;
    serde_json::to_value(&session).map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}

pub async fn list_sessions(state: &ServerState, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: ListSessionsParams = match params {
        Some(value) => serde_json::from_value(value).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?,
        None => ListSessionsParams::default(),
    };
    let sessions =
        state.store.list_sessions(params.limit, params.offset).map_err(|e| JsonRpcError::from_kore_error(&e))?;
    serde_json::to_value(&sessions).map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}

pub async fn close_session(state: &ServerState, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: SessionIdParams = serde_json::from_value(params.unwrap_or_default())
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
    state.store.close_session(&params.id).map_err(|e| JsonRpcError::from_kore_error(&e))?;
    Ok(serde_json::json!({ "closed": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn create_then_get_round_trips_the_session() {
        let state = test_state();
        let created = create_session(&state, Some(serde_json::json!({"name": "demo"}))).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let fetched = get_session(&state, Some(serde_json::json!({"id": id}))).await.unwrap();
        assert_eq!(fetched["name"], "demo");
    }

    #[tokio::test]
    async fn get_unknown_session_is_not_found() {
        let state = test_state();
        let err = get_session(&state, Some(serde_json::json!({"id": "missing"}))).await.unwrap_err();
        assert_eq!(err.code, JsonRpcError::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_rejects_an_unknown_agent_mode() {
        let state = test_state();
        let err = create_session(&state, Some(serde_json::json!({"name": "demo", "agent_mode": "bogus"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn list_sessions_reflects_creation_and_close() {
        let state = test_state();
        create_session(&state, Some(serde_json::json!({"name": "a"}))).await.unwrap();
        let created_b = create_session(&state, Some(serde_json::json!({"name": "b"}))).await.unwrap();

        let listed = list_sessions(&state, None).await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 2);

        close_session(&state, Some(serde_json::json!({"id": created_b["id"]}))).await.unwrap();
        let after_close = list_sessions(&state, None).await.unwrap();
        assert_eq!(after_close.as_array().unwrap().len(), 1);
        assert!(get_session(&state, Some(serde_json::json!({"id": created_b["id"]}))).await.is_err());
    }
}
