//! Liveness probe.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.len().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerta_shared::Role;

    #[tokio::test]
    async fn reports_connection_count() {
        let state = AppState::new();
        let (_info, _rx) = state.registry.register("u-1", Role::Student, None).await;

        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 1);
        // Inherited from [workspace.package].
        assert_eq!(body["version"], "0.1.0");
    }
}
