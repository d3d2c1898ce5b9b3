//! Push a message to connected clients.

use alerta_shared::{NotifyRequest, NotifyResponse};
use axum::{extract::State, Json};

use crate::state::AppState;

/// Fan a message out to the connections matching `target`.
pub async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Json<NotifyResponse> {
    let delivered = state
        .registry
        .notify(&request.target, &request.message)
        .await;
    tracing::info!("Notify {:?}: delivered to {}", request.target, delivered);
    Json(NotifyResponse { delivered })
}
