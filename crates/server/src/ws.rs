//! WebSocket endpoint the notification client connects to.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use alerta_shared::Role;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

/// Query string of the connect request (`user_id`, `rol`, `token`).
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub user_id: Option<String>,
    pub rol: Option<String>,
    pub token: Option<String>,
}

/// A validated connect request.
#[derive(Debug, PartialEq)]
pub struct Registration {
    pub user_id: String,
    pub role: Role,
    pub token: Option<String>,
}

type Rejection = (StatusCode, Json<serde_json::Value>);

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ConnectParams {
    /// `user_id` and `rol` are required; the token is optional.
    pub fn validate(self) -> Result<Registration, Rejection> {
        let reject = |field: &str| {
            tracing::warn!("Rejecting connection: {} is required", field);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": format!("{} is required", field) })),
            )
        };

        let user_id = non_blank(self.user_id).ok_or_else(|| reject("user_id"))?;
        let rol = non_blank(self.rol).ok_or_else(|| reject("rol"))?;

        Ok(Registration {
            user_id,
            role: Role::parse(&rol),
            token: non_blank(self.token),
        })
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, Rejection> {
    let registration = params.validate()?;
    tracing::info!(
        "WebSocket connect from {} ({})",
        registration.user_id,
        registration.role
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, registration, state)))
}

/// Forward queued messages to the socket until either side goes away.
async fn handle_socket(socket: WebSocket, registration: Registration, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (info, mut outbound) = state
        .registry
        .register(&registration.user_id, registration.role, registration.token)
        .await;

    let send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients don't send anything meaningful; read only to notice the close.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("WebSocket {} read error: {}", info.id, e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    state.registry.unregister(info.id).await;
    tracing::info!("WebSocket connection closed for user: {}", info.user_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(user_id: Option<&str>, rol: Option<&str>, token: Option<&str>) -> ConnectParams {
        ConnectParams {
            user_id: user_id.map(String::from),
            rol: rol.map(String::from),
            token: token.map(String::from),
        }
    }

    #[test]
    fn requires_user_and_role() {
        let (status, Json(body)) = params(None, Some("Estudiante"), None)
            .validate()
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "user_id is required");

        let (_, Json(body)) = params(Some("u-1"), Some("  "), None).validate().unwrap_err();
        assert_eq!(body["message"], "rol is required");
    }

    #[test]
    fn token_is_optional() {
        let registration = params(Some("u-1"), Some("Autoridad"), None).validate().unwrap();
        assert_eq!(
            registration,
            Registration {
                user_id: "u-1".into(),
                role: Role::Authority,
                token: None,
            }
        );

        let with_token = params(Some("u-1"), Some("Estudiante"), Some("jwt"))
            .validate()
            .unwrap();
        assert_eq!(with_token.token.as_deref(), Some("jwt"));
    }
}
