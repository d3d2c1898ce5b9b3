//! Live push connections and fan-out.
//!
//! Every WebSocket registers here with the user id and role it connected
//! with. Notifying a target serializes the message once and queues it on
//! each matching connection; connections whose queue is gone are pruned.

use std::collections::HashMap;

use alerta_shared::{NotifyTarget, Role};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Metadata of one registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub user_id: String,
    pub role: Role,
    /// Recorded as sent; not validated.
    pub token: Option<String>,
    pub connected_at: DateTime<Utc>,
}

struct Entry {
    info: ConnectionInfo,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. The receiver yields the serialized messages meant
    /// for it.
    pub async fn register(
        &self,
        user_id: &str,
        role: Role,
        token: Option<String>,
    ) -> (ConnectionInfo, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ConnectionInfo {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            role,
            token,
            connected_at: Utc::now(),
        };
        self.connections.write().await.insert(
            info.id,
            Entry {
                info: info.clone(),
                tx,
            },
        );
        tracing::info!(
            "Connection {} registered for {} ({})",
            info.id,
            info.user_id,
            info.role
        );
        (info, rx)
    }

    /// Returns whether the connection was still registered.
    pub async fn unregister(&self, id: Uuid) -> bool {
        let removed = self.connections.write().await.remove(&id).is_some();
        if removed {
            tracing::info!("Connection {} removed", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .read()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Deliver `message` to every connection matching `target`. Returns how
    /// many connections it was queued on.
    pub async fn notify(&self, target: &NotifyTarget, message: &serde_json::Value) -> usize {
        let text = message.to_string();
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let connections = self.connections.read().await;
            for entry in connections.values().filter(|e| matches(target, &e.info)) {
                if entry.tx.send(text.clone()).is_ok() {
                    tracing::debug!("Message queued for {} ({})", entry.info.id, entry.info.user_id);
                    delivered += 1;
                } else {
                    tracing::warn!("Connection {} is gone, pruning", entry.info.id);
                    dead.push(entry.info.id);
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in dead {
                connections.remove(&id);
            }
        }

        delivered
    }

    pub async fn notify_role(&self, role: Role, message: &serde_json::Value) -> usize {
        self.notify(&NotifyTarget::Role { rol: role }, message).await
    }

    pub async fn notify_user(&self, user_id: &str, message: &serde_json::Value) -> usize {
        let target = NotifyTarget::User {
            user_id: user_id.to_string(),
        };
        self.notify(&target, message).await
    }

    pub async fn notify_all(&self, message: &serde_json::Value) -> usize {
        self.notify(&NotifyTarget::All, message).await
    }

    pub async fn notify_admins(&self, message: &serde_json::Value) -> usize {
        self.notify(&NotifyTarget::Admins, message).await
    }
}

fn matches(target: &NotifyTarget, info: &ConnectionInfo) -> bool {
    match target {
        NotifyTarget::Role { rol } => &info.role == rol,
        NotifyTarget::User { user_id } => &info.user_id == user_id,
        NotifyTarget::All => true,
        NotifyTarget::Admins => info.role.is_admin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fans_out_by_target() {
        let registry = ConnectionRegistry::new();
        let (_, mut student) = registry.register("s-1", Role::Student, None).await;
        let (_, mut staff) = registry.register("a-1", Role::Staff, Some("tok".into())).await;
        let (_, mut authority) = registry.register("a-2", Role::Authority, None).await;

        let message = json!({"tipo": "nuevo_incidente"});
        assert_eq!(registry.notify_admins(&message).await, 2);
        assert_eq!(staff.recv().await.unwrap(), message.to_string());
        assert_eq!(authority.recv().await.unwrap(), message.to_string());
        assert!(student.try_recv().is_err());

        assert_eq!(registry.notify_user("s-1", &json!({"n": 1})).await, 1);
        assert_eq!(student.recv().await.unwrap(), r#"{"n":1}"#);

        assert_eq!(registry.notify_role(Role::Authority, &json!(1)).await, 1);
        assert_eq!(registry.notify_all(&json!(2)).await, 3);
        assert_eq!(registry.notify_user("nobody", &json!(3)).await, 0);
    }

    #[tokio::test]
    async fn prunes_connections_that_went_away() {
        let registry = ConnectionRegistry::new();
        let (_, rx) = registry.register("u-1", Role::Student, None).await;
        let (_, _kept) = registry.register("u-2", Role::Student, None).await;
        drop(rx);

        assert_eq!(registry.notify_all(&json!({})).await, 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.connections().await[0].user_id, "u-2");
    }

    #[tokio::test]
    async fn unregister_removes_once() {
        let registry = ConnectionRegistry::new();
        let (info, _rx) = registry.register("u-1", Role::Other("Visitante".into()), None).await;

        assert!(registry.unregister(info.id).await);
        assert!(!registry.unregister(info.id).await);
        assert!(registry.is_empty().await);
    }
}
