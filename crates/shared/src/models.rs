//! Shared data models for the alerta notification client and push relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

// --- Identity ---

/// Role of the subject a notification stream is scoped to.
///
/// Serialized with the labels the incident backend uses on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Student,
    Staff,
    Authority,
    Other(String),
}

impl Role {
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "Estudiante" => Role::Student,
            "Personal administrativo" | "Administrativo" => Role::Staff,
            "Autoridad" => Role::Authority,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Role::Student => "Estudiante",
            Role::Staff => "Personal administrativo",
            Role::Authority => "Autoridad",
            Role::Other(label) => label,
        }
    }

    /// Staff and authorities receive the admin-facing notification stream.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Staff | Role::Authority)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Role::parse(&label))
    }
}

/// Identity as handed over by the auth/session layer. Either part may be
/// missing, e.g. before login or right after logout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub role: Role,
    pub credential: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role, credential: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role,
            credential: Some(credential.into()),
        }
    }

    /// An identity with nothing in it (logged out).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        non_blank(&self.user_id).is_some() && non_blank(&self.credential).is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A validated identity: both the user id and the credential are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub user_id: String,
    pub role: Role,
    pub credential: String,
}

impl TryFrom<Identity> for Subject {
    type Error = NotifyError;

    fn try_from(identity: Identity) -> Result<Self, Self::Error> {
        let user_id = non_blank(&identity.user_id)
            .ok_or(NotifyError::MissingIdentity("user_id"))?
            .to_string();
        let credential = non_blank(&identity.credential)
            .ok_or(NotifyError::MissingIdentity("credential"))?
            .to_string();
        Ok(Self {
            user_id,
            role: identity.role,
            credential,
        })
    }
}

// --- Notifications ---

/// Canonical notification categories after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    NewIncident,
    StatusChanged,
    IncidentEdited,
    GenericUpdate,
}

impl NotificationKind {
    /// Icon shown next to the notification in panels and toasts.
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationKind::NewIncident => "🆕",
            NotificationKind::StatusChanged => "🔄",
            NotificationKind::IncidentEdited => "✏️",
            NotificationKind::GenericUpdate => "🔔",
        }
    }

    /// Kinds that make incident lists stale.
    pub fn affects_incident_list(&self) -> bool {
        matches!(
            self,
            NotificationKind::NewIncident | NotificationKind::StatusChanged
        )
    }
}

/// A notification as held in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    /// Discriminant exactly as the server sent it, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_type: Option<String>,
    /// Original payload. Unparseable frames are kept as a JSON string.
    pub raw: serde_json::Value,
}

impl Notification {
    /// Incident the notification refers to, when the server included one.
    pub fn incident_id(&self) -> Option<&str> {
        self.raw.get("incident_id").and_then(|v| v.as_str())
    }
}
