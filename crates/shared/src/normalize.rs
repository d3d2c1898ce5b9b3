//! Payload normalization.
//!
//! Turns whatever the push endpoint sends into a canonical [`Notification`].
//! The backend's message shapes differ per protocol revision and per recipient
//! role; this is the only place that knows about them.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{Notification, NotificationKind, Role};
use crate::protocol::{
    GenericPush, IncidentEditedPush, NewIncidentPush, StatusPush, WIRE_INCIDENT_EDITED,
    WIRE_INCIDENT_UPDATE, WIRE_NEW_INCIDENT, WIRE_STATUS_CHANGE, WIRE_STATUS_CHANGED,
};

const DEFAULT_TITLE: &str = "New notification";
const DEFAULT_MESSAGE: &str = "You have a new update";

/// Normalize a raw frame, stamping it with the current time if the server
/// did not send a usable timestamp.
pub fn normalize(raw: &str, role: &Role) -> Notification {
    normalize_at(raw, role, Utc::now())
}

/// Same as [`normalize`] with an explicit arrival time.
pub fn normalize_at(raw: &str, role: &Role, arrived_at: DateTime<Utc>) -> Notification {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => return unparseable(raw, arrived_at),
    };

    let wire_type = discriminant(&value);
    let (kind, title, message) = match wire_type.as_deref() {
        Some(WIRE_NEW_INCIDENT) => fields::<NewIncidentPush>(&value).map(new_incident),
        Some(WIRE_STATUS_CHANGED) => fields::<StatusPush>(&value).map(status_changed),
        Some(WIRE_INCIDENT_UPDATE) => fields::<StatusPush>(&value).map(incident_update),
        Some(WIRE_STATUS_CHANGE) => {
            fields::<StatusPush>(&value).map(|push| status_change(push, role))
        }
        Some(WIRE_INCIDENT_EDITED) => fields::<IncidentEditedPush>(&value).map(incident_edited),
        _ => Some(generic(&value)),
    }
    .unwrap_or_else(|| generic(&value));

    Notification {
        id: notification_id(&value),
        kind,
        title,
        message,
        created_at: server_timestamp(&value).unwrap_or(arrived_at),
        read: false,
        wire_type,
        raw: value,
    }
}

type Rendered = (NotificationKind, String, String);

fn unparseable(raw: &str, arrived_at: DateTime<Utc>) -> Notification {
    Notification {
        id: uuid::Uuid::new_v4().to_string(),
        kind: NotificationKind::GenericUpdate,
        title: DEFAULT_TITLE.to_string(),
        message: DEFAULT_MESSAGE.to_string(),
        created_at: arrived_at,
        read: false,
        wire_type: None,
        raw: Value::String(raw.to_string()),
    }
}

fn discriminant(value: &Value) -> Option<String> {
    ["tipo", "type"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Kind-specific fields; `None` when one of them has the wrong JSON type.
fn fields<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

fn notification_id(value: &Value) -> String {
    value
        .get("notification_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// RFC 3339 string, offset-less ISO 8601 string (taken as UTC) or integer
/// epoch milliseconds.
fn server_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let ts = value.get("timestamp").or_else(|| value.get("created_at"))?;
    match ts {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .map(|naive| naive.and_utc())
                })
                .ok()
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

// --- Labels ---

pub fn status_label(status: &str) -> String {
    match status {
        "pending" => "Pending".to_string(),
        "in_progress" => "In progress".to_string(),
        "completed" => "Resolved".to_string(),
        "rejected" => "Rejected".to_string(),
        other => other.to_string(),
    }
}

pub fn urgency_icon(urgency: &str) -> &'static str {
    match urgency {
        "low" => "🟢",
        "medium" => "🟡",
        "high" => "🟠",
        "critical" => "🔴",
        _ => "🔔",
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "description" => "description",
        "urgency" => "urgency",
        "type" => "type",
        "floor" => "floor",
        "ambient" => "area",
        other => other,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// --- Per-kind rendering ---

fn new_incident(push: NewIncidentPush) -> Rendered {
    let urgency = push
        .urgencia
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "medium".to_string());
    let incident_type = push
        .tipo_incidente
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Incident".to_string());
    let floor = push.piso.as_ref().and_then(text_of);
    let area = push.ambiente.as_ref().and_then(text_of);
    let location = match (floor, area) {
        (Some(floor), Some(area)) => format!("Floor {} - {}", floor, area),
        _ => "unspecified location".to_string(),
    };

    let mut message = format!(
        "{} {} in {} · urgency {}",
        urgency_icon(&urgency),
        incident_type,
        location,
        urgency
    );
    if let Some(reporter) = push.reportado_por.as_ref().and_then(text_of) {
        message.push_str(&format!(" ({})", reporter));
    }

    (NotificationKind::NewIncident, "New report".to_string(), message)
}

fn status_changed(push: StatusPush) -> Rendered {
    let old = push
        .estado_anterior
        .as_deref()
        .map(status_label)
        .unwrap_or_else(|| "unknown".to_string());
    let new = push
        .nuevo_estado
        .as_deref()
        .map(status_label)
        .unwrap_or_else(|| "unknown".to_string());

    (
        NotificationKind::StatusChanged,
        "Status updated".to_string(),
        format!("Incident moved from {} to {}", old, new),
    )
}

/// Student-facing update. Only a status change when it names the new status.
fn incident_update(push: StatusPush) -> Rendered {
    match push.nuevo_estado.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => (
            NotificationKind::StatusChanged,
            "Status updated".to_string(),
            format!("Your report is now {}", status_label(status)),
        ),
        None => (
            NotificationKind::GenericUpdate,
            "Important update".to_string(),
            push.mensaje
                .as_ref()
                .and_then(text_of)
                .unwrap_or_else(|| "Your incident has been updated".to_string()),
        ),
    }
}

fn status_change(push: StatusPush, role: &Role) -> Rendered {
    let status = push.latest_status().map(status_label);
    let message = match (role, status) {
        (Role::Student, Some(status)) => format!("Your report is now {}", status),
        (Role::Student, None) => "The status of your report changed".to_string(),
        (_, Some(status)) => format!("Incident marked as {}", status),
        (_, None) => "Incident status updated".to_string(),
    };

    (
        NotificationKind::StatusChanged,
        "Status updated".to_string(),
        message,
    )
}

fn incident_edited(push: IncidentEditedPush) -> Rendered {
    let labels: Vec<&str> = push
        .campos_actualizados
        .iter()
        .map(|f| field_label(f))
        .collect();
    let message = if labels.is_empty() {
        "Your incident was updated".to_string()
    } else {
        format!("Updated: {}", labels.join(", "))
    };

    (
        NotificationKind::IncidentEdited,
        "Report modified".to_string(),
        message,
    )
}

fn generic(value: &Value) -> Rendered {
    let message = fields::<GenericPush>(value)
        .and_then(|push| push.text().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
    (
        NotificationKind::GenericUpdate,
        DEFAULT_TITLE.to_string(),
        message,
    )
}
