//! Push protocol definitions: connect request encoding, close codes and the
//! payload shapes the incident backend pushes.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::NotifyError;
use crate::models::{Role, Subject};

/// Query parameter names of the connect request.
pub const PARAM_USER_ID: &str = "user_id";
pub const PARAM_ROLE: &str = "rol";
pub const PARAM_TOKEN: &str = "token";

/// Close codes the client acts on.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Discriminant values of pushed payloads.
pub const WIRE_NEW_INCIDENT: &str = "nuevo_incidente";
pub const WIRE_STATUS_CHANGED: &str = "estado_cambiado";
pub const WIRE_INCIDENT_UPDATE: &str = "actualizacion_incidente";
pub const WIRE_STATUS_CHANGE: &str = "cambio_estado";
pub const WIRE_INCIDENT_EDITED: &str = "incidente_editado";

/// Build the connect URL for a subject.
///
/// Query parameters already present on `endpoint` are kept; the subject's
/// parameters are appended after them.
pub fn connect_url(endpoint: &Url, subject: &Subject) -> Result<Url, NotifyError> {
    match endpoint.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(NotifyError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                other, endpoint
            )))
        }
    }
    if subject.user_id.trim().is_empty() {
        return Err(NotifyError::MissingIdentity("user_id"));
    }
    if subject.credential.trim().is_empty() {
        return Err(NotifyError::MissingIdentity("credential"));
    }

    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair(PARAM_USER_ID, &subject.user_id)
        .append_pair(PARAM_ROLE, subject.role.as_wire())
        .append_pair(PARAM_TOKEN, &subject.credential);
    Ok(url)
}

/// Parse an endpoint string, turning `http(s)` into `ws(s)` so the same base
/// URL used for REST calls can be passed in.
pub fn parse_endpoint(raw: &str) -> Result<Url, NotifyError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| NotifyError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url),
        other => {
            return Err(NotifyError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                other, raw
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| NotifyError::InvalidEndpoint(raw.to_string()))?;
    Ok(url)
}

// --- Payload shapes ---
//
// Every field is optional: the backend has changed these shapes across
// revisions and per recipient role. Only fields that are rendered are
// declared; ids and other extras stay in the raw payload. Free text that
// some revisions send as numbers is kept as a `Value` and read leniently,
// so only a wrong type on urgency, incident type, status or the edited
// field list makes a payload malformed.

/// `nuevo_incidente`, pushed to staff and authorities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewIncidentPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgencia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_incidente: Option<String>,
    /// Floor; sent as a number or a string depending on the revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piso: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiente: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reportado_por: Option<serde_json::Value>,
}

/// `estado_cambiado`, `actualizacion_incidente` and `cambio_estado`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado_anterior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nuevo_estado: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<serde_json::Value>,
}

impl StatusPush {
    /// The new status under whichever name this revision used.
    pub fn latest_status(&self) -> Option<&str> {
        self.status
            .as_deref()
            .or(self.new_status.as_deref())
            .or(self.nuevo_estado.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// `incidente_editado`, pushed to the reporting student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentEditedPush {
    #[serde(default)]
    pub campos_actualizados: Vec<String>,
}

/// Free-form text carried by unknown or generic payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GenericPush {
    pub fn text(&self) -> Option<&str> {
        self.mensaje
            .as_deref()
            .or(self.message.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

// --- Relay API ---

/// Who a pushed message goes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum NotifyTarget {
    /// Every connection that registered with this role.
    Role { rol: Role },
    /// Every connection of one user.
    User { user_id: String },
    All,
    /// Staff and authorities.
    Admins,
}

/// Body of `POST /api/notify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub target: NotifyTarget,
    /// Forwarded to the recipients verbatim.
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub delivered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject {
            user_id: "u 1".into(),
            role: Role::Staff,
            credential: "tok&en".into(),
        }
    }

    #[test]
    fn connect_url_encodes_subject() {
        let endpoint = Url::parse("wss://push.example.com/dev").unwrap();
        let url = connect_url(&endpoint, &subject()).unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("user_id".to_string(), "u 1".to_string()),
                ("rol".to_string(), "Personal administrativo".to_string()),
                ("token".to_string(), "tok&en".to_string()),
            ]
        );
        assert_eq!(url.path(), "/dev");
    }

    #[test]
    fn connect_url_keeps_existing_query() {
        let endpoint = Url::parse("ws://localhost:8080/ws?stage=dev").unwrap();
        let url = connect_url(&endpoint, &subject()).unwrap();
        assert!(url.as_str().starts_with("ws://localhost:8080/ws?stage=dev&user_id="));
    }

    #[test]
    fn connect_url_rejects_http_and_blank_identity() {
        let http = Url::parse("http://localhost:8080/ws").unwrap();
        assert!(matches!(
            connect_url(&http, &subject()),
            Err(NotifyError::InvalidEndpoint(_))
        ));

        let endpoint = Url::parse("ws://localhost/ws").unwrap();
        let mut blank = subject();
        blank.credential = String::new();
        assert_eq!(
            connect_url(&endpoint, &blank),
            Err(NotifyError::MissingIdentity("credential"))
        );
    }

    #[test]
    fn parse_endpoint_upgrades_http_schemes() {
        assert_eq!(parse_endpoint("https://a.b/dev").unwrap().scheme(), "wss");
        assert_eq!(parse_endpoint("http://a.b/").unwrap().scheme(), "ws");
        assert_eq!(parse_endpoint("ws://a.b/").unwrap().scheme(), "ws");
        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn status_push_prefers_latest_name() {
        let push = StatusPush {
            nuevo_estado: Some("completed".into()),
            status: Some("in_progress".into()),
            ..Default::default()
        };
        assert_eq!(push.latest_status(), Some("in_progress"));
        assert_eq!(StatusPush::default().latest_status(), None);
    }

    #[test]
    fn notify_request_reads_scoped_targets() {
        let req: NotifyRequest = serde_json::from_str(
            r#"{"target": {"scope": "role", "rol": "Autoridad"}, "message": {"tipo": "x"}}"#,
        )
        .unwrap();
        assert_eq!(
            req.target,
            NotifyTarget::Role {
                rol: Role::Authority
            }
        );
        assert_eq!(req.message["tipo"], "x");

        let all: NotifyTarget = serde_json::from_str(r#"{"scope": "all"}"#).unwrap();
        assert_eq!(all, NotifyTarget::All);
        let user: NotifyTarget =
            serde_json::from_str(r#"{"scope": "user", "user_id": "u-9"}"#).unwrap();
        assert_eq!(
            user,
            NotifyTarget::User {
                user_id: "u-9".into()
            }
        );
        assert!(serde_json::from_str::<NotifyTarget>(r#"{"scope": "nobody"}"#).is_err());
    }
}
