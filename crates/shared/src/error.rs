//! Error types shared by the notification client and the push relay.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The subject id or credential is absent; nothing is retried until the
    /// caller supplies a full identity.
    #[error("missing identity: {0} is required")]
    MissingIdentity(&'static str),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The transport could not be created at all (as opposed to a close
    /// reported later by an established one).
    #[error("transport error: {0}")]
    Transport(String),
}

impl NotifyError {
    /// Identity and endpoint problems stay broken until the caller changes
    /// something; transport failures may succeed on a later attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, NotifyError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_missing_field() {
        let err = NotifyError::MissingIdentity("credential");
        assert_eq!(err.to_string(), "missing identity: credential is required");
        assert!(!err.is_retriable());
        assert!(NotifyError::Transport("refused".into()).is_retriable());
    }
}
