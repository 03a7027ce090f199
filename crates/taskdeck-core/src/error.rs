use std::fmt;

/// Machine-readable error codes for scripts and agents driving the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    NotLoggedIn,
    SessionExpired,
    RequestRejected,
    InvalidDraft,
    InvalidDropTarget,
    NetworkUnavailable,
    MalformedPayload,
    PushChannelClosed,
    StateFileWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::NotLoggedIn => "E1002",
            Self::SessionExpired => "E1003",
            Self::RequestRejected => "E2001",
            Self::InvalidDraft => "E2002",
            Self::InvalidDropTarget => "E2003",
            Self::NetworkUnavailable => "E3001",
            Self::MalformedPayload => "E3002",
            Self::PushChannelClosed => "E3003",
            Self::StateFileWriteFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::NotLoggedIn => "Not logged in",
            Self::SessionExpired => "Session expired",
            Self::RequestRejected => "Request rejected by server",
            Self::InvalidDraft => "Invalid task draft",
            Self::InvalidDropTarget => "Invalid drop target",
            Self::NetworkUnavailable => "Server unreachable",
            Self::MalformedPayload => "Malformed payload",
            Self::PushChannelClosed => "Live updates disconnected",
            Self::StateFileWriteFailed => "State file write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in taskdeck/config.toml and retry."),
            Self::NotLoggedIn | Self::SessionExpired => Some("Run `td login` and retry."),
            Self::RequestRejected => None,
            Self::InvalidDraft => Some("Give the task a non-empty title."),
            Self::InvalidDropTarget => Some("Drop on one of: todo, in_progress, done."),
            Self::NetworkUnavailable => Some("Check `api_url` in the config and that the server is up."),
            Self::MalformedPayload => Some("Server and client versions may disagree; update td."),
            Self::PushChannelClosed => Some("Cached data may lag until the next refresh."),
            Self::StateFileWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure the sync engine can surface.
///
/// Read paths never return these to subscribers; a failed fetch lands on the
/// cache entry instead. Write paths (mutations, drag-drop) return them to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Transport failure, timeout, or 5xx. The cache keeps its last data.
    #[error("network error: {0}")]
    Network(String),

    /// The server (or local draft validation) refused the request.
    #[error("request rejected ({status}): {detail}")]
    Validation { status: u16, detail: String },

    /// 401 from the server. Fatal for the session.
    #[error("not authenticated: {0}")]
    Auth(String),

    /// The push channel for a workspace closed; cached data stops receiving patches.
    #[error("push channel for workspace {workspace_id} closed: {reason}")]
    ReconciliationGap { workspace_id: i64, reason: String },

    /// A response body or push message could not be decoded.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// A drop target that does not name a board column.
    #[error("invalid drop target '{0}'")]
    InvalidDrop(String),

    /// Persisting client state failed.
    #[error("state storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Local validation failure with no HTTP status behind it.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            status: 422,
            detail: detail.into(),
        }
    }

    /// Classify an HTTP error status into the taxonomy.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            401 => Self::Auth(detail),
            400..=499 => Self::Validation { status, detail },
            _ => Self::Network(format!("server returned {status}: {detail}")),
        }
    }

    /// The stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::NetworkUnavailable,
            Self::Validation { status: 422, .. } => ErrorCode::InvalidDraft,
            Self::Validation { .. } => ErrorCode::RequestRejected,
            Self::Auth(_) => ErrorCode::SessionExpired,
            Self::ReconciliationGap { .. } => ErrorCode::PushChannelClosed,
            Self::Decode(_) => ErrorCode::MalformedPayload,
            Self::InvalidDrop(_) => ErrorCode::InvalidDropTarget,
            Self::Storage(_) => ErrorCode::StateFileWriteFailed,
        }
    }

    /// `true` for errors that end the session rather than a single request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// `true` when retrying the same request later may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ReconciliationGap { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, SyncError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::NotLoggedIn,
            ErrorCode::SessionExpired,
            ErrorCode::RequestRejected,
            ErrorCode::InvalidDraft,
            ErrorCode::InvalidDropTarget,
            ErrorCode::NetworkUnavailable,
            ErrorCode::MalformedPayload,
            ErrorCode::PushChannelClosed,
            ErrorCode::StateFileWriteFailed,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn status_classification() {
        assert!(matches!(SyncError::from_status(401, "expired"), SyncError::Auth(_)));
        assert!(matches!(
            SyncError::from_status(400, "already a member"),
            SyncError::Validation { status: 400, .. }
        ));
        assert!(matches!(
            SyncError::from_status(404, "Task not found"),
            SyncError::Validation { status: 404, .. }
        ));
        assert!(matches!(SyncError::from_status(503, "down"), SyncError::Network(_)));
    }

    #[test]
    fn only_auth_is_fatal() {
        assert!(SyncError::Auth("x".into()).is_fatal());
        assert!(!SyncError::Network("x".into()).is_fatal());
        assert!(!SyncError::invalid("x").is_fatal());
        assert!(SyncError::Network("x".into()).is_recoverable());
        assert!(!SyncError::invalid("x").is_recoverable());
    }

    #[test]
    fn local_validation_maps_to_invalid_draft() {
        assert_eq!(SyncError::invalid("title").code(), ErrorCode::InvalidDraft);
        assert_eq!(
            SyncError::from_status(409, "dup").code(),
            ErrorCode::RequestRejected
        );
    }
}
