use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Credential(String),
    #[error("HTTP error! status: {status}")]
    TokenAcquisition { status: u16 },
    #[error("Failed to parse token response: {0}")]
    TokenResponse(String),
    #[error("The provided registration token is not registered with FCM")]
    Unregistered,
    /// A 5xx answer that may succeed on a later attempt. Only the message
    /// sender sees this variant; exhausted retries surface as [`PushError::Http`].
    #[error("Server error! status: {status}, message: {message}")]
    Transient { status: u16, message: String },
    #[error("HTTP error! status: {status}, message: {message}")]
    Http { status: u16, message: String },
    #[error("External service error: {0}")]
    Transport(#[source] anyhow::Error),
}

impl PushError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    #[must_use]
    pub const fn is_unregistered(&self) -> bool {
        matches!(self, Self::Unregistered)
    }

    /// Turns a leftover transient failure into the terminal delivery error.
    #[must_use]
    pub(crate) fn into_terminal(self) -> Self {
        match self {
            Self::Transient { status, message } => Self::Http { status, message },
            other => other,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Credential(_) => "credential",
            Self::TokenAcquisition { .. } | Self::TokenResponse(_) => "token_acquisition",
            Self::Unregistered => "unregistered",
            Self::Transient { .. } | Self::Http { .. } => "http",
            Self::Transport(_) => "transport",
        }
    }
}

pub type Result<T> = std::result::Result<T, PushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_becomes_http_when_terminal() {
        let err = PushError::Transient { status: 503, message: "unavailable".into() }.into_terminal();
        assert!(matches!(err, PushError::Http { status: 503, .. }));
        assert_eq!(err.to_string(), "HTTP error! status: 503, message: unavailable");
    }

    #[test]
    fn test_other_errors_pass_through() {
        assert!(PushError::Unregistered.into_terminal().is_unregistered());
        assert!(!PushError::Http { status: 400, message: String::new() }.is_transient());
    }
}
