use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Launch rejected: {0}")]
    LaunchRejected(String),

    #[error("{service} error: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("Invalid continuation token: {0}")]
    InvalidToken(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn collaborator(
        service: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::Collaborator {
            service,
            message: message.into(),
        }
    }

    pub fn invalid_response(
        service: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// Failures worth retrying: collaborator outages and malformed
    /// responses. Unknown ids, bad input and rejected launches are final.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Collaborator { .. }
            | CoreError::InvalidResponse { .. }
            | CoreError::Serialization(_) => true,
            #[cfg(feature = "database")]
            CoreError::Database(_) => true,
            CoreError::NotFound(_)
            | CoreError::LaunchRejected(_)
            | CoreError::InvalidToken(_)
            | CoreError::InvalidInput(_)
            | CoreError::Internal(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CoreError::collaborator("logs", "timeout").is_transient());
        assert!(CoreError::invalid_response("tasks", "eof").is_transient());
        assert!(!CoreError::NotFound("scan".into()).is_transient());
        assert!(!CoreError::InvalidToken("f/x".into()).is_transient());
    }

    #[test]
    fn collaborator_message_names_the_service() {
        let err = CoreError::collaborator("log storage", "throttled");
        assert_eq!(err.to_string(), "log storage error: throttled");
    }
}
