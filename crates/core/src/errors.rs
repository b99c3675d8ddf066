use thiserror::Error;

use crate::config::ConfigError;

pub const SESSION_NOT_FOUND_MESSAGE: &str = "Session does not exist, please start over.";
pub const INVALID_SELECTION_MESSAGE: &str =
    "Please choose one of the listed product numbers that has a name.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("session `{session_id}` does not exist")]
    SessionNotFound { session_id: String },
    /// Positions are 1-based; unnamed products cannot be looked up.
    #[error("no nameable product at position {position} ({available} listed)")]
    InvalidSelection { position: usize, available: usize },
}

impl DialogueError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => SESSION_NOT_FOUND_MESSAGE,
            Self::InvalidSelection { .. } => INVALID_SELECTION_MESSAGE,
        }
    }
}

/// Failure reported by an external collaborator (LLM, translator, search
/// agent). The dialogue controller degrades every variant; none reaches the
/// shopper.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} transport failure: {message}")]
    Transport { collaborator: String, message: String },
    #[error("{collaborator} timed out after {seconds}s")]
    Timeout { collaborator: String, seconds: u64 },
    #[error("{collaborator} exited with status {status}: {stderr}")]
    NonZeroExit { collaborator: String, status: String, stderr: String },
    #[error("{collaborator} returned an invalid response: {message}")]
    InvalidResponse { collaborator: String, message: String },
    #[error("{collaborator} is unavailable: {message}")]
    Unavailable { collaborator: String, message: String },
}

impl CollaboratorError {
    pub fn collaborator(&self) -> &str {
        match self {
            Self::Transport { collaborator, .. }
            | Self::Timeout { collaborator, .. }
            | Self::NonZeroExit { collaborator, .. }
            | Self::InvalidResponse { collaborator, .. }
            | Self::Unavailable { collaborator, .. } => collaborator,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    /// Transport failures and timeouts may succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Dialogue(#[from] DialogueError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("invalid input: {0}")]
    Input(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Dialogue(_) => "dialogue",
            Self::Collaborator(_) => "collaborator",
            Self::Input(_) => "input",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Input(_) => 3,
            Self::Dialogue(_) | Self::Collaborator(_) => 4,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(error) => format!("configuration is invalid: {error}"),
            Self::Dialogue(error) => error.user_message().to_string(),
            Self::Collaborator(_) => {
                "An external service is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::Input(message) => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigError;
    use crate::errors::{ApplicationError, CollaboratorError, DialogueError};

    #[test]
    fn session_not_found_has_fixed_user_message() {
        let error = DialogueError::SessionNotFound { session_id: "session_x".to_owned() };
        assert_eq!(error.user_message(), "Session does not exist, please start over.");
        assert_eq!(error.to_string(), "session `session_x` does not exist");
    }

    #[test]
    fn invalid_selection_names_the_position() {
        let error = DialogueError::InvalidSelection { position: 7, available: 5 };
        assert_eq!(error.to_string(), "no nameable product at position 7 (5 listed)");
        assert_eq!(
            error.user_message(),
            "Please choose one of the listed product numbers that has a name."
        );
    }

    #[test]
    fn only_transport_and_timeout_are_retryable() {
        let transport = CollaboratorError::Transport {
            collaborator: "llm".to_owned(),
            message: "connection reset".to_owned(),
        };
        let invalid = CollaboratorError::InvalidResponse {
            collaborator: "llm".to_owned(),
            message: "no choices".to_owned(),
        };

        assert!(transport.is_retryable());
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.collaborator(), "llm");
        assert_eq!(invalid.kind(), "invalid_response");
    }

    #[test]
    fn application_errors_map_to_stable_exit_codes() {
        let configuration =
            ApplicationError::from(ConfigError::Validation("search.command is required".to_owned()));
        assert_eq!(configuration.error_class(), "configuration");
        assert_eq!(configuration.exit_code(), 2);
        assert!(configuration.user_message().contains("search.command"));

        let input = ApplicationError::Input("batch file is empty".to_owned());
        assert_eq!(input.exit_code(), 3);

        let runtime = ApplicationError::from(CollaboratorError::Timeout {
            collaborator: "search_agent".to_owned(),
            seconds: 30,
        });
        assert_eq!(runtime.error_class(), "collaborator");
        assert_eq!(runtime.exit_code(), 4);
    }
}
