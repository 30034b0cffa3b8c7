//! Council error types

use std::time::Duration;

use thiserror::Error;

/// Result type for council operations
pub type Result<T> = std::result::Result<T, CouncilError>;

/// Errors that can occur while running a group conversation
#[derive(Debug, Error)]
pub enum CouncilError {
    /// Model reply did not match the requested structured schema
    #[error("Schema violation: {source} (raw reply: {raw})")]
    SchemaViolation {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// Selection named a participant that is not in the registry
    #[error("Unknown participant selected: {0}")]
    UnknownParticipant(String),

    /// Result filtering was asked to summarize nothing
    #[error("No messages in the chat history")]
    EmptyTranscript,

    /// Selection was asked to choose from an empty registry
    #[error("No participants to select from")]
    NoParticipants,

    /// Participant selected a second time before everyone else had spoken
    #[error("Participant selected again before all others spoke: {0}")]
    FairnessViolation(String),

    /// Completion or search service returned an error status
    #[error("{service} error: {message}")]
    Upstream { service: &'static str, message: String },

    /// Bounded wait for agent replies elapsed
    #[error("Timed out after {0:?} waiting for agent responses")]
    Timeout(Duration),

    /// Agent task panicked or was cancelled
    #[error("Agent task failed: {0}")]
    AgentTask(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport error talking to an upstream service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CouncilError {
    /// Build an upstream error for the named service
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    /// Whether this error is a broken protocol invariant rather than a service failure
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownParticipant(_)
                | Self::EmptyTranscript
                | Self::NoParticipants
                | Self::FairnessViolation(_)
        )
    }
}
