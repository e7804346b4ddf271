//! Error types for command registration and dispatch

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command registration, binding and dispatch errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// A command with the same name is already present in the host table
    #[error("Command '{0}' is already registered")]
    Collision(String),

    /// The host command table cannot be reached or mutated
    #[error("Host command table unavailable: {0}")]
    HostIntegration(String),

    /// A handler could not be constructed or bound
    #[error("Cannot bind command handler '{handler}': {reason}")]
    HandlerBind { handler: String, reason: String },

    /// A concrete action failed during a silent dispatch
    #[error("Unhandled exception executing command '{label}' in {owner}")]
    Dispatch {
        label: String,
        owner: String,
        #[source]
        source: anyhow::Error,
    },

    /// A descriptor or registration failed validation
    #[error("Invalid command declaration: {0}")]
    InvalidDescriptor(String),
}

/// Kinds of command errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorType {
    RegistrationCollision,
    HostIntegrationFailure,
    HandlerBindFailure,
    DispatchFailure,
    ValidationFailed,
}

impl CommandError {
    /// Kind of failure, for reporting
    pub fn error_type(&self) -> ErrorType {
        match self {
            CommandError::Collision(_) => ErrorType::RegistrationCollision,
            CommandError::HostIntegration(_) => ErrorType::HostIntegrationFailure,
            CommandError::HandlerBind { .. } => ErrorType::HandlerBindFailure,
            CommandError::Dispatch { .. } => ErrorType::DispatchFailure,
            CommandError::InvalidDescriptor(_) => ErrorType::ValidationFailed,
        }
    }

    /// Name already taken in the host table
    pub fn collision(command_name: &str) -> Self {
        CommandError::Collision(command_name.to_string())
    }

    /// Host table cannot be reached or mutated
    pub fn host_unavailable(reason: impl Into<String>) -> Self {
        CommandError::HostIntegration(reason.into())
    }

    /// Handler could not be constructed or bound
    pub fn bind_failed(handler: &str, reason: impl Into<String>) -> Self {
        CommandError::HandlerBind {
            handler: handler.to_string(),
            reason: reason.into(),
        }
    }

    /// Action failed while dispatched by `owner` under `label`
    pub fn dispatch_failed(label: &str, owner: &str, source: anyhow::Error) -> Self {
        CommandError::Dispatch {
            label: label.to_string(),
            owner: owner.to_string(),
            source,
        }
    }

    /// Descriptor or registration rejected by validation
    pub fn invalid(reason: impl Into<String>) -> Self {
        CommandError::InvalidDescriptor(reason.into())
    }

    /// Whether this error only concerns a single registration or handler
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CommandError::HostIntegration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_types() {
        assert_eq!(CommandError::collision("foo").error_type(), ErrorType::RegistrationCollision);
        assert_eq!(CommandError::host_unavailable("gone").error_type(), ErrorType::HostIntegrationFailure);
        assert_eq!(CommandError::bind_failed("Foo", "nope").error_type(), ErrorType::HandlerBindFailure);
        assert_eq!(CommandError::invalid("bad").error_type(), ErrorType::ValidationFailed);
    }

    #[test]
    fn test_dispatch_error_keeps_source() {
        let err = CommandError::dispatch_failed("foo", "demo", anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "Unhandled exception executing command 'foo' in demo");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_host_failure_is_fatal() {
        assert!(!CommandError::host_unavailable("lock poisoned").is_recoverable());
    }
}
