//! Error types and handling for the world server.
//!
//! Every failure the dispatch path can produce maps onto one [`ErrorKind`].
//! None of them terminate the process: protocol and routing errors drop the
//! frame, configuration and dependency errors fail the one zone or object
//! being built, and handler faults are caught at the dispatch boundary.

use replica_codec::{CodecError, ObjectId};

/// Coarse classification of a [`ServerError`], used for logging and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Protocol,
    Routing,
    Configuration,
    HandlerFault,
    DependencyViolation,
    Network,
    Persistence,
    ZoneLoad,
    Internal,
}

/// Enumeration of possible server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed frame, unknown packet or message id
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session, object or zone could not be resolved for a frame
    #[error("Routing error: {0}")]
    Routing(String),

    /// Request outside what the server was configured with
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Handler logic returned an error or panicked
    #[error("Handler '{handler}' failed: {reason}")]
    HandlerFault { handler: String, reason: String },

    /// A component was attached without a sibling it depends on
    #[error("Object {object} cannot be built: {component} requires {missing}")]
    DependencyViolation {
        object: ObjectId,
        component: &'static str,
        missing: &'static str,
    },

    /// Socket binding or transmission failure
    #[error("Network error: {0}")]
    Network(String),

    /// Character store failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Zone metadata could not be loaded; fatal to that zone only
    #[error("Zone {zone_id} failed to load: {reason}")]
    ZoneLoad { zone_id: u16, reason: String },

    /// Internal invariant broken
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Protocol(_) => ErrorKind::Protocol,
            ServerError::Routing(_) => ErrorKind::Routing,
            ServerError::Configuration(_) => ErrorKind::Configuration,
            ServerError::HandlerFault { .. } => ErrorKind::HandlerFault,
            ServerError::DependencyViolation { .. } => ErrorKind::DependencyViolation,
            ServerError::Network(_) => ErrorKind::Network,
            ServerError::Persistence(_) => ErrorKind::Persistence,
            ServerError::ZoneLoad { .. } => ErrorKind::ZoneLoad,
            ServerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<CodecError> for ServerError {
    fn from(error: CodecError) -> Self {
        ServerError::Protocol(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_failures_are_protocol_errors() {
        let error: ServerError = CodecError::UnexpectedEnd { needed: 8, remaining: 0 }.into();
        assert_eq!(error.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn dependency_violation_names_both_components() {
        let error = ServerError::DependencyViolation {
            object: ObjectId(500),
            component: "Destructible",
            missing: "Stats",
        };
        assert_eq!(error.kind(), ErrorKind::DependencyViolation);
        assert_eq!(
            error.to_string(),
            "Object 500 cannot be built: Destructible requires Stats"
        );
    }
}
