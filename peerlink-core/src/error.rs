//! Transport error taxonomy.

use std::num::ParseIntError;

use crate::adapter::Role;

/// Errors surfaced by the adapter. Empty polls and best-effort sends are never errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not initialized")]
    NotInitialized,
    #[error("session already started as {role:?}")]
    AlreadyStarted { role: Role },
    #[error("{operation} is not available to role {role:?}")]
    WrongRole {
        operation: &'static str,
        role: Option<Role>,
    },
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("invalid service type: {0}")]
    InvalidServiceType(String),
    #[error("invalid peer id: {0}")]
    InvalidPeerId(#[from] ParseIntError),
}
