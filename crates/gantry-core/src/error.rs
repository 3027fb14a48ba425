//! Error types for the install pipeline.
//!
//! Unsatisfied dependencies are deliberately absent here: the orchestrator
//! records them as a `Skipped` status, not as an error.

use thiserror::Error;

/// Faults raised while talking to the remote module service.
///
/// `Authentication` aborts the whole run before any install activity; every
/// other variant is caught at the module boundary and downgraded to a
/// `Failed` status plus a log entry, so one module never sinks the pass.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Login was rejected or the auth endpoint was unreachable.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// Network-level failure, or a non-success HTTP status, on upload,
    /// install, or installed-list.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The server answered but the response did not parse or lacked an
    /// expected field.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// The install call reported success but the module never showed up in
    /// the installed list before the deadline.
    #[error("module '{name}' was not registered within {timeout_secs}s")]
    ConfirmationTimeout { name: String, timeout_secs: u64 },
}

impl ServiceError {
    /// True only for the variant that must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::Authentication { .. })
    }
}

/// Problems detected while validating a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A dependency chain loops back on itself.
    #[error("circular dependency: {chain}")]
    CircularDependency { chain: String },

    /// An entry requires a module the graph never declares.
    #[error("module '{module}' requires undeclared module '{requirement}'")]
    UnknownDependency { module: String, requirement: String },

    /// The same module key is declared twice.
    #[error("module '{module}' is declared more than once")]
    DuplicateModule { module: String },
}
