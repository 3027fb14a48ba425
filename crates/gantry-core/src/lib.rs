//! Gantry Core Library
//!
//! Dependency-aware deployment of module archives onto a running server:
//! a declaration-ordered dependency graph, an upload/install/confirm
//! protocol driver, and status reconciliation against the server's own
//! installed list.

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod matcher;
pub mod orchestrator;
pub mod tracker;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::GantryConfig;

    // Graph
    pub use crate::graph::{DependencyGraph, GraphEntry};

    // Client
    pub use crate::client::schema::{InstallRequest, InstallResponse, ModuleMetadata};
    pub use crate::client::{authenticate, HttpModuleService, ModuleService};

    // Orchestration
    pub use crate::orchestrator::{InstallOrchestrator, OrchestratorOptions, PassSummary};

    // Tracking
    pub use crate::tracker::{InstallProgress, ModuleRecord, ModuleStatus, StatusTracker};

    // Errors
    pub use crate::error::{GraphError, ServiceError};
}
