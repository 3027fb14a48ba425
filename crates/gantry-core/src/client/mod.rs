//! Remote module service client.
//!
//! The orchestrator only ever talks to the server through the
//! [`ModuleService`] trait, so passes can be driven against scripted fakes
//! in tests while production wires in the HTTP adapter.

pub mod http;
pub mod schema;

use std::path::Path;

use async_trait::async_trait;

use crate::error::ServiceError;
use schema::{InstallRequest, InstallResponse, ModuleMetadata};

pub use http::{authenticate, HttpModuleService};

/// The three verbs the install protocol needs from the server.
#[async_trait]
pub trait ModuleService: Send + Sync {
    /// Push artifact bytes; the server answers with its metadata echo.
    async fn upload(&self, artifact: &Path) -> Result<ModuleMetadata, ServiceError>;

    /// Ask the server to install previously uploaded metadata.
    async fn install(&self, request: &InstallRequest) -> Result<InstallResponse, ServiceError>;

    /// The server's current installed-module list.
    async fn installed(&self) -> Result<Vec<ModuleMetadata>, ServiceError>;
}
