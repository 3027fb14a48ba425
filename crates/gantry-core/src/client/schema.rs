//! Wire types for the remote module service.
//!
//! The server speaks camelCase JSON. Upload and the installed list both
//! answer with the same metadata shape, so one struct covers both; fields
//! the installer never reads are simply not modeled.

use serde::{Deserialize, Serialize};

/// Body for the authenticate call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub remember_me: bool,
}

/// Reply from the authenticate call. Which key carries the token depends on
/// the server build, so both are modeled.
#[derive(Debug, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl AuthResponse {
    /// The bearer token, preferring `id_token` over `access_token`.
    pub fn into_token(self) -> Option<String> {
        self.id_token.or(self.access_token)
    }
}

/// Metadata the server holds for one module, echoed by upload and listed by
/// the installed endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleMetadata {
    pub id: Option<i64>,
    pub name: String,
    pub base_package: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub artifact: Option<String>,
    pub active: bool,
    pub new: bool,
    pub in_error: Option<bool>,
    pub install_on_boot: Option<bool>,
    pub priority: i32,
}

/// Body for the install call, a trimmed echo of the upload metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub active: bool,
    pub artifact: Option<String>,
    pub base_package: Option<String>,
    pub description: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub new: bool,
    pub install_on_boot: bool,
    pub priority: i32,
}

impl InstallRequest {
    /// Build the install body from uploaded metadata. A module that never
    /// declared install-on-boot defaults to off.
    pub fn from_metadata(meta: &ModuleMetadata) -> Self {
        Self {
            active: meta.active,
            artifact: meta.artifact.clone(),
            base_package: meta.base_package.clone(),
            description: meta.description.clone(),
            name: meta.name.clone(),
            version: meta.version.clone(),
            new: meta.new,
            install_on_boot: meta.install_on_boot.unwrap_or(false),
            priority: meta.priority,
        }
    }
}

/// Reply from the install call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallResponse {
    pub r#type: Option<String>,
    pub message: Option<String>,
    pub module: Option<ModuleMetadata>,
}

impl InstallResponse {
    /// Whether the reply counts as a successful install, evaluated in
    /// precedence order:
    /// 1. `type` equals `"SUCCESS"`, any case;
    /// 2. the message says the module is already installed;
    /// 3. the reply carries module info explicitly flagged not-in-error,
    ///    with a non-empty name.
    pub fn indicates_success(&self) -> bool {
        if self
            .r#type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("SUCCESS"))
        {
            return true;
        }
        if self
            .message
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains("already installed"))
        {
            return true;
        }
        self.module
            .as_ref()
            .is_some_and(|m| m.in_error == Some(false) && !m.name.is_empty())
    }

    /// Reason string recorded when the reply is not a success.
    pub fn failure_reason(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "(no message)".to_string())
    }
}
