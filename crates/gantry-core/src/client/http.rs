//! HTTP adapter for the remote module service.
//!
//! Endpoint paths and payload shapes follow the server's v1 API. Responses
//! are read as text first so failure reasons can quote the body.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use url::Url;

use crate::error::ServiceError;

use super::schema::{AuthRequest, AuthResponse, InstallRequest, InstallResponse, ModuleMetadata};
use super::ModuleService;

const AUTHENTICATE_PATH: &str = "/api/v1/authenticate";
const UPLOAD_PATH: &str = "/api/v1/modules/upload";
const INSTALL_PATH: &str = "/api/v1/modules/install?install=true";
const INSTALLED_PATH: &str = "/api/v1/modules/installed";

const ARCHIVE_CONTENT_TYPE: &str = "application/java-archive";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Log in and obtain the bearer token consumed by every other call.
///
/// Any failure here is fatal to the run, so every error path maps to
/// [`ServiceError::Authentication`].
pub async fn authenticate(
    base_url: &Url,
    username: &str,
    password: &str,
) -> Result<String, ServiceError> {
    let url = join(base_url, AUTHENTICATE_PATH)
        .map_err(|reason| ServiceError::Authentication { reason })?;

    let http = build_http().map_err(|reason| ServiceError::Authentication { reason })?;
    let response = http
        .post(url)
        .json(&AuthRequest {
            username,
            password,
            remember_me: true,
        })
        .send()
        .await
        .map_err(|e| ServiceError::Authentication {
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Authentication {
            reason: format!("server answered {status}: {body}"),
        });
    }

    let reply: AuthResponse = response
        .json()
        .await
        .map_err(|e| ServiceError::Authentication {
            reason: format!("unreadable authentication reply: {e}"),
        })?;

    reply.into_token().ok_or_else(|| ServiceError::Authentication {
        reason: "authentication reply carried no token".to_string(),
    })
}

/// The production [`ModuleService`] backed by the server's HTTP API.
pub struct HttpModuleService {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpModuleService {
    /// Build a client around an already obtained bearer token.
    pub fn new(base_url: Url, token: String) -> Result<Self, ServiceError> {
        let http = build_http().map_err(|reason| ServiceError::Protocol { reason })?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Authenticate and build the client in one step.
    pub async fn login(
        base_url: Url,
        username: &str,
        password: &str,
    ) -> Result<Self, ServiceError> {
        let token = authenticate(&base_url, username, password).await?;
        Self::new(base_url, token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        join(&self.base_url, path).map_err(|reason| ServiceError::Protocol { reason })
    }
}

#[async_trait]
impl ModuleService for HttpModuleService {
    async fn upload(&self, artifact: &Path) -> Result<ModuleMetadata, ServiceError> {
        let bytes = tokio::fs::read(artifact)
            .await
            .map_err(|e| ServiceError::Transport {
                reason: format!("failed to read {}: {e}", artifact.display()),
            })?;
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("module.jar")
            .to_string();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(ARCHIVE_CONTENT_TYPE)
            .map_err(|e| ServiceError::Protocol {
                reason: e.to_string(),
            })?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint(UPLOAD_PATH)?)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(ServiceError::Transport {
                reason: format!("upload failed ({status}): {body}"),
            });
        }

        tracing::debug!(artifact = %artifact.display(), "upload accepted");
        serde_json::from_str(&body).map_err(|e| ServiceError::Protocol {
            reason: format!("failed to parse upload reply: {e}"),
        })
    }

    async fn install(&self, request: &InstallRequest) -> Result<InstallResponse, ServiceError> {
        let response = self
            .http
            .post(self.endpoint(INSTALL_PATH)?)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            // Install rejections usually arrive as a regular install reply;
            // hand that reply back so the caller can read its message.
            if let Ok(reply) = serde_json::from_str::<InstallResponse>(&body) {
                tracing::debug!(%status, name = %request.name, "install rejected");
                return Ok(reply);
            }
            return Err(ServiceError::Transport {
                reason: format!("install failed ({status}): {body}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| ServiceError::Protocol {
            reason: format!("failed to parse install reply: {e}"),
        })
    }

    async fn installed(&self) -> Result<Vec<ModuleMetadata>, ServiceError> {
        let response = self
            .http
            .get(self.endpoint(INSTALLED_PATH)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Transport {
                reason: format!("installed list failed ({status}): {body}"),
            });
        }

        response.json().await.map_err(|e| ServiceError::Protocol {
            reason: format!("failed to parse installed list: {e}"),
        })
    }
}

fn build_http() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .user_agent("gantry")
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())
}

fn join(base: &Url, path: &str) -> Result<Url, String> {
    base.join(path)
        .map_err(|e| format!("invalid endpoint {path} against {base}: {e}"))
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Transport {
        reason: e.to_string(),
    }
}
