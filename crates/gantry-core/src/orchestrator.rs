//! The install orchestrator: decides order, drives the wire protocol per
//! module, and keeps local status reconciled with server truth.
//!
//! A pass is strictly sequential. Later modules may depend on modules
//! installed moments earlier in the same pass, so there is no parallelism to
//! be had here, and all tracker mutation happens on the orchestrating task.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::client::schema::InstallRequest;
use crate::client::ModuleService;
use crate::error::ServiceError;
use crate::graph::DependencyGraph;
use crate::matcher;
use crate::tracker::{ModuleStatus, StatusTracker, VERSION_NOT_INSTALLED};

/// Knobs for the confirm step.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Poll the installed list after each install call until the module
    /// shows up healthy. Turning this off trusts the install reply alone.
    pub confirm_install: bool,

    /// Ceiling on one module's confirm polling.
    pub confirm_timeout: Duration,

    /// Sleep between installed-list polls.
    pub poll_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            confirm_install: true,
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Outcome counts handed back to the caller after a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Modules that reached `Installed` during this pass.
    pub installed: usize,
    /// Modules that reached `Failed` during this pass.
    pub failed: usize,
    /// Modules skipped because their prerequisites were not installed yet.
    pub skipped: usize,
    /// Graph keys with no artifact in the discovery set.
    pub missing: usize,
}

impl PassSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Drives install passes over one tracker, one graph, and one server.
pub struct InstallOrchestrator {
    service: Arc<dyn ModuleService>,
    graph: DependencyGraph,
    tracker: StatusTracker,
    options: OrchestratorOptions,
    cancel: CancellationToken,
}

impl InstallOrchestrator {
    pub fn new(
        service: Arc<dyn ModuleService>,
        graph: DependencyGraph,
        tracker: StatusTracker,
    ) -> Self {
        Self {
            service,
            graph,
            tracker,
            options: OrchestratorOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a token the caller may cancel; it is honored between modules,
    /// never in the middle of one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Walk the dependency graph in declaration order and install every
    /// eligible module, then reconcile against the server.
    ///
    /// Eligibility is judged against the set of modules installed earlier in
    /// this same pass, which starts empty: a module whose prerequisites are
    /// declared later in the table gets skipped, not deferred.
    pub async fn install_all(&mut self) -> PassSummary {
        let keys: Vec<(String, Vec<String>)> = self
            .graph
            .iter()
            .map(|e| (e.name.clone(), e.requires.clone()))
            .collect();

        self.tracker.begin_pass(keys.len());
        self.tracker
            .log(format!("Starting install pass over {} modules", keys.len()));

        let mut installed_this_pass: HashSet<String> = HashSet::new();
        let mut summary = PassSummary::default();

        for (key, requires) in keys {
            if self.cancel.is_cancelled() {
                self.tracker.log("Pass cancelled; remaining modules untouched");
                return summary;
            }

            if !self.graph.eligible(&key, &installed_this_pass) {
                if let Some(index) = matcher::find_record_index(&key, self.tracker.records()) {
                    self.tracker.mark_skipped(index);
                }
                self.tracker.log(format!(
                    "Skipping {key}, dependencies not satisfied: {}",
                    requires.join(", ")
                ));
                self.tracker.advance();
                summary.skipped += 1;
                continue;
            }

            let Some(index) = matcher::find_record_index(&key, self.tracker.records()) else {
                self.tracker.log(format!("No artifact found for {key}"));
                self.tracker.advance();
                summary.missing += 1;
                continue;
            };

            if self.drive_module(index).await == ModuleStatus::Installed {
                installed_this_pass.insert(key);
                summary.installed += 1;
            } else {
                summary.failed += 1;
            }
            self.tracker.advance();
        }

        self.tracker.finish_pass();
        self.log_pass_end(&summary);
        self.reconcile().await;
        summary
    }

    /// Install exactly the modules named by `keys`, ignoring dependency
    /// gating. This is the operator's override, so unknown keys only log.
    pub async fn install_selected(&mut self, keys: &[String]) -> PassSummary {
        let targets: Vec<(String, Option<usize>)> = keys
            .iter()
            .map(|key| {
                (
                    key.clone(),
                    matcher::find_record_index(key, self.tracker.records()),
                )
            })
            .collect();

        self.tracker.begin_pass(targets.len());
        self.tracker
            .log(format!("Installing {} selected modules", targets.len()));
        let mut summary = PassSummary::default();

        for (key, index) in targets {
            if self.cancel.is_cancelled() {
                self.tracker.log("Pass cancelled; remaining modules untouched");
                return summary;
            }

            match index {
                Some(index) => {
                    if self.drive_module(index).await == ModuleStatus::Installed {
                        summary.installed += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                None => {
                    self.tracker.log(format!("No artifact found for {key}"));
                    summary.missing += 1;
                }
            }
            self.tracker.advance();
        }

        self.tracker.finish_pass();
        self.log_pass_end(&summary);
        self.reconcile().await;
        summary
    }

    /// Re-drive every module currently in `Failed` state. Modules in any
    /// other state are untouched.
    pub async fn retry_failed(&mut self) -> PassSummary {
        let indices: Vec<usize> = self
            .tracker
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ModuleStatus::Failed)
            .map(|(i, _)| i)
            .collect();

        self.tracker.begin_pass(indices.len());
        self.tracker
            .log(format!("Retrying {} failed modules", indices.len()));
        let mut summary = PassSummary::default();

        for index in indices {
            if self.cancel.is_cancelled() {
                self.tracker.log("Pass cancelled; remaining modules untouched");
                return summary;
            }

            if self.drive_module(index).await == ModuleStatus::Installed {
                summary.installed += 1;
            } else {
                summary.failed += 1;
            }
            self.tracker.advance();
        }

        self.tracker.finish_pass();
        self.log_pass_end(&summary);
        self.reconcile().await;
        summary
    }

    /// Overwrite local belief with the server's installed list.
    ///
    /// Every record that matches a listed module becomes `Installed` with
    /// the server's version; the rest keep their status but show
    /// `"(not installed)"`. A failed list query leaves everything untouched.
    pub async fn reconcile(&mut self) {
        let list = match self.service.installed().await {
            Ok(list) => list,
            Err(err) => {
                self.tracker
                    .log(format!("Failed to fetch installed modules: {err}"));
                return;
            }
        };

        for record in self.tracker.records_mut() {
            let matched = list
                .iter()
                .find(|remote| matcher::names_overlap(&record.name, &remote.name));
            match matched {
                Some(remote) => {
                    record.installed_version =
                        remote.version.clone().unwrap_or_else(|| "?".to_string());
                    record.status = ModuleStatus::Installed;
                }
                None => {
                    record.installed_version = VERSION_NOT_INSTALLED.to_string();
                }
            }
        }

        self.tracker.log("Installed versions refreshed from server");
    }

    /// Upload, install, and confirm one module. Every fault is downgraded
    /// to a `Failed` status here; nothing escapes the module boundary.
    async fn drive_module(&mut self, index: usize) -> ModuleStatus {
        let (name, path) = {
            let record = &self.tracker.records()[index];
            (record.name.clone(), record.artifact_path.clone())
        };

        self.tracker.mark_installing(index);
        self.tracker.log(format!("Installing {name}..."));

        match self.try_install(&name, &path).await {
            Ok(version) => {
                self.tracker.mark_installed(index);
                if let Some(version) = version {
                    self.tracker.records_mut()[index].installed_version = version;
                }
                self.tracker.log(format!("Installed {name}"));
                ModuleStatus::Installed
            }
            Err(err) => {
                let reason = err.to_string();
                self.tracker.mark_failed(index, &reason);
                self.tracker.log(format!("[{name}] {reason}"));
                ModuleStatus::Failed
            }
        }
    }

    /// The three protocol steps. Returns the version the server reported,
    /// when it reported one.
    async fn try_install(
        &mut self,
        name: &str,
        artifact: &Path,
    ) -> Result<Option<String>, ServiceError> {
        // 1. Upload: a failure here stops the module, no install attempt.
        let metadata = self.service.upload(artifact).await?;
        self.tracker
            .log(format!("[upload] {name} accepted as '{}'", metadata.name));

        // 2. Install the uploaded metadata echo.
        let request = InstallRequest::from_metadata(&metadata);
        let reply = self.service.install(&request).await?;
        if !reply.indicates_success() {
            return Err(ServiceError::Protocol {
                reason: reply.failure_reason(),
            });
        }
        match reply.message.as_deref() {
            Some(message) => self.tracker.log(format!("[install] {name}: {message}")),
            None => self.tracker.log(format!("[install] {name}: ok")),
        }

        // 3. Confirm the server actually activated it.
        if self.options.confirm_install {
            self.confirm_registered(&metadata.name).await?;
            self.tracker
                .log(format!("[confirm] {} registered on server", metadata.name));
        }

        Ok(reply.module.as_ref().and_then(|m| m.version.clone()))
    }

    /// Poll the installed list until `name` appears without its error flag
    /// raised, the deadline passes, or the pass is cancelled. Timing out
    /// means the module is not considered installed, whatever the install
    /// reply said.
    async fn confirm_registered(&mut self, name: &str) -> Result<(), ServiceError> {
        let timeout_secs = self.options.confirm_timeout.as_secs();
        let deadline = Instant::now() + self.options.confirm_timeout;

        while Instant::now() < deadline {
            match self.service.installed().await {
                Ok(list) => {
                    let registered = list
                        .iter()
                        .any(|m| m.name.eq_ignore_ascii_case(name) && m.in_error != Some(true));
                    if registered {
                        return Ok(());
                    }
                }
                Err(err) => {
                    self.tracker
                        .log(format!("[confirm] installed list unavailable: {err}"));
                }
            }

            tokio::select! {
                _ = sleep(self.options.poll_interval) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        Err(ServiceError::ConfirmationTimeout {
            name: name.to_string(),
            timeout_secs,
        })
    }

    fn log_pass_end(&mut self, summary: &PassSummary) {
        self.tracker.log(format!(
            "Pass finished: {} installed, {} failed, {} skipped, {} without artifacts",
            summary.installed, summary.failed, summary.skipped, summary.missing
        ));
    }
}
