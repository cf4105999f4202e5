//! Poll loop that keeps every target in sync with the remote API

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use csvsync_core::RemoteSubmitter;
use tokio::fs;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::checksum::ChecksumService;
use crate::error::SyncError;
use crate::integrity;
use crate::loader::CsvLoader;
use crate::persist::{NoopPersister, StatePersister};
use crate::status::{Health, Severity, StatusReporter};
use crate::target::{RuntimeState, SyncCondition, SyncTarget, TargetRegistry, LAST_SYNC_FORMAT};

/// Default pause between two ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What one tick did, mostly useful to callers driving ticks by hand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Targets whose content was submitted
    pub synced: Vec<String>,
    /// Targets whose checksum or last sync changed
    pub changed: usize,
}

/// Why a target's pipeline stopped early
#[derive(Debug)]
enum Failure {
    Disabled,
    Error(SyncError),
}

impl Failure {
    fn condition(&self) -> SyncCondition {
        match self {
            Failure::Disabled => SyncCondition::Disabled,
            Failure::Error(e) => e.condition(),
        }
    }
}

impl From<SyncError> for Failure {
    fn from(error: SyncError) -> Self {
        Failure::Error(error)
    }
}

enum Step {
    Unchanged,
    Synced { checksum: String },
}

/// Checks every target once per poll interval and submits changed files.
///
/// Targets are evaluated sequentially. Each target goes through
/// enabled check, file check, checksum compare, load, validate and submit,
/// stopping at the first step that fails. A failure clears the stored
/// checksum so the whole pipeline runs again on the next tick. Status
/// notifications for failures are only sent when the target's condition
/// differs from the last one reported.
pub struct SyncEngine {
    registry: TargetRegistry,
    submitter: Arc<dyn RemoteSubmitter>,
    persister: Arc<dyn StatePersister>,
    reporter: StatusReporter,
    checksum: ChecksumService,
    loader: CsvLoader,
    options: EngineOptions,
    last_reported: HashMap<String, SyncCondition>,
    health: Health,
}

impl SyncEngine {
    pub fn new(
        registry: TargetRegistry,
        submitter: Arc<dyn RemoteSubmitter>,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            registry,
            submitter,
            persister: Arc::new(NoopPersister),
            reporter,
            checksum: ChecksumService::new(),
            loader: CsvLoader::new(),
            options: EngineOptions::default(),
            last_reported: HashMap::new(),
            health: Health::Healthy,
        }
    }

    pub fn with_persister(mut self, persister: Arc<dyn StatePersister>) -> Self {
        self.persister = persister;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// Last condition reported for a target, if any
    pub fn last_condition(&self, name: &str) -> Option<SyncCondition> {
        self.last_reported.get(name).copied()
    }

    /// Spawn the poll loop on the current runtime
    pub fn start(self) -> EngineHandle {
        let stop = CancellationToken::new();
        let task = tokio::spawn(self.run(stop.clone()));
        EngineHandle { stop, task }
    }

    /// Run until `stop` is cancelled.
    ///
    /// Cancellation is observed between ticks only: a tick in progress always
    /// completes, and a cancel during the pause ends the loop without
    /// starting another tick.
    pub async fn run(mut self, stop: CancellationToken) {
        self.announce().await;

        while !stop.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }

        info!("Sync engine stopped");
    }

    /// Startup messages, including the last sync date of every target
    pub async fn announce(&self) {
        info!(interval = ?self.options.poll_interval, "Starting sync engine");
        self.reporter.log("Initialising...");
        self.reporter.log("Reading configuration...");

        for target in self.registry.snapshot().await {
            self.reporter
                .status(target.last_sync.clone(), Severity::Date, target.name.clone());
        }

        self.reporter.log("Started successfully.");
        self.reporter.log("Ready.");
    }

    /// One pass over every target
    #[instrument(skip(self))]
    pub async fn tick(&mut self) -> TickSummary {
        let mut targets = self.registry.snapshot().await;
        let mut summary = TickSummary::default();
        let mut changed_states = Vec::new();

        for target in targets.iter_mut() {
            let before = RuntimeState::from(&*target);

            if self.sync_target(target).await {
                summary.synced.push(target.name.clone());
            }

            let after = RuntimeState::from(&*target);
            if after != before {
                changed_states.push(after);
            }
        }

        summary.changed = changed_states.len();
        if !changed_states.is_empty() {
            self.registry.record_runtime(&changed_states).await;
            let current = self.registry.snapshot().await;
            if let Err(e) = self.persister.persist(&current).await {
                warn!(error = %e, "Failed to persist sync state");
            }
        }

        self.update_health();
        summary
    }

    /// Evaluate one target and report the outcome. Returns true when the
    /// target's content was submitted.
    async fn sync_target(&mut self, target: &mut SyncTarget) -> bool {
        match self.pipeline(target).await {
            Ok(Step::Unchanged) => false,
            Ok(Step::Synced { checksum }) => {
                target.checksum = checksum;
                target.last_sync = Local::now().format(LAST_SYNC_FORMAT).to_string();
                self.report_success(target);
                true
            }
            Err(failure) => {
                target.checksum.clear();
                self.report_failure(target, failure);
                false
            }
        }
    }

    async fn pipeline(&self, target: &SyncTarget) -> Result<Step, Failure> {
        if !target.enabled {
            return Err(Failure::Disabled);
        }

        let is_file = fs::metadata(&target.file_path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file || !target.has_csv_extension() {
            let error = SyncError::file_access(&target.file_path, "not an existing .csv file");
            return Err(error.into());
        }

        let checksum = self.checksum.compute(&target.file_path).await?;
        if !target.checksum.is_empty() && checksum == target.checksum {
            return Ok(Step::Unchanged);
        }

        let dataset = self.loader.load(&target.file_path).await?;
        if let Some(violation) = integrity::find_violation(&dataset, &target.schema) {
            return Err(SyncError::from(violation).into());
        }

        debug!(sync_target = %target.name, rows = dataset.len(), "Submitting changed file");
        self.submitter
            .submit(&dataset, &target.resource_path)
            .await
            .map_err(SyncError::from)?;

        Ok(Step::Synced { checksum })
    }

    fn report_success(&mut self, target: &SyncTarget) {
        info!(sync_target = %target.name, last_sync = %target.last_sync, "File synchronised");

        let condition = SyncCondition::AllOk;
        self.last_reported.insert(target.name.clone(), condition);

        self.reporter
            .log(format!("File \"{}\" synchronised successfully.", target.name));
        self.reporter
            .status(condition.message(), Severity::Success, target.name.clone());
        self.reporter
            .status(target.last_sync.clone(), Severity::Date, target.name.clone());
    }

    fn report_failure(&mut self, target: &SyncTarget, failure: Failure) {
        let condition = failure.condition();

        if self.last_reported.get(&target.name) == Some(&condition) {
            debug!(
                sync_target = %target.name,
                condition = %condition,
                "Condition unchanged, not notifying"
            );
            return;
        }

        match &failure {
            Failure::Disabled => info!(sync_target = %target.name, "Synchronisation disabled"),
            Failure::Error(e) => warn!(
                sync_target = %target.name,
                condition = %condition,
                error = %e,
                "Sync failed"
            ),
        }

        self.reporter.log(failure_log_line(target, &failure));
        self.reporter
            .status(condition.message(), severity_for(condition), target.name.clone());
        self.last_reported.insert(target.name.clone(), condition);
    }

    fn update_health(&mut self) {
        let health = if self.last_reported.values().all(SyncCondition::is_ok) {
            Health::Healthy
        } else {
            Health::Degraded
        };

        if health != self.health {
            info!(?health, "Sync health changed");
            self.health = health;
            self.reporter.health(health);
        }
    }
}

fn severity_for(condition: SyncCondition) -> Severity {
    match condition {
        SyncCondition::AllOk => Severity::Success,
        SyncCondition::Disabled => Severity::Disable,
        SyncCondition::FileNotFound
        | SyncCondition::InvalidIntegrity
        | SyncCondition::RequestError(_) => Severity::Error,
    }
}

fn failure_log_line(target: &SyncTarget, failure: &Failure) -> String {
    match failure {
        Failure::Disabled => format!("Synchronisation of \"{}\" is disabled.", target.name),
        Failure::Error(SyncError::FileAccess { .. }) | Failure::Error(SyncError::Io(_)) => format!(
            "\"{}\" is not a valid file path. Please check it in the settings.",
            target.file_path.display()
        ),
        Failure::Error(SyncError::Decode { message, .. }) => format!(
            "The CSV \"{}\" could not be read: {}",
            target.name, message
        ),
        Failure::Error(SyncError::Integrity { .. }) => format!(
            "The CSV integrity of \"{}\" is invalid. \
             Fields or values may be missing, please check its contents.",
            target.name
        ),
        Failure::Error(SyncError::Submit(e)) => e.to_string(),
    }
}

/// Owner's handle on a running engine
pub struct EngineHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Ask the engine to exit after the tick in progress, if any
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker task to exit
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }

    /// Stop and wait
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.stop();
        self.join().await
    }
}
