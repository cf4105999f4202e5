use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DaemonConfig;
use crate::session::Session;
use crate::state::{FileStatePersister, StateFile};
use csvsync::{
    EngineHandle, EngineOptions, Health, Severity, StatusChannel, StatusEvent, SyncEngine,
    TargetRegistry,
};
use csvsync_core::ApiClient;

/// Owns the engine and the background tasks around it
pub struct SyncDaemon {
    config: Arc<RwLock<DaemonConfig>>,
    config_path: PathBuf,
    registry: TargetRegistry,
    client: Arc<ApiClient>,
    shutdown: CancellationToken,
    tasks: HashMap<String, JoinHandle<()>>,
}

impl SyncDaemon {
    pub async fn new(config: DaemonConfig, config_path: PathBuf) -> Result<Self> {
        info!("Initializing sync daemon");

        config.validate()?;

        let session = Session::load(&config.daemon.session_file)
            .await?
            .context("Not logged in. Run `csvsync-daemon login` first")?;
        if session.domain != config.api.domain {
            warn!(
                session_domain = %session.domain,
                configured_domain = %config.api.domain,
                "Session was obtained from a different domain"
            );
        }
        if session.is_expired() {
            warn!("Access token has expired, submissions will be rejected until the next login");
        }

        let client = ApiClient::from_config(&config.api)?;
        client.auth.set_tokens(session.tokens.clone()).await;

        let mut targets = config.sync_targets();
        StateFile::load(&config.daemon.state_file)
            .await?
            .apply(&mut targets);

        info!(
            domain = %config.api.domain,
            user = %session.username,
            targets = targets.len(),
            "Sync daemon initialized"
        );

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            registry: TargetRegistry::new(targets),
            client: Arc::new(client),
            shutdown: CancellationToken::new(),
            tasks: HashMap::new(),
        })
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<()> {
        info!("Starting sync daemon");

        let (reporter, channel) = StatusChannel::new();
        self.start_status_consumer(channel);
        self.start_config_reload_task().await;

        let engine = {
            let config = self.config.read().await;
            SyncEngine::new(self.registry.clone(), self.client.clone(), reporter)
                .with_persister(Arc::new(FileStatePersister::new(&config.daemon.state_file)))
                .with_options(EngineOptions {
                    poll_interval: config.daemon.poll_interval,
                })
        };
        let engine = engine.start();

        info!("Sync daemon started successfully");

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                info!("Shutdown signal received");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
            }
        }

        self.stop(engine).await;
        info!("Sync daemon stopped");
        Ok(())
    }

    async fn stop(&mut self, engine: EngineHandle) {
        // A submission in flight is allowed to finish
        if let Err(e) = engine.shutdown().await {
            error!("Sync engine task failed: {}", e);
        }

        self.shutdown.cancel();
        for (name, handle) in self.tasks.drain() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(task = %name, "Background task failed: {}", e);
                }
            }
        }
    }

    fn start_status_consumer(&mut self, mut channel: StatusChannel) {
        let handle = tokio::spawn(async move {
            while let Some(event) = channel.recv().await {
                log_status_event(&event);
            }
        });

        self.tasks.insert("status_consumer".to_string(), handle);
    }

    async fn start_config_reload_task(&mut self) {
        let config = self.config.clone();
        let config_path = self.config_path.clone();
        let registry = self.registry.clone();
        let shutdown = self.shutdown.clone();
        let period = config.read().await.daemon.config_reload_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if let Err(e) = reload_config(&config, &config_path, &registry).await {
                    error!("Failed to reload configuration: {:#}", e);
                }
            }
        });

        self.tasks.insert("config_reload".to_string(), handle);
    }
}

/// Re-read the configuration file and hand target changes to the engine.
///
/// API and interval settings only take effect after a restart.
pub async fn reload_config(
    config: &RwLock<DaemonConfig>,
    config_path: &Path,
    registry: &TargetRegistry,
) -> Result<bool> {
    debug!(path = %config_path.display(), "Reloading configuration");

    let fresh = DaemonConfig::load(config_path).await?;
    if let Err(e) = fresh.validate() {
        warn!("Configuration validation failed, keeping current settings: {}", e);
        return Ok(false);
    }

    let mut current = config.write().await;
    if current.targets == fresh.targets {
        return Ok(false);
    }

    if current.api != fresh.api || current.daemon != fresh.daemon {
        warn!("API or daemon settings changed; restart the daemon to apply them");
    }

    registry.apply_config(&fresh.sync_targets()).await;
    info!(targets = fresh.targets.len(), "Target configuration reloaded");
    *current = fresh;
    Ok(true)
}

/// Forward an engine notification to the log
pub fn log_status_event(event: &StatusEvent) {
    match event {
        StatusEvent::Log { message } => info!(target: "csvsync_daemon::activity", "{}", message),
        StatusEvent::Status { message, severity, target } => match severity {
            Severity::Error | Severity::Warning => {
                warn!(target: "csvsync_daemon::status", sync_target = %target, "{}", message)
            }
            Severity::Date if message.is_empty() => {
                info!(target: "csvsync_daemon::status", sync_target = %target, "Never synchronised")
            }
            Severity::Date => {
                info!(
                    target: "csvsync_daemon::status",
                    sync_target = %target,
                    "Last synchronised {}",
                    message
                )
            }
            Severity::Success | Severity::Disable => {
                info!(target: "csvsync_daemon::status", sync_target = %target, "{}", message)
            }
        },
        StatusEvent::Health(Health::Healthy) => info!("All targets are in sync"),
        StatusEvent::Health(Health::Degraded) => warn!("At least one target is failing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_requires_session() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DaemonConfig::default();
        config.daemon.session_file = temp_dir.path().join("session.toml");
        config.daemon.state_file = temp_dir.path().join("state.toml");

        let result = SyncDaemon::new(config, temp_dir.path().join("config.toml")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_new_restores_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DaemonConfig::default();
        config.daemon.session_file = temp_dir.path().join("session.toml");
        config.daemon.state_file = temp_dir.path().join("state.toml");

        let tokens = csvsync_core::TokenSet {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_in: None,
            token_type: None,
        };
        Session::new(config.api.domain.clone(), "admin", tokens)
            .save(&config.daemon.session_file)
            .await
            .unwrap();

        let mut synced = csvsync::SyncTarget::socios();
        synced.last_sync = "14/03/2024 09:15".to_string();
        StateFile::from_targets(&[synced])
            .save(&config.daemon.state_file)
            .await
            .unwrap();

        let daemon = SyncDaemon::new(config, temp_dir.path().join("config.toml"))
            .await
            .unwrap();

        let socios = daemon.registry.get("Socios y Ahorros").await.unwrap();
        assert_eq!(socios.last_sync, "14/03/2024 09:15");
        assert_eq!(daemon.client.auth.access_token().await.as_deref(), Some("token"));
    }

    #[tokio::test]
    async fn test_reload_applies_target_changes() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let initial = DaemonConfig::default();
        let registry = TargetRegistry::new(initial.sync_targets());
        let shared = RwLock::new(initial.clone());

        // Unchanged file
        initial.save(&config_path).await.unwrap();
        assert!(!reload_config(&shared, &config_path, &registry).await.unwrap());

        let mut edited = initial.clone();
        edited.target_mut("Prestamos").unwrap().enabled = false;
        edited.targets.push(TargetConfig {
            name: "Aportes".to_string(),
            enabled: true,
            file_path: PathBuf::from("/data/aportes.csv"),
            resource_path: "/aportes/update".to_string(),
            schema: vec![],
        });
        edited.save(&config_path).await.unwrap();

        assert!(reload_config(&shared, &config_path, &registry).await.unwrap());
        assert!(!registry.get("Prestamos").await.unwrap().enabled);
        assert_eq!(registry.len().await, 3);
        assert_eq!(shared.read().await.targets.len(), 3);
    }

    #[tokio::test]
    async fn test_reload_ignores_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let initial = DaemonConfig::default();
        let registry = TargetRegistry::new(initial.sync_targets());
        let shared = RwLock::new(initial.clone());

        let mut broken = initial.clone();
        broken.api.domain = "not a url".to_string();
        broken.target_mut("Prestamos").unwrap().enabled = false;
        broken.save(&config_path).await.unwrap();

        assert!(!reload_config(&shared, &config_path, &registry).await.unwrap());
        assert!(registry.get("Prestamos").await.unwrap().enabled);
    }

    #[test]
    fn test_log_status_event_does_not_panic_without_subscriber() {
        log_status_event(&StatusEvent::Log { message: "Ready.".to_string() });
        log_status_event(&StatusEvent::Status {
            message: String::new(),
            severity: Severity::Date,
            target: "Prestamos".to_string(),
        });
        log_status_event(&StatusEvent::Health(Health::Degraded));
    }
}
