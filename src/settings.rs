/// Operational controls: the sweeper's running flag and the persisted
/// settings record
use crate::{
    db::RentalRepository,
    error::{RentalError, RentalResult},
};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::RwLock;
use tracing::info;

/// Persisted settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Start in the running state after a restart
    pub auto_start: bool,
    /// Chat identity that receives administrator notifications
    pub admin_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_start: true,
            admin_id: None,
        }
    }
}

/// Running flag plus settings, shared by the sweeper, order intake and the
/// admin API
pub struct SystemControl {
    running: AtomicBool,
    settings: RwLock<Settings>,
    repo: Arc<dyn RentalRepository>,
}

impl SystemControl {
    /// Load persisted settings. `default_admin_id` is used until an
    /// administrator identity has been stored.
    pub async fn load(
        repo: Arc<dyn RentalRepository>,
        default_admin_id: Option<String>,
    ) -> RentalResult<Self> {
        let mut settings = repo.load_settings().await?.unwrap_or_default();
        if settings.admin_id.is_none() {
            settings.admin_id = default_admin_id;
        }

        info!(
            auto_start = settings.auto_start,
            "Loaded settings, system {}",
            if settings.auto_start { "running" } else { "stopped" }
        );

        Ok(Self {
            running: AtomicBool::new(settings.auto_start),
            settings: RwLock::new(settings),
            repo,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resume sweeping and order intake
    pub fn start(&self) -> RentalResult<()> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RentalError::Conflict("System is already running".to_string()))?;

        info!("Rental system started");
        Ok(())
    }

    /// Pause sweeping and order intake
    pub fn stop(&self) -> RentalResult<()> {
        self.running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RentalError::Conflict("System is already stopped".to_string()))?;

        info!("Rental system stopped");
        Ok(())
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn admin_id(&self) -> Option<String> {
        self.settings.read().await.admin_id.clone()
    }

    pub async fn set_auto_start(&self, auto_start: bool) -> RentalResult<Settings> {
        self.update(|s| s.auto_start = auto_start).await
    }

    pub async fn set_admin_id(&self, admin_id: &str) -> RentalResult<Settings> {
        let admin_id = admin_id.trim();
        if admin_id.is_empty() {
            return Err(RentalError::Validation("Admin id cannot be empty".to_string()));
        }

        let admin_id = admin_id.to_string();
        self.update(move |s| s.admin_id = Some(admin_id)).await
    }

    async fn update<F>(&self, apply: F) -> RentalResult<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.settings.write().await;
        let mut updated = guard.clone();
        apply(&mut updated);

        self.repo.save_settings(&updated).await?;
        *guard = updated.clone();

        info!(
            auto_start = updated.auto_start,
            admin_id = ?updated.admin_id,
            "Settings updated"
        );
        Ok(updated)
    }
}
