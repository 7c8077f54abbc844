/// Application context and dependency injection
use crate::{
    binding::BindingResolver,
    config::ServerConfig,
    db::{self, RentalRepository, SqliteRepository},
    error::{RentalError, RentalResult},
    manager::RentalManager,
    notify::{LogNotifier, MessageTemplates, Notifier, WebhookNotifier},
    orders::OrderIntake,
    provider::{AccountProvider, DisabledProvider, HttpProvider},
    rate_limit::RateLimiter,
    settings::SystemControl,
    wizard::WizardSessions,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub manager: Arc<RentalManager>,
    pub bindings: Arc<BindingResolver>,
    pub control: Arc<SystemControl>,
    pub templates: Arc<MessageTemplates>,
    pub notifier: Arc<dyn Notifier>,
    pub intake: Arc<OrderIntake>,
    pub wizards: Arc<WizardSessions>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> RentalResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    RentalError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let provider: Arc<dyn AccountProvider> = match &config.provider.base_url {
            Some(url) => {
                info!("Account provider at {}", url);
                Arc::new(HttpProvider::new(
                    url,
                    Duration::from_secs(config.provider.timeout_secs),
                )?)
            }
            None => {
                info!("No account provider configured, remote password changes are skipped");
                Arc::new(DisabledProvider)
            }
        };

        Self::assemble(config, pool, provider).await
    }

    /// Wire every service on top of a migrated pool
    pub async fn assemble(
        config: ServerConfig,
        pool: SqlitePool,
        provider: Arc<dyn AccountProvider>,
    ) -> RentalResult<Self> {
        let repo: Arc<dyn RentalRepository> = Arc::new(SqliteRepository::new(pool.clone()));

        let manager = Arc::new(RentalManager::load(repo.clone(), provider).await?);
        let bindings = Arc::new(BindingResolver::load(repo.clone()).await?);
        let control = Arc::new(SystemControl::load(repo.clone(), config.admin.admin_id.clone()).await?);
        let templates = Arc::new(MessageTemplates::load(repo).await?);

        let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
            Some(url) => {
                info!("Notifications delivered to {}", url);
                Arc::new(WebhookNotifier::new(url, templates.clone(), control.clone())?)
            }
            None => Arc::new(LogNotifier),
        };

        let intake = Arc::new(OrderIntake::new(
            manager.clone(),
            bindings.clone(),
            control.clone(),
            notifier.clone(),
        ));
        let wizards = Arc::new(WizardSessions::new(
            manager.clone(),
            bindings.clone(),
            templates.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            manager,
            bindings,
            control,
            templates,
            notifier,
            intake,
            wizards,
            rate_limiter,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!("http://{}", self.config.bind_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[tokio::test]
    async fn test_new_creates_database_and_loads_services() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.storage.data_directory = dir.path().join("data");
        config.storage.database = dir.path().join("data").join("rental.sqlite");

        let ctx = AppContext::new(config).await.unwrap();
        assert!(ctx.config.storage.database.exists());
        assert!(ctx.control.is_running());
        assert_eq!(ctx.control.admin_id().await.as_deref(), Some("admin-1"));
        assert!(ctx.manager.list_accounts().await.is_empty());
        assert_eq!(ctx.service_url(), "http://127.0.0.1:3080");
    }

    #[tokio::test]
    async fn test_new_rejects_short_admin_token() {
        let mut config = test_config();
        config.admin.token = "short".to_string();
        assert!(matches!(
            AppContext::new(config).await,
            Err(RentalError::Validation(_))
        ));
    }
}
