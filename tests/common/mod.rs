//! Shared setup for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use rental_pool::{
    account::Account,
    config::{
        AdminConfig, LoggingConfig, NotificationConfig, ProviderConfig, RateLimitConfig,
        ServerConfig, ServiceConfig, StorageConfig, SweeperConfig,
    },
    db,
    notify::Notifier,
    orders::OrderIntake,
    provider::DisabledProvider,
    rental::{ReclaimReason, Rental},
    AppContext,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const ADMIN_TOKEN: &str = "integration-admin-token-0123";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("./data"),
            database: PathBuf::from(":memory:"),
        },
        sweeper: SweeperConfig {
            interval_secs: 60,
            health_interval_secs: 300,
        },
        admin: AdminConfig {
            token: ADMIN_TOKEN.to_string(),
            admin_id: Some("admin-1".to_string()),
        },
        provider: ProviderConfig {
            base_url: None,
            timeout_secs: 5,
        },
        notifications: NotificationConfig { webhook_url: None },
        rate_limit: RateLimitConfig {
            enabled: false,
            order_requests_per_second: 20,
            admin_requests_per_second: 100,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: false,
        },
    }
}

/// Notifier that remembers every event
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn on_checkout_success(&self, account: &Account, rental: &Rental) {
        self.events
            .lock()
            .unwrap()
            .push(format!("checkout:{}:{}", account.login, rental.id));
    }

    async fn on_checkout_failure(&self, reason: &str, product_name: &str, _buyer_name: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failure:{}:{}", product_name, reason));
    }

    async fn on_reclaim(
        &self,
        rental: &Rental,
        _account: &Account,
        _new_password: &str,
        reason: ReclaimReason,
    ) {
        self.events
            .lock()
            .unwrap()
            .push(format!("reclaim:{}:{}", rental.id, reason));
    }
}

/// Context over a fresh in-memory database, notifications recorded
pub async fn setup() -> (AppContext, Arc<RecordingNotifier>) {
    let pool = db::create_memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let mut ctx = AppContext::assemble(test_config(), pool, Arc::new(DisabledProvider))
        .await
        .unwrap();

    let recorder = Arc::new(RecordingNotifier::default());
    ctx.notifier = recorder.clone();
    ctx.intake = Arc::new(OrderIntake::new(
        ctx.manager.clone(),
        ctx.bindings.clone(),
        ctx.control.clone(),
        recorder.clone(),
    ));

    (ctx, recorder)
}
