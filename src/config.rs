/// Configuration management for the rental pool service
use crate::error::{RentalError, RentalResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub sweeper: SweeperConfig,
    pub admin: AdminConfig,
    pub provider: ProviderConfig,
    pub notifications: NotificationConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Background job cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between expiry sweeps
    pub interval_secs: u64,
    /// Seconds between database health checks
    pub health_interval_secs: u64,
}

/// Single administrator identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token required on every /admin route
    pub token: String,
    /// Chat identity that receives administrator notifications until settings override it
    pub admin_id: Option<String>,
}

/// External account provider (password change / session revocation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider bridge; remote calls are skipped when absent
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

/// Notification sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Chat bridge webhook; notifications are only logged when absent
    pub webhook_url: Option<String>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub order_requests_per_second: u32,
    pub admin_requests_per_second: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> RentalResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("RENTAL_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("RENTAL_PORT")
            .unwrap_or_else(|_| "3080".to_string())
            .parse()
            .map_err(|_| RentalError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("RENTAL_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("RENTAL_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("rental.sqlite"));

        let interval_secs = env::var("RENTAL_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| RentalError::Validation("Invalid sweep interval".to_string()))?;
        let health_interval_secs = env::var("RENTAL_HEALTH_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        let token = env::var("RENTAL_ADMIN_TOKEN")
            .map_err(|_| RentalError::Validation("Admin token required".to_string()))?;
        let admin_id = env::var("RENTAL_ADMIN_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let provider_base_url = env::var("RENTAL_PROVIDER_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let provider_timeout_secs = env::var("RENTAL_PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let webhook_url = env::var("RENTAL_NOTIFY_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let rate_limit_enabled = env::var("RENTAL_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let order_rps = env::var("RENTAL_ORDER_RPS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);
        let admin_rps = env::var("RENTAL_ADMIN_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                data_directory,
                database,
            },
            sweeper: SweeperConfig {
                interval_secs,
                health_interval_secs,
            },
            admin: AdminConfig { token, admin_id },
            provider: ProviderConfig {
                base_url: provider_base_url,
                timeout_secs: provider_timeout_secs,
            },
            notifications: NotificationConfig { webhook_url },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                order_requests_per_second: order_rps,
                admin_requests_per_second: admin_rps,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> RentalResult<()> {
        if self.service.hostname.is_empty() {
            return Err(RentalError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.admin.token.len() < 16 {
            return Err(RentalError::Validation(
                "Admin token must be at least 16 characters".to_string(),
            ));
        }

        if self.sweeper.interval_secs == 0 {
            return Err(RentalError::Validation(
                "Sweep interval must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.hostname, self.service.port)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 3080,
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
            token: "test-admin-token-0123456789".to_string(),
            admin_id: Some("admin-1".to_string()),
        },
        provider: ProviderConfig {
            base_url: None,
            timeout_secs: 10,
        },
        notifications: NotificationConfig { webhook_url: None },
        rate_limit: RateLimitConfig {
            enabled: false,
            order_requests_per_second: 20,
            admin_requests_per_second: 100,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            json: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_token() {
        let mut config = test_config();
        config.admin.token = "short".to_string();
        assert!(matches!(config.validate(), Err(RentalError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = test_config();
        config.sweeper.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(test_config().bind_address(), "127.0.0.1:3080");
    }
}
