/// Notification sink
///
/// The engine reports checkouts, failed checkouts and reclaims here. Delivery
/// is fire-and-forget: failures are logged and never retried.

pub mod templates;

pub use templates::{MessageTemplates, TemplateView};

use crate::{
    account::Account,
    error::{RentalError, RentalResult},
    rental::{ReclaimReason, Rental},
    settings::SystemControl,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Receiver of lifecycle events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn on_checkout_success(&self, account: &Account, rental: &Rental);

    async fn on_checkout_failure(&self, reason: &str, product_name: &str, buyer_name: &str);

    /// Used for voluntary returns, forced returns and expiry alike
    async fn on_reclaim(
        &self,
        rental: &Rental,
        account: &Account,
        new_password: &str,
        reason: ReclaimReason,
    );
}

/// Only writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn on_checkout_success(&self, account: &Account, rental: &Rental) {
        info!(
            login = %account.login,
            rental_id = %rental.id,
            requester = %rental.requester_name,
            end_time = %rental.end_time,
            "Account checked out"
        );
    }

    async fn on_checkout_failure(&self, reason: &str, product_name: &str, buyer_name: &str) {
        warn!(product = %product_name, buyer = %buyer_name, "Checkout failed: {}", reason);
    }

    async fn on_reclaim(
        &self,
        rental: &Rental,
        account: &Account,
        _new_password: &str,
        reason: ReclaimReason,
    ) {
        info!(
            login = %account.login,
            rental_id = %rental.id,
            reason = %reason,
            "Rental reclaimed"
        );
    }
}

/// Format used for `{end_time}`
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%d.%m.%Y %H:%M UTC").to_string()
}

/// Placeholder values describing a rental
fn rental_vars(account: &Account, rental: &Rental) -> Vec<(&'static str, String)> {
    vec![
        ("login", account.login.clone()),
        ("password", account.password.clone()),
        ("account_type", account.account_type.clone()),
        ("duration_hours", rental.duration_hours.to_string()),
        ("end_time", format_time(rental.end_time)),
        ("username", rental.requester_name.clone()),
        ("order_id", rental.order_id.clone().unwrap_or_else(|| "-".to_string())),
    ]
}

/// Message handed to the chat bridge
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub event: &'static str,
    pub text: String,
}

/// Renders templates and POSTs them as JSON to a chat bridge
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
    templates: Arc<MessageTemplates>,
    control: Arc<SystemControl>,
}

impl WebhookNotifier {
    pub fn new(
        url: &str,
        templates: Arc<MessageTemplates>,
        control: Arc<SystemControl>,
    ) -> RentalResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("rental-pool/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RentalError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.to_string(),
            templates,
            control,
        })
    }

    async fn send(&self, message: OutboundMessage) {
        let result = self
            .http_client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            warn!(
                recipient = %message.recipient,
                event = message.event,
                "Failed to deliver notification: {}",
                e
            );
        }
    }

    async fn send_to_admin(&self, event: &'static str, text: String) {
        match self.control.admin_id().await {
            Some(admin_id) => {
                self.send(OutboundMessage {
                    recipient: admin_id,
                    event,
                    text,
                })
                .await
            }
            None => warn!(event, "No administrator configured, notification dropped"),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn on_checkout_success(&self, account: &Account, rental: &Rental) {
        let vars = rental_vars(account, rental);

        let text = self.templates.render(templates::RENTAL_START, &vars).await;
        self.send(OutboundMessage {
            recipient: rental.requester_id.clone(),
            event: "rental_start",
            text,
        })
        .await;

        let text = self.templates.render(templates::ADMIN_RENTAL_START, &vars).await;
        self.send_to_admin("admin_rental_start", text).await;
    }

    async fn on_checkout_failure(&self, reason: &str, product_name: &str, buyer_name: &str) {
        let vars = [
            ("reason", reason.to_string()),
            ("product_name", product_name.to_string()),
            ("username", buyer_name.to_string()),
        ];
        let text = self.templates.render(templates::CHECKOUT_FAILED, &vars).await;
        self.send_to_admin("checkout_failed", text).await;
    }

    async fn on_reclaim(
        &self,
        rental: &Rental,
        account: &Account,
        new_password: &str,
        reason: ReclaimReason,
    ) {
        let mut vars = rental_vars(account, rental);
        vars.push(("new_password", new_password.to_string()));
        vars.push(("reason", reason.to_string()));

        let requester_template = match reason {
            ReclaimReason::Forced => templates::RENTAL_FORCE_END,
            ReclaimReason::Returned | ReclaimReason::Expired => templates::RENTAL_END,
        };
        let text = self.templates.render(requester_template, &vars).await;
        self.send(OutboundMessage {
            recipient: rental.requester_id.clone(),
            event: requester_template,
            text,
        })
        .await;

        let text = self.templates.render(templates::ADMIN_RENTAL_END, &vars).await;
        self.send_to_admin("admin_rental_end", text).await;
    }
}
