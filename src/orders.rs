/// Marketplace order intake
use crate::{
    binding::BindingResolver,
    manager::{CheckoutRequest, RentalManager},
    metrics,
    notify::Notifier,
    settings::SystemControl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// One purchase reported by the marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub product_name: String,
    pub buyer_id: String,
    pub buyer_name: String,
    pub order_id: String,
}

impl OrderEvent {
    /// Build an event from a marketplace description of the form
    /// `"Name, Category, Subcategory"`; only the name is kept
    pub fn from_description(
        description: &str,
        buyer_id: &str,
        buyer_name: &str,
        order_id: &str,
    ) -> Option<Self> {
        let product_name = description.split(',').next().unwrap_or_default().trim();
        if product_name.is_empty() {
            return None;
        }

        Some(Self {
            product_name: product_name.to_string(),
            buyer_id: buyer_id.trim().to_string(),
            buyer_name: buyer_name.trim().to_string(),
            order_id: order_id.trim().to_string(),
        })
    }
}

/// What happened to an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    /// System stopped or product not bound
    Ignored { reason: String },
    /// Buyer data missing
    Rejected { reason: String },
    Fulfilled { rental_id: String, login: String },
    /// Checkout failed; the administrator was notified
    Failed { reason: String },
}

impl OrderOutcome {
    fn label(&self) -> &'static str {
        match self {
            OrderOutcome::Ignored { .. } => "ignored",
            OrderOutcome::Rejected { .. } => "rejected",
            OrderOutcome::Fulfilled { .. } => "fulfilled",
            OrderOutcome::Failed { .. } => "failed",
        }
    }
}

/// Turns order events into checkouts
pub struct OrderIntake {
    manager: Arc<RentalManager>,
    bindings: Arc<BindingResolver>,
    control: Arc<SystemControl>,
    notifier: Arc<dyn Notifier>,
}

impl OrderIntake {
    pub fn new(
        manager: Arc<RentalManager>,
        bindings: Arc<BindingResolver>,
        control: Arc<SystemControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            manager,
            bindings,
            control,
            notifier,
        }
    }

    /// Resolve the product binding and check out an account for the buyer.
    /// Duplicate events are not detected.
    pub async fn handle_order(&self, event: OrderEvent) -> OrderOutcome {
        let outcome = self.process(&event).await;
        metrics::record_order(outcome.label());
        outcome
    }

    async fn process(&self, event: &OrderEvent) -> OrderOutcome {
        if !self.control.is_running() {
            info!(order_id = %event.order_id, "System stopped, order ignored");
            return OrderOutcome::Ignored {
                reason: "system is stopped".to_string(),
            };
        }

        let policy = match self.bindings.resolve(&event.product_name).await {
            Some(policy) => policy,
            None => {
                info!(
                    order_id = %event.order_id,
                    product = %event.product_name,
                    "No binding for product, order ignored"
                );
                return OrderOutcome::Ignored {
                    reason: format!("no binding for product {}", event.product_name),
                };
            }
        };

        if event.buyer_id.is_empty() || event.buyer_name.is_empty() {
            error!(order_id = %event.order_id, "Order is missing buyer data");
            return OrderOutcome::Rejected {
                reason: "buyer id and name are required".to_string(),
            };
        }

        info!(
            order_id = %event.order_id,
            product = %event.product_name,
            account_type = %policy.account_type,
            duration_hours = policy.duration_hours,
            "Processing order"
        );

        let request = CheckoutRequest {
            requester_id: event.buyer_id.clone(),
            requester_name: event.buyer_name.clone(),
            duration_hours: policy.duration_hours,
            account_type: Some(policy.account_type),
            order_id: Some(event.order_id.clone()).filter(|id| !id.is_empty()),
            specific_account: None,
        };

        match self.manager.checkout(request).await {
            Ok(checkout) => {
                self.notifier
                    .on_checkout_success(&checkout.account, &checkout.rental)
                    .await;
                OrderOutcome::Fulfilled {
                    rental_id: checkout.rental.id,
                    login: checkout.account.login,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(order_id = %event.order_id, "Checkout for order failed: {}", reason);
                self.notifier
                    .on_checkout_failure(&reason, &event.product_name, &event.buyer_name)
                    .await;
                OrderOutcome::Failed { reason }
            }
        }
    }
}
