/// Product bindings: external product name -> (account type, duration)
use crate::{
    db::RentalRepository,
    error::{RentalError, RentalResult},
    rental::{check_duration_hours, MAX_RENTAL_HOURS},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use validator::Validate;

/// A stored binding. `id` is assigned once at creation and survives
/// overwrites of the same product name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub id: i64,
    pub product_name: String,
    pub account_type: String,
    pub duration_hours: i64,
    pub created_at: DateTime<Utc>,
}

/// Checkout policy for a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingPolicy {
    pub account_type: String,
    pub duration_hours: i64,
}

/// Request body for creating a binding
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBinding {
    #[validate(length(min = 1, max = 256))]
    pub product_name: String,
    #[validate(length(min = 1, max = 64))]
    pub account_type: String,
    #[validate(range(min = 1, max = MAX_RENTAL_HOURS))]
    pub duration_hours: i64,
}

/// Lookup table consulted when an order arrives
pub struct BindingResolver {
    bindings: RwLock<HashMap<String, Binding>>,
    repo: Arc<dyn RentalRepository>,
}

impl BindingResolver {
    pub async fn load(repo: Arc<dyn RentalRepository>) -> RentalResult<Self> {
        let bindings = repo.load_bindings().await?;
        info!("Loaded {} product bindings", bindings.len());

        Ok(Self {
            bindings: RwLock::new(
                bindings
                    .into_iter()
                    .map(|b| (b.product_name.clone(), b))
                    .collect(),
            ),
            repo,
        })
    }

    /// Exact string equality only, no normalization
    pub async fn resolve(&self, product_name: &str) -> Option<BindingPolicy> {
        self.bindings
            .read()
            .await
            .get(product_name)
            .map(|b| BindingPolicy {
                account_type: b.account_type.clone(),
                duration_hours: b.duration_hours,
            })
    }

    pub async fn contains(&self, product_name: &str) -> bool {
        self.bindings.read().await.contains_key(product_name)
    }

    /// Insert or overwrite
    pub async fn bind(
        &self,
        product_name: &str,
        account_type: &str,
        duration_hours: i64,
    ) -> RentalResult<Binding> {
        let product_name = product_name.trim();
        let account_type = account_type.trim();
        if product_name.is_empty() {
            return Err(RentalError::Validation("Product name cannot be empty".to_string()));
        }
        if account_type.is_empty() {
            return Err(RentalError::Validation("Account type cannot be empty".to_string()));
        }
        check_duration_hours(duration_hours)?;

        let mut bindings = self.bindings.write().await;
        let binding = self
            .repo
            .save_binding(product_name, account_type, duration_hours, Utc::now())
            .await?;
        bindings.insert(binding.product_name.clone(), binding.clone());

        info!(
            binding_id = binding.id,
            product = %binding.product_name,
            account_type = %binding.account_type,
            duration_hours,
            "Product bound"
        );
        Ok(binding)
    }

    /// Remove the binding with this exact product name
    pub async fn unbind(&self, product_name: &str) -> RentalResult<Binding> {
        let mut bindings = self.bindings.write().await;
        let id = bindings
            .get(product_name)
            .map(|b| b.id)
            .ok_or_else(|| RentalError::NotFound(format!("Binding for {}", product_name)))?;

        self.remove_locked(&mut bindings, product_name, id).await
    }

    /// Remove by stable id
    pub async fn unbind_by_id(&self, id: i64) -> RentalResult<Binding> {
        let mut bindings = self.bindings.write().await;
        let product_name = bindings
            .values()
            .find(|b| b.id == id)
            .map(|b| b.product_name.clone())
            .ok_or_else(|| RentalError::NotFound(format!("Binding {}", id)))?;

        self.remove_locked(&mut bindings, &product_name, id).await
    }

    async fn remove_locked(
        &self,
        bindings: &mut HashMap<String, Binding>,
        product_name: &str,
        id: i64,
    ) -> RentalResult<Binding> {
        self.repo.delete_binding(id).await?;
        let removed = bindings
            .remove(product_name)
            .ok_or_else(|| RentalError::NotFound(format!("Binding {}", id)))?;

        info!(binding_id = id, product = %product_name, "Product unbound");
        Ok(removed)
    }

    /// Looser lookup for the unbind command: exact name, then prefix, then
    /// case-insensitive substring. Candidates are scanned in id order.
    pub async fn find_for_unbind(&self, query: &str) -> Option<Binding> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        let bindings = self.bindings.read().await;
        if let Some(binding) = bindings.get(query) {
            return Some(binding.clone());
        }

        let mut candidates: Vec<&Binding> = bindings.values().collect();
        candidates.sort_by_key(|b| b.id);

        let lowered = query.to_lowercase();
        candidates
            .iter()
            .find(|b| b.product_name.starts_with(query))
            .or_else(|| {
                candidates
                    .iter()
                    .find(|b| b.product_name.to_lowercase().contains(&lowered))
            })
            .map(|b| (*b).clone())
    }

    /// All bindings, grouped by type then duration
    pub async fn list(&self) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self.bindings.read().await.values().cloned().collect();
        bindings.sort_by(|a, b| {
            a.account_type
                .cmp(&b.account_type)
                .then(a.duration_hours.cmp(&b.duration_hours))
                .then(a.id.cmp(&b.id))
        });
        bindings
    }

    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }
}
