/// Credential store
///
/// Pooled accounts, their availability state and password history.

pub mod password;
mod store;

pub use password::generate_strong_password;
pub use store::{CredentialStore, PasswordChange};

use crate::error::{RentalError, RentalResult};
use crate::rental::Rental;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Availability state of a pooled account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Available,
    Rented,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Available => "available",
            AccountStatus::Rented => "rented",
            AccountStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> RentalResult<Self> {
        match s.to_lowercase().as_str() {
            "available" => Ok(AccountStatus::Available),
            "rented" => Ok(AccountStatus::Rented),
            "disabled" => Ok(AccountStatus::Disabled),
            _ => Err(RentalError::Validation(format!("Invalid account status: {}", s))),
        }
    }
}

/// A pooled, credentialed account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub login: String,
    pub password: String,
    pub original_password: String,
    pub account_type: String,
    /// API key for remote password/session control
    #[serde(skip_serializing)]
    pub provider_credential: Option<String>,
    pub status: AccountStatus,
    /// Back-reference to the active rental while `status == Rented`
    pub rental_id: Option<String>,
    /// Insertion order; matching scans accounts in this order
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_available(&self) -> bool {
        self.status == AccountStatus::Available
    }

    pub fn has_provider_credential(&self) -> bool {
        self.provider_credential.is_some()
    }

    /// Account type in its comparison form
    pub fn normalized_type(&self) -> String {
        normalize_type(&self.account_type)
    }
}

/// Normalize a free-text account type for comparison: lower-cased with
/// dots and spaces removed, so "R.E.P.O" and "repo" compare equal
pub fn normalize_type(account_type: &str) -> String {
    account_type
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && *c != ' ')
        .collect()
}

/// Request to add an account to the pool
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub login: String,
    pub password: String,
    #[serde(default = "default_account_type")]
    pub account_type: String,
    #[serde(default)]
    pub provider_credential: Option<String>,
}

fn default_account_type() -> String {
    "standard".to_string()
}

/// Partial update of an account. Absent fields are left untouched; an empty
/// `provider_credential` clears the stored credential.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AccountUpdate {
    #[validate(length(min = 1, max = 256))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub original_password: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub account_type: Option<String>,
    #[validate(length(max = 1024))]
    pub provider_credential: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.password.is_none()
            && self.original_password.is_none()
            && self.account_type.is_none()
            && self.provider_credential.is_none()
    }
}

/// Detailed view of one account, with its active rental if any
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    #[serde(flatten)]
    pub account: Account,
    pub has_provider_credential: bool,
    pub rental: Option<Rental>,
    /// Whole minutes left on the active rental
    pub remaining_minutes: Option<i64>,
}
