/// Rental ledger
///
/// Time-bounded claims binding a requester to an account. Rentals are never
/// deleted: closing one only marks it inactive.

mod ledger;

pub use ledger::RentalLedger;

use crate::error::{RentalError, RentalResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest duration accepted for one checkout or binding (ten years)
pub const MAX_RENTAL_HOURS: i64 = 24 * 365 * 10;

/// Reject durations outside `1..=MAX_RENTAL_HOURS`
pub fn check_duration_hours(hours: i64) -> RentalResult<()> {
    if hours <= 0 {
        return Err(RentalError::Validation(
            "Rental duration must be a positive number of hours".to_string(),
        ));
    }
    if hours > MAX_RENTAL_HOURS {
        return Err(RentalError::Validation(format!(
            "Rental duration cannot exceed {} hours",
            MAX_RENTAL_HOURS
        )));
    }
    Ok(())
}

/// `start + hours`, or a validation error when the result is not representable
pub(crate) fn add_hours(start: DateTime<Utc>, hours: i64) -> RentalResult<DateTime<Utc>> {
    Duration::try_hours(hours)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| RentalError::Validation(format!("{} hours is out of range", hours)))
}

/// A time-bounded claim on an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rental {
    pub id: String,
    pub account_login: String,
    pub requester_id: String,
    pub requester_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_hours: i64,
    pub end_time: DateTime<Utc>,
    pub order_id: Option<String>,
    pub is_active: bool,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Rental {
    /// Start a rental at `start_time`; `end_time` is derived from the duration
    pub fn new(
        account_login: &str,
        requester_id: &str,
        requester_name: &str,
        duration_hours: i64,
        order_id: Option<String>,
        start_time: DateTime<Utc>,
    ) -> RentalResult<Self> {
        check_duration_hours(duration_hours)?;
        let end_time = add_hours(start_time, duration_hours)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            account_login: account_login.to_string(),
            requester_id: requester_id.to_string(),
            requester_name: requester_name.to_string(),
            start_time,
            duration_hours,
            end_time,
            order_id,
            is_active: true,
            closed_at: None,
        })
    }

    /// Expiry is detected, never prevented
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Time left, zero once closed or past the end
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if !self.is_active || now >= self.end_time {
            return Duration::zero();
        }
        self.end_time - now
    }
}

/// Why a rental ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimReason {
    /// Requester gave the account back
    Returned,
    /// Administrator ended it early
    Forced,
    /// The sweeper found it past its end time
    Expired,
}

impl ReclaimReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimReason::Returned => "returned",
            ReclaimReason::Forced => "forced",
            ReclaimReason::Expired => "expired",
        }
    }
}

impl fmt::Display for ReclaimReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
