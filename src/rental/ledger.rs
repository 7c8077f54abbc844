use super::{add_hours, Rental};
use crate::error::{RentalError, RentalResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// All rentals ever opened, keyed by id
#[derive(Debug, Default)]
pub struct RentalLedger {
    rentals: HashMap<String, Rental>,
}

impl RentalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rentals(rentals: Vec<Rental>) -> Self {
        Self {
            rentals: rentals.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, rental_id: &str) -> Option<&Rental> {
        self.rentals.get(rental_id)
    }

    pub fn len(&self) -> usize {
        self.rentals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rentals.is_empty()
    }

    /// Put a record back verbatim (used to undo a failed write-through)
    pub(crate) fn restore(&mut self, rental_id: &str, previous: Option<Rental>) {
        match previous {
            Some(rental) => {
                self.rentals.insert(rental_id.to_string(), rental);
            }
            None => {
                self.rentals.remove(rental_id);
            }
        }
    }

    /// Open a rental. Overlap is checked by the caller, only inputs are
    /// validated here. Nothing is recorded when validation fails.
    pub fn open(
        &mut self,
        account_login: &str,
        requester_id: &str,
        requester_name: &str,
        duration_hours: i64,
        order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> RentalResult<Rental> {
        if requester_id.trim().is_empty() {
            return Err(RentalError::Validation("Requester id cannot be empty".to_string()));
        }

        let rental = Rental::new(
            account_login,
            requester_id,
            requester_name,
            duration_hours,
            order_id,
            now,
        )?;
        self.rentals.insert(rental.id.clone(), rental.clone());
        Ok(rental)
    }

    fn active_mut(&mut self, rental_id: &str) -> RentalResult<&mut Rental> {
        let rental = self
            .rentals
            .get_mut(rental_id)
            .ok_or_else(|| RentalError::NotFound(format!("Rental {}", rental_id)))?;

        if !rental.is_active {
            return Err(RentalError::AlreadyClosed(rental_id.to_string()));
        }
        Ok(rental)
    }

    /// Mark a rental inactive; it never becomes active again
    pub fn close(&mut self, rental_id: &str, now: DateTime<Utc>) -> RentalResult<Rental> {
        let rental = self.active_mut(rental_id)?;
        rental.is_active = false;
        rental.closed_at = Some(now);
        Ok(rental.clone())
    }

    /// Push the end time forward. No upper bound beyond what the clock can
    /// represent; both new values are computed before the record changes.
    pub fn extend(&mut self, rental_id: &str, additional_hours: i64) -> RentalResult<Rental> {
        if additional_hours <= 0 {
            return Err(RentalError::Validation(
                "Extension must be a positive number of hours".to_string(),
            ));
        }

        let rental = self.active_mut(rental_id)?;
        let duration_hours = rental
            .duration_hours
            .checked_add(additional_hours)
            .ok_or_else(|| {
                RentalError::Validation(format!("{} hours is out of range", additional_hours))
            })?;
        let end_time = add_hours(rental.end_time, additional_hours)?;

        rental.duration_hours = duration_hours;
        rental.end_time = end_time;
        Ok(rental.clone())
    }

    /// Active rentals with `end_time <= now`, soonest first. Evaluated on
    /// every call.
    pub fn list_expired(&self, now: DateTime<Utc>) -> Vec<Rental> {
        let mut expired: Vec<Rental> = self
            .rentals
            .values()
            .filter(|r| r.is_active && r.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.end_time);
        expired
    }

    /// Active rentals, soonest expiry first
    pub fn active(&self) -> Vec<&Rental> {
        let mut active: Vec<&Rental> = self.rentals.values().filter(|r| r.is_active).collect();
        active.sort_by_key(|r| r.end_time);
        active
    }

    /// Full history, newest first
    pub fn all(&self) -> Vec<&Rental> {
        let mut all: Vec<&Rental> = self.rentals.values().collect();
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        all
    }

    /// The active rental bound to `login`, if any
    pub fn active_for(&self, login: &str) -> Option<&Rental> {
        self.rentals
            .values()
            .find(|r| r.is_active && r.account_login == login)
    }
}
