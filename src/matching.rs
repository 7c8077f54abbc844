/// Account selection for a requested type
use crate::account::{normalize_type, Account};
use crate::error::{RentalError, RentalResult};
use serde::Serialize;

/// Which rule selected the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// No type requested, first available account
    Any,
    /// Case-insensitive equality
    Exact,
    /// Equality after stripping dots and spaces
    Normalized,
}

/// Pick one available account. `accounts` must be in store iteration order;
/// the first hit of the highest tier wins.
pub fn select_account<'a>(
    accounts: &[&'a Account],
    requested_type: Option<&str>,
) -> RentalResult<(&'a Account, MatchTier)> {
    let available = || accounts.iter().copied().filter(|a| a.is_available());

    let requested = match requested_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => {
            return available()
                .next()
                .map(|a| (a, MatchTier::Any))
                .ok_or_else(|| RentalError::NoAccountAvailable("any".to_string()));
        }
    };

    let lowered = requested.to_lowercase();
    if let Some(account) = available().find(|a| a.account_type.to_lowercase() == lowered) {
        return Ok((account, MatchTier::Exact));
    }

    let normalized = normalize_type(requested);
    if let Some(account) = available().find(|a| a.normalized_type() == normalized) {
        return Ok((account, MatchTier::Normalized));
    }

    Err(RentalError::NoAccountAvailable(requested.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use chrono::Utc;

    fn account(login: &str, account_type: &str, status: AccountStatus, position: i64) -> Account {
        Account {
            login: login.to_string(),
            password: "pw".to_string(),
            original_password: "pw".to_string(),
            account_type: account_type.to_string(),
            provider_credential: None,
            status,
            rental_id: None,
            position,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_type_takes_first_available() {
        let a = account("a", "pubg", AccountStatus::Rented, 1);
        let b = account("b", "csgo", AccountStatus::Available, 2);
        let c = account("c", "pubg", AccountStatus::Available, 3);

        let (picked, tier) = select_account(&[&a, &b, &c], None).unwrap();
        assert_eq!(picked.login, "b");
        assert_eq!(tier, MatchTier::Any);
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let a = account("a", "PUBG", AccountStatus::Available, 1);

        let (picked, tier) = select_account(&[&a], Some("pubg")).unwrap();
        assert_eq!(picked.login, "a");
        assert_eq!(tier, MatchTier::Exact);
    }

    #[test]
    fn test_normalized_fallback() {
        let a = account("a", "R.E.P.O", AccountStatus::Available, 1);

        let (picked, tier) = select_account(&[&a], Some("repo")).unwrap();
        assert_eq!(picked.login, "a");
        assert_eq!(tier, MatchTier::Normalized);
    }

    #[test]
    fn test_exact_tier_beats_earlier_normalized_candidate() {
        let a = account("a", "R.E.P.O", AccountStatus::Available, 1);
        let b = account("b", "repo", AccountStatus::Available, 2);

        let (picked, tier) = select_account(&[&a, &b], Some("Repo")).unwrap();
        assert_eq!(picked.login, "b");
        assert_eq!(tier, MatchTier::Exact);
    }

    #[test]
    fn test_disabled_and_rented_are_skipped() {
        let a = account("a", "csgo", AccountStatus::Disabled, 1);
        let b = account("b", "csgo", AccountStatus::Rented, 2);
        let c = account("c", "pubg", AccountStatus::Available, 3);

        let err = select_account(&[&a, &b, &c], Some("csgo")).unwrap_err();
        assert!(matches!(err, RentalError::NoAccountAvailable(t) if t == "csgo"));
    }

    #[test]
    fn test_empty_pool() {
        assert!(matches!(
            select_account(&[], None),
            Err(RentalError::NoAccountAvailable(_))
        ));
    }
}
