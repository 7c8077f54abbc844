/// In-memory credential store guarded by the rental manager's lock
use super::{normalize_type, Account, AccountStatus, AccountUpdate, NewAccount};
use crate::account::password::generate_strong_password;
use crate::error::{RentalError, RentalResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A committed local password change that still has to be pushed to the
/// external provider
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub login: String,
    pub old_password: String,
    pub new_password: String,
    pub provider_credential: Option<String>,
}

/// Trimmed type; all spellings of REPO share one canonical type
fn canonical_type(account_type: &str) -> String {
    let account_type = account_type.trim();
    if normalize_type(account_type) == "repo" {
        "repo".to_string()
    } else {
        account_type.to_string()
    }
}

/// Accounts keyed by login, iterated in insertion order
#[derive(Debug, Default)]
pub struct CredentialStore {
    accounts: HashMap<String, Account>,
    next_position: i64,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from persisted records
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let next_position = accounts.iter().map(|a| a.position).max().unwrap_or(0);
        Self {
            accounts: accounts.into_iter().map(|a| (a.login.clone(), a)).collect(),
            next_position,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn contains(&self, login: &str) -> bool {
        self.accounts.contains_key(login)
    }

    pub fn get(&self, login: &str) -> Option<&Account> {
        self.accounts.get(login)
    }

    fn get_mut(&mut self, login: &str) -> RentalResult<&mut Account> {
        self.accounts
            .get_mut(login)
            .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))
    }

    /// All accounts in insertion order
    pub fn ordered(&self) -> Vec<&Account> {
        let mut accounts: Vec<&Account> = self.accounts.values().collect();
        accounts.sort_by_key(|a| a.position);
        accounts
    }

    /// Put a record back verbatim (used to undo a failed write-through)
    pub(crate) fn restore(&mut self, login: &str, previous: Option<Account>) {
        match previous {
            Some(account) => {
                self.accounts.insert(login.to_string(), account);
            }
            None => {
                self.accounts.remove(login);
            }
        }
    }

    /// Create an available account; fails if the login is taken
    pub fn add(&mut self, new: NewAccount, now: DateTime<Utc>) -> RentalResult<Account> {
        let login = new.login.trim().to_string();
        if login.is_empty() {
            return Err(RentalError::Validation("Login cannot be empty".to_string()));
        }
        if new.password.is_empty() {
            return Err(RentalError::Validation("Password cannot be empty".to_string()));
        }
        if self.accounts.contains_key(&login) {
            return Err(RentalError::DuplicateLogin(login));
        }

        let mut account_type = canonical_type(&new.account_type);
        if account_type.is_empty() {
            account_type = "standard".to_string();
        }

        self.next_position += 1;
        let account = Account {
            login: login.clone(),
            password: new.password.clone(),
            original_password: new.password,
            account_type,
            provider_credential: new.provider_credential.filter(|c| !c.trim().is_empty()),
            status: AccountStatus::Available,
            rental_id: None,
            position: self.next_position,
            created_at: now,
        };

        self.accounts.insert(login, account.clone());
        Ok(account)
    }

    /// Permanently delete an account that is not rented
    pub fn remove(&mut self, login: &str) -> RentalResult<Account> {
        let account = self
            .accounts
            .get(login)
            .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))?;

        if account.status == AccountStatus::Rented {
            return Err(RentalError::StillRented(login.to_string()));
        }

        self.accounts
            .remove(login)
            .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))
    }

    /// Merge the supplied fields. `original_password` only changes when it is
    /// supplied explicitly.
    pub fn update(&mut self, login: &str, update: AccountUpdate) -> RentalResult<Account> {
        if update.password.as_deref() == Some("") {
            return Err(RentalError::Validation("Password cannot be empty".to_string()));
        }
        if update.original_password.as_deref() == Some("") {
            return Err(RentalError::Validation(
                "Original password cannot be empty".to_string(),
            ));
        }

        let account = self.get_mut(login)?;

        if let Some(password) = update.password {
            account.password = password;
        }
        if let Some(original) = update.original_password {
            account.original_password = original;
        }
        if let Some(account_type) = update.account_type {
            let account_type = canonical_type(&account_type);
            if !account_type.is_empty() {
                account.account_type = account_type;
            }
        }
        if let Some(credential) = update.provider_credential {
            account.provider_credential = if credential.trim().is_empty() {
                None
            } else {
                Some(credential)
            };
        }

        Ok(account.clone())
    }

    /// Replace the current password, generating a strong one when none is given
    pub fn rotate_password(
        &mut self,
        login: &str,
        new_password: Option<String>,
    ) -> RentalResult<PasswordChange> {
        let new_password = match new_password {
            Some(p) if p.is_empty() => {
                return Err(RentalError::Validation("Password cannot be empty".to_string()))
            }
            Some(p) => p,
            None => generate_strong_password(),
        };

        let account = self.get_mut(login)?;
        let old_password = std::mem::replace(&mut account.password, new_password.clone());

        Ok(PasswordChange {
            login: login.to_string(),
            old_password,
            new_password,
            provider_credential: account.provider_credential.clone(),
        })
    }

    /// Restore the original password; refused while rented
    pub fn reset_to_original(&mut self, login: &str) -> RentalResult<PasswordChange> {
        let account = self.get_mut(login)?;
        if account.status == AccountStatus::Rented {
            return Err(RentalError::CurrentlyRented(login.to_string()));
        }

        let original = account.original_password.clone();
        let old_password = std::mem::replace(&mut account.password, original.clone());

        Ok(PasswordChange {
            login: login.to_string(),
            old_password,
            new_password: original,
            provider_credential: account.provider_credential.clone(),
        })
    }

    /// Bind an available account to a rental
    pub fn mark_rented(&mut self, login: &str, rental_id: &str) -> RentalResult<Account> {
        let account = self.get_mut(login)?;
        if account.status != AccountStatus::Available {
            return Err(RentalError::AccountUnavailable(login.to_string()));
        }

        account.status = AccountStatus::Rented;
        account.rental_id = Some(rental_id.to_string());
        Ok(account.clone())
    }

    /// Local half of session revocation: the account goes back to the pool
    /// whatever the provider later says
    pub fn release(&mut self, login: &str) -> RentalResult<Account> {
        let account = self.get_mut(login)?;
        account.status = AccountStatus::Available;
        account.rental_id = None;
        Ok(account.clone())
    }

    /// Administrative path into and out of `Disabled`
    pub fn set_disabled(&mut self, login: &str, disabled: bool) -> RentalResult<Account> {
        let account = self.get_mut(login)?;
        if account.status == AccountStatus::Rented {
            return Err(RentalError::CurrentlyRented(login.to_string()));
        }

        account.status = if disabled {
            AccountStatus::Disabled
        } else {
            AccountStatus::Available
        };
        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(login: &str, password: &str, account_type: &str) -> NewAccount {
        NewAccount {
            login: login.to_string(),
            password: password.to_string(),
            account_type: account_type.to_string(),
            provider_credential: None,
        }
    }

    #[test]
    fn test_add_sets_original_password() {
        let mut store = CredentialStore::new();
        let account = store
            .add(new_account("steamuser1", "pw1", "pubg"), Utc::now())
            .unwrap();

        assert_eq!(account.status, AccountStatus::Available);
        assert_eq!(account.original_password, "pw1");
        assert!(account.rental_id.is_none());
    }

    #[test]
    fn test_add_duplicate_login() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw", "pubg"), Utc::now()).unwrap();

        let err = store.add(new_account("a", "pw2", "csgo"), Utc::now()).unwrap_err();
        assert!(matches!(err, RentalError::DuplicateLogin(login) if login == "a"));
        assert_eq!(store.get("a").unwrap().password, "pw");
    }

    #[test]
    fn test_add_canonicalizes_repo() {
        let mut store = CredentialStore::new();
        let account = store.add(new_account("r", "pw", "R.E.P.O"), Utc::now()).unwrap();
        assert_eq!(account.account_type, "repo");
    }

    #[test]
    fn test_update_canonicalizes_repo() {
        let mut store = CredentialStore::new();
        store.add(new_account("added", "pw", "R.E.P.O"), Utc::now()).unwrap();
        store.add(new_account("edited", "pw", "pubg"), Utc::now()).unwrap();

        let updated = store
            .update(
                "edited",
                AccountUpdate {
                    account_type: Some(" R.E.P.O ".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.account_type, "repo");
        assert_eq!(store.get("added").unwrap().account_type, updated.account_type);
    }

    #[test]
    fn test_ordered_follows_insertion() {
        let mut store = CredentialStore::new();
        for login in ["zeta", "alpha", "mid"] {
            store.add(new_account(login, "pw", "pubg"), Utc::now()).unwrap();
        }

        let logins: Vec<&str> = store.ordered().iter().map(|a| a.login.as_str()).collect();
        assert_eq!(logins, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_remove_rented_is_refused() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw", "pubg"), Utc::now()).unwrap();
        store.mark_rented("a", "rental-1").unwrap();

        assert!(matches!(store.remove("a"), Err(RentalError::StillRented(_))));
        assert!(matches!(store.remove("missing"), Err(RentalError::NotFound(_))));

        store.release("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_password_preserves_original() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw1", "pubg"), Utc::now()).unwrap();

        let updated = store
            .update(
                "a",
                AccountUpdate {
                    password: Some("pw2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.password, "pw2");
        assert_eq!(updated.original_password, "pw1");

        let updated = store
            .update(
                "a",
                AccountUpdate {
                    original_password: Some("pw0".to_string()),
                    provider_credential: Some("key".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.original_password, "pw0");
        assert!(updated.has_provider_credential());

        let updated = store
            .update(
                "a",
                AccountUpdate {
                    provider_credential: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.has_provider_credential());
    }

    #[test]
    fn test_rotate_password_generates_when_absent() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw1", "pubg"), Utc::now()).unwrap();

        let change = store.rotate_password("a", None).unwrap();
        assert_eq!(change.old_password, "pw1");
        assert_eq!(change.new_password.len(), 12);
        assert_eq!(store.get("a").unwrap().password, change.new_password);

        let change = store.rotate_password("a", Some("chosen".to_string())).unwrap();
        assert_eq!(change.new_password, "chosen");
    }

    #[test]
    fn test_reset_to_original() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw1", "pubg"), Utc::now()).unwrap();
        store.rotate_password("a", None).unwrap();

        store.mark_rented("a", "r1").unwrap();
        assert!(matches!(
            store.reset_to_original("a"),
            Err(RentalError::CurrentlyRented(_))
        ));

        store.release("a").unwrap();
        let change = store.reset_to_original("a").unwrap();
        assert_eq!(change.new_password, "pw1");
        assert_eq!(store.get("a").unwrap().password, "pw1");
    }

    #[test]
    fn test_mark_rented_requires_available() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw", "pubg"), Utc::now()).unwrap();
        store.set_disabled("a", true).unwrap();

        assert!(matches!(
            store.mark_rented("a", "r1"),
            Err(RentalError::AccountUnavailable(_))
        ));
    }

    #[test]
    fn test_from_accounts_continues_positions() {
        let mut store = CredentialStore::new();
        store.add(new_account("a", "pw", "pubg"), Utc::now()).unwrap();
        store.add(new_account("b", "pw", "pubg"), Utc::now()).unwrap();

        let accounts: Vec<Account> = store.ordered().into_iter().cloned().collect();
        let mut reloaded = CredentialStore::from_accounts(accounts);
        let c = reloaded.add(new_account("c", "pw", "pubg"), Utc::now()).unwrap();
        assert_eq!(c.position, 3);
    }
}
