/// Rental lifecycle engine
///
/// Owns the credential store and the rental ledger behind one async mutex.
/// Every mutation is written through to the repository before the lock is
/// released; if the write fails the in-memory records are restored, so an
/// operation either happens completely or not at all. Remote provider calls
/// run after the lock is dropped.
use crate::{
    account::{
        Account, AccountInfo, AccountStatus, AccountUpdate, CredentialStore, NewAccount,
        PasswordChange,
    },
    db::{ChangeSet, RentalRepository},
    error::{RentalError, RentalResult},
    matching::select_account,
    metrics,
    provider::{self, AccountProvider, ProviderOutcome},
    rental::{check_duration_hours, ReclaimReason, Rental, RentalLedger},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Accounts and rentals, always mutated together
#[derive(Debug, Default)]
pub struct PoolState {
    pub accounts: CredentialStore,
    pub rentals: RentalLedger,
}

/// Previous versions of the records an operation touched
#[derive(Default)]
struct Undo {
    accounts: Vec<(String, Option<Account>)>,
    rentals: Vec<(String, Option<Rental>)>,
}

impl Undo {
    fn account(&mut self, state: &PoolState, login: &str) {
        self.accounts
            .push((login.to_string(), state.accounts.get(login).cloned()));
    }

    fn rental(&mut self, state: &PoolState, rental_id: &str) {
        self.rentals
            .push((rental_id.to_string(), state.rentals.get(rental_id).cloned()));
    }

    fn rollback(self, state: &mut PoolState) {
        for (login, previous) in self.accounts.into_iter().rev() {
            state.accounts.restore(&login, previous);
        }
        for (rental_id, previous) in self.rentals.into_iter().rev() {
            state.rentals.restore(&rental_id, previous);
        }
    }
}

/// Checkout parameters
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub requester_id: String,
    pub requester_name: String,
    pub duration_hours: i64,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Rent this login instead of matching by type
    #[serde(default)]
    pub specific_account: Option<String>,
}

/// A successful checkout
#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub account: Account,
    pub rental: Rental,
}

/// A successful reclaim
#[derive(Debug, Clone, Serialize)]
pub struct Reclaimed {
    pub rental: Rental,
    pub account: Account,
    pub new_password: String,
    pub reason: ReclaimReason,
    pub password_sync: ProviderOutcome,
    pub session_revoke: ProviderOutcome,
}

/// Result of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub reclaimed: Vec<Reclaimed>,
    /// Rental id and reason for each rental that could not be reclaimed
    pub failures: Vec<(String, String)>,
}

/// Local password change plus the provider's answer
#[derive(Debug, Clone, Serialize)]
pub struct PasswordReset {
    pub account: Account,
    pub new_password: String,
    pub provider: ProviderOutcome,
}

/// Per-type occupancy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub total: usize,
    pub available: usize,
    pub rented: usize,
}

/// Aggregate view of the pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub accounts_total: usize,
    pub available: usize,
    pub rented: usize,
    pub disabled: usize,
    pub by_type: BTreeMap<String, TypeStats>,
    pub rentals_active: usize,
    pub rentals_total: usize,
    pub rentals_closed: usize,
    pub next_expiring: Vec<Rental>,
}

/// The lifecycle engine
pub struct RentalManager {
    state: Mutex<PoolState>,
    repo: Arc<dyn RentalRepository>,
    provider: Arc<dyn AccountProvider>,
}

impl RentalManager {
    /// Empty engine (nothing is read from the repository)
    pub fn new(repo: Arc<dyn RentalRepository>, provider: Arc<dyn AccountProvider>) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            repo,
            provider,
        }
    }

    /// Restore accounts and rentals from the repository
    pub async fn load(
        repo: Arc<dyn RentalRepository>,
        provider: Arc<dyn AccountProvider>,
    ) -> RentalResult<Self> {
        let snapshot = repo.load_snapshot().await?;
        info!(
            "Loaded {} accounts and {} rentals",
            snapshot.accounts.len(),
            snapshot.rentals.len()
        );

        let state = PoolState {
            accounts: CredentialStore::from_accounts(snapshot.accounts),
            rentals: RentalLedger::from_rentals(snapshot.rentals),
        };
        for problem in Self::audit_state(&state) {
            error!("Inconsistent pool state: {}", problem);
        }
        Self::publish_gauges(&state);

        Ok(Self {
            state: Mutex::new(state),
            repo,
            provider,
        })
    }

    async fn commit(&self, state: &mut PoolState, undo: Undo, changes: ChangeSet) -> RentalResult<()> {
        if let Err(e) = self.repo.apply(&changes).await {
            error!("Failed to persist changes, restoring previous state: {}", e);
            undo.rollback(state);
            return Err(e);
        }
        Self::publish_gauges(state);
        Ok(())
    }

    fn publish_gauges(state: &PoolState) {
        let (mut available, mut rented, mut disabled) = (0, 0, 0);
        for account in state.accounts.ordered() {
            match account.status {
                AccountStatus::Available => available += 1,
                AccountStatus::Rented => rented += 1,
                AccountStatus::Disabled => disabled += 1,
            }
        }
        metrics::set_pool_gauges(available, rented, disabled, state.rentals.active().len());
    }

    // ========== Checkout ==========

    /// Allocate an account and open a rental for it
    pub async fn checkout(&self, request: CheckoutRequest) -> RentalResult<Checkout> {
        let result = self.checkout_at(request, Utc::now()).await;
        metrics::record_checkout(match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        });
        result
    }

    async fn checkout_at(&self, request: CheckoutRequest, now: DateTime<Utc>) -> RentalResult<Checkout> {
        check_duration_hours(request.duration_hours)?;
        if request.requester_id.trim().is_empty() {
            return Err(RentalError::Validation("Requester id cannot be empty".to_string()));
        }

        let mut state = self.state.lock().await;

        let login = match request.specific_account.as_deref() {
            Some(login) => match state.accounts.get(login) {
                Some(account) if account.is_available() => account.login.clone(),
                _ => return Err(RentalError::AccountUnavailable(login.to_string())),
            },
            None => {
                let ordered = state.accounts.ordered();
                let (account, tier) = select_account(&ordered, request.account_type.as_deref())?;
                debug!(login = %account.login, ?tier, "Matched account");
                account.login.clone()
            }
        };

        let mut undo = Undo::default();
        undo.account(&state, &login);

        let staged = Self::stage_checkout(&mut state, &mut undo, &login, &request, now);
        let (account, rental) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                undo.rollback(&mut state);
                return Err(e);
            }
        };

        self.commit(
            &mut state,
            undo,
            ChangeSet::new().account(account.clone()).rental(rental.clone()),
        )
        .await?;

        info!(
            login = %account.login,
            rental_id = %rental.id,
            requester = %rental.requester_name,
            duration_hours = rental.duration_hours,
            order_id = ?rental.order_id,
            "Account rented"
        );
        Ok(Checkout { account, rental })
    }

    fn stage_checkout(
        state: &mut PoolState,
        undo: &mut Undo,
        login: &str,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> RentalResult<(Account, Rental)> {
        let rental = state.rentals.open(
            login,
            &request.requester_id,
            &request.requester_name,
            request.duration_hours,
            request.order_id.clone(),
            now,
        )?;
        undo.rentals.push((rental.id.clone(), None));

        let account = state.accounts.mark_rented(login, &rental.id)?;
        Ok((account, rental))
    }

    // ========== Reclaim ==========

    /// End a rental: release the account, rotate its password and revoke its
    /// sessions. The local transition is committed before the provider is
    /// called and is kept whatever the provider answers.
    pub async fn reclaim(&self, rental_id: &str, reason: ReclaimReason) -> RentalResult<Reclaimed> {
        self.reclaim_at(rental_id, reason, Utc::now()).await
    }

    async fn reclaim_at(
        &self,
        rental_id: &str,
        reason: ReclaimReason,
        now: DateTime<Utc>,
    ) -> RentalResult<Reclaimed> {
        let (rental, account, change) = {
            let mut state = self.state.lock().await;

            let rental = state
                .rentals
                .get(rental_id)
                .ok_or_else(|| RentalError::NotFound(format!("Rental {}", rental_id)))?;
            if !rental.is_active {
                return Err(RentalError::AlreadyClosed(rental_id.to_string()));
            }
            let login = rental.account_login.clone();

            let mut undo = Undo::default();
            undo.rental(&state, rental_id);

            if !state.accounts.contains(&login) {
                error!(
                    rental_id = %rental_id,
                    login = %login,
                    "Rental references a missing account, closing it anyway"
                );
                let closed = state.rentals.close(rental_id, now)?;
                self.commit(&mut state, undo, ChangeSet::new().rental(closed))
                    .await?;
                return Err(RentalError::OrphanedRental {
                    rental_id: rental_id.to_string(),
                    login,
                });
            }

            if let Some(account) = state.accounts.get(&login) {
                if account.rental_id.as_deref() != Some(rental_id) {
                    warn!(
                        rental_id = %rental_id,
                        login = %login,
                        account_rental = ?account.rental_id,
                        "Account does not point back at the rental being reclaimed"
                    );
                }
            }

            undo.account(&state, &login);
            let staged = Self::stage_reclaim(&mut state, rental_id, &login, now);
            let (rental, change) = match staged {
                Ok(staged) => staged,
                Err(e) => {
                    undo.rollback(&mut state);
                    return Err(e);
                }
            };
            let account = state
                .accounts
                .get(&login)
                .cloned()
                .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))?;

            self.commit(
                &mut state,
                undo,
                ChangeSet::new().account(account.clone()).rental(rental.clone()),
            )
            .await?;

            (rental, account, change)
        };

        info!(
            login = %account.login,
            rental_id = %rental.id,
            reason = %reason,
            "Rental closed, account back in the pool"
        );
        metrics::record_reclaim(reason.as_str());

        let password_sync = provider::sync_password(self.provider.as_ref(), &change).await;
        let session_revoke = provider::revoke_sessions(
            self.provider.as_ref(),
            &change.login,
            change.provider_credential.as_deref(),
        )
        .await;

        Ok(Reclaimed {
            rental,
            account,
            new_password: change.new_password,
            reason,
            password_sync,
            session_revoke,
        })
    }

    fn stage_reclaim(
        state: &mut PoolState,
        rental_id: &str,
        login: &str,
        now: DateTime<Utc>,
    ) -> RentalResult<(Rental, PasswordChange)> {
        let rental = state.rentals.close(rental_id, now)?;
        state.accounts.release(login)?;
        let change = state.accounts.rotate_password(login, None)?;
        Ok((rental, change))
    }

    /// Requester-initiated return
    pub async fn return_rental(&self, rental_id: &str) -> RentalResult<Reclaimed> {
        self.reclaim(rental_id, ReclaimReason::Returned).await
    }

    /// Administrator ends the active rental on `login`
    pub async fn force_reclaim(&self, login: &str) -> RentalResult<Reclaimed> {
        let rental_id = {
            let mut state = self.state.lock().await;
            let account = state
                .accounts
                .get(login)
                .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))?;
            if account.status != AccountStatus::Rented {
                return Err(RentalError::Conflict(format!("Account {} is not rented", login)));
            }

            let linked = account
                .rental_id
                .as_deref()
                .and_then(|id| state.rentals.get(id))
                .filter(|r| r.is_active)
                .map(|r| r.id.clone());

            match linked.or_else(|| state.rentals.active_for(login).map(|r| r.id.clone())) {
                Some(rental_id) => rental_id,
                None => {
                    error!(login = %login, "Rented account has no active rental, releasing it");
                    let mut undo = Undo::default();
                    undo.account(&state, login);
                    let account = state.accounts.release(login)?;
                    self.commit(&mut state, undo, ChangeSet::new().account(account))
                        .await?;
                    return Err(RentalError::NotFound(format!("Active rental for {}", login)));
                }
            }
        };

        self.reclaim(&rental_id, ReclaimReason::Forced).await
    }

    /// Push an active rental's end time forward
    pub async fn extend(&self, rental_id: &str, additional_hours: i64) -> RentalResult<Rental> {
        let mut state = self.state.lock().await;
        let mut undo = Undo::default();
        undo.rental(&state, rental_id);

        let rental = state.rentals.extend(rental_id, additional_hours)?;
        self.commit(&mut state, undo, ChangeSet::new().rental(rental.clone()))
            .await?;

        info!(
            rental_id = %rental_id,
            additional_hours,
            end_time = %rental.end_time,
            "Rental extended"
        );
        Ok(rental)
    }

    // ========== Sweep ==========

    /// Reclaim every rental past its end time
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as of `now`. One failing rental never stops the others.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let expired = self.state.lock().await.rentals.list_expired(now);
        let mut report = SweepReport::default();

        for rental in expired {
            match self.reclaim_at(&rental.id, ReclaimReason::Expired, now).await {
                Ok(reclaimed) => report.reclaimed.push(reclaimed),
                Err(RentalError::AlreadyClosed(_)) => {
                    debug!(rental_id = %rental.id, "Rental closed before the sweep reached it");
                }
                Err(e) => {
                    error!(rental_id = %rental.id, "Failed to reclaim expired rental: {}", e);
                    report.failures.push((rental.id.clone(), e.to_string()));
                }
            }
        }

        report
    }

    // ========== Account administration ==========

    pub async fn add_account(&self, new: NewAccount) -> RentalResult<Account> {
        let mut state = self.state.lock().await;
        let mut undo = Undo::default();
        undo.account(&state, new.login.trim());

        let account = state.accounts.add(new, Utc::now())?;
        self.commit(&mut state, undo, ChangeSet::new().account(account.clone()))
            .await?;

        info!(login = %account.login, account_type = %account.account_type, "Account added");
        Ok(account)
    }

    pub async fn remove_account(&self, login: &str) -> RentalResult<Account> {
        let mut state = self.state.lock().await;
        let mut undo = Undo::default();
        undo.account(&state, login);

        let account = state.accounts.remove(login)?;
        self.commit(&mut state, undo, ChangeSet::new().delete_account(login))
            .await?;

        info!(login = %login, "Account removed");
        Ok(account)
    }

    pub async fn update_account(&self, login: &str, update: AccountUpdate) -> RentalResult<Account> {
        if update.is_empty() {
            return Err(RentalError::Validation("Nothing to update".to_string()));
        }

        let mut state = self.state.lock().await;
        let mut undo = Undo::default();
        undo.account(&state, login);

        let account = state.accounts.update(login, update)?;
        self.commit(&mut state, undo, ChangeSet::new().account(account.clone()))
            .await?;

        info!(login = %login, "Account updated");
        Ok(account)
    }

    pub async fn set_disabled(&self, login: &str, disabled: bool) -> RentalResult<Account> {
        let mut state = self.state.lock().await;
        let mut undo = Undo::default();
        undo.account(&state, login);

        let account = state.accounts.set_disabled(login, disabled)?;
        self.commit(&mut state, undo, ChangeSet::new().account(account.clone()))
            .await?;

        info!(login = %login, disabled, "Account availability changed");
        Ok(account)
    }

    /// Set a new password (generated when `new_password` is `None`) and push
    /// it to the provider
    pub async fn rotate_password(
        &self,
        login: &str,
        new_password: Option<String>,
    ) -> RentalResult<PasswordReset> {
        let (account, change) = {
            let mut state = self.state.lock().await;
            let mut undo = Undo::default();
            undo.account(&state, login);

            let change = state.accounts.rotate_password(login, new_password)?;
            self.commit_password(&mut state, undo, login, change).await?
        };

        let provider = provider::sync_password(self.provider.as_ref(), &change).await;
        info!(login = %login, provider = provider.label(), "Password rotated");

        Ok(PasswordReset {
            account,
            new_password: change.new_password,
            provider,
        })
    }

    /// Restore the original password; refused while rented
    pub async fn reset_to_original(&self, login: &str) -> RentalResult<PasswordReset> {
        let (account, change) = {
            let mut state = self.state.lock().await;
            let mut undo = Undo::default();
            undo.account(&state, login);

            let change = state.accounts.reset_to_original(login)?;
            self.commit_password(&mut state, undo, login, change).await?
        };

        let provider = provider::sync_password(self.provider.as_ref(), &change).await;
        info!(login = %login, provider = provider.label(), "Password reset to original");

        Ok(PasswordReset {
            account,
            new_password: change.new_password,
            provider,
        })
    }

    async fn commit_password(
        &self,
        state: &mut PoolState,
        undo: Undo,
        login: &str,
        change: PasswordChange,
    ) -> RentalResult<(Account, PasswordChange)> {
        let account = state
            .accounts
            .get(login)
            .cloned()
            .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))?;
        self.commit(state, undo, ChangeSet::new().account(account.clone()))
            .await?;
        Ok((account, change))
    }

    /// Log out every session on an account that is not rented and leave it
    /// `available` locally whatever the provider answers. Rented accounts
    /// are reclaimed instead.
    pub async fn revoke_sessions(&self, login: &str) -> RentalResult<ProviderOutcome> {
        let credential = {
            let mut state = self.state.lock().await;
            let account = state
                .accounts
                .get(login)
                .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))?;
            match account.status {
                AccountStatus::Rented => {
                    return Err(RentalError::CurrentlyRented(login.to_string()));
                }
                AccountStatus::Available => account.provider_credential.clone(),
                AccountStatus::Disabled => {
                    let mut undo = Undo::default();
                    undo.account(&state, login);
                    let account = state.accounts.set_disabled(login, false)?;
                    let credential = account.provider_credential.clone();
                    self.commit(&mut state, undo, ChangeSet::new().account(account))
                        .await?;
                    info!(login = %login, "Disabled account returned to the pool");
                    credential
                }
            }
        };

        Ok(provider::revoke_sessions(self.provider.as_ref(), login, credential.as_deref()).await)
    }

    // ========== Queries ==========

    pub async fn get_account(&self, login: &str) -> Option<Account> {
        self.state.lock().await.accounts.get(login).cloned()
    }

    /// Account with its active rental and time left
    pub async fn get_account_info(&self, login: &str) -> RentalResult<AccountInfo> {
        let now = Utc::now();
        let state = self.state.lock().await;
        let account = state
            .accounts
            .get(login)
            .cloned()
            .ok_or_else(|| RentalError::NotFound(format!("Account {}", login)))?;

        let rental = account
            .rental_id
            .as_deref()
            .and_then(|id| state.rentals.get(id))
            .filter(|r| r.is_active)
            .cloned();
        let remaining_minutes = rental.as_ref().map(|r| r.remaining_at(now).num_minutes());

        Ok(AccountInfo {
            has_provider_credential: account.has_provider_credential(),
            account,
            rental,
            remaining_minutes,
        })
    }

    /// Accounts in store order
    pub async fn list_accounts(&self) -> Vec<Account> {
        self.state
            .lock()
            .await
            .accounts
            .ordered()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_rental(&self, rental_id: &str) -> Option<Rental> {
        self.state.lock().await.rentals.get(rental_id).cloned()
    }

    /// Active rentals soonest-expiring first, or the full history newest first
    pub async fn list_rentals(&self, active_only: bool) -> Vec<Rental> {
        let state = self.state.lock().await;
        let rentals = if active_only {
            state.rentals.active()
        } else {
            state.rentals.all()
        };
        rentals.into_iter().cloned().collect()
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = PoolStats {
            accounts_total: state.accounts.len(),
            available: 0,
            rented: 0,
            disabled: 0,
            by_type: BTreeMap::new(),
            rentals_active: 0,
            rentals_total: state.rentals.len(),
            rentals_closed: 0,
            next_expiring: Vec::new(),
        };

        for account in state.accounts.ordered() {
            let entry = stats.by_type.entry(account.account_type.clone()).or_default();
            entry.total += 1;
            match account.status {
                AccountStatus::Available => {
                    stats.available += 1;
                    entry.available += 1;
                }
                AccountStatus::Rented => {
                    stats.rented += 1;
                    entry.rented += 1;
                }
                AccountStatus::Disabled => stats.disabled += 1,
            }
        }

        let active = state.rentals.active();
        stats.rentals_active = active.len();
        stats.rentals_closed = stats.rentals_total - stats.rentals_active;
        stats.next_expiring = active.into_iter().take(3).cloned().collect();
        stats
    }

    /// Violations of the account/rental pairing rules; empty when consistent
    pub async fn audit(&self) -> Vec<String> {
        Self::audit_state(&*self.state.lock().await)
    }

    fn audit_state(state: &PoolState) -> Vec<String> {
        let mut problems = Vec::new();

        for account in state.accounts.ordered() {
            let active: Vec<&Rental> = state
                .rentals
                .active()
                .into_iter()
                .filter(|r| r.account_login == account.login)
                .collect();

            match account.status {
                AccountStatus::Rented => {
                    if active.len() != 1 {
                        problems.push(format!(
                            "account {} is rented but has {} active rentals",
                            account.login,
                            active.len()
                        ));
                    } else if account.rental_id.as_deref() != Some(active[0].id.as_str()) {
                        problems.push(format!(
                            "account {} points at rental {:?} instead of {}",
                            account.login, account.rental_id, active[0].id
                        ));
                    }
                }
                _ => {
                    if !active.is_empty() {
                        problems.push(format!(
                            "account {} is {} but has {} active rentals",
                            account.login,
                            account.status.as_str(),
                            active.len()
                        ));
                    }
                    if account.rental_id.is_some() {
                        problems.push(format!(
                            "account {} is {} but still references a rental",
                            account.login,
                            account.status.as_str()
                        ));
                    }
                }
            }
        }

        for rental in state.rentals.active() {
            if !state.accounts.contains(&rental.account_login) {
                problems.push(format!(
                    "rental {} references missing account {}",
                    rental.id, rental.account_login
                ));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::db::{create_memory_pool, run_migrations, Snapshot, SqliteRepository};
    use crate::provider::ProviderError;
    use crate::settings::Settings;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Records provider calls; fails them when `fail` is set
    #[derive(Default)]
    struct FakeProvider {
        fail: AtomicBool,
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl AccountProvider for FakeProvider {
        async fn change_password(
            &self,
            login: &str,
            _credential: &str,
            _old: &str,
            new: &str,
        ) -> Result<(), ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("password:{}:{}", login, new));
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Transport("unreachable".to_string()));
            }
            Ok(())
        }

        async fn revoke_sessions(&self, login: &str, _credential: &str) -> Result<(), ProviderError> {
            self.calls.lock().unwrap().push(format!("revoke:{}", login));
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Transport("unreachable".to_string()));
            }
            Ok(())
        }
    }

    /// Repository whose writes can be switched off
    struct FlakyRepository {
        inner: SqliteRepository,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl RentalRepository for FlakyRepository {
        async fn apply(&self, changes: &ChangeSet) -> RentalResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RentalError::Internal("disk full".to_string()));
            }
            self.inner.apply(changes).await
        }
        async fn load_snapshot(&self) -> RentalResult<Snapshot> {
            self.inner.load_snapshot().await
        }
        async fn save_binding(
            &self,
            product_name: &str,
            account_type: &str,
            duration_hours: i64,
            now: DateTime<Utc>,
        ) -> RentalResult<Binding> {
            self.inner
                .save_binding(product_name, account_type, duration_hours, now)
                .await
        }
        async fn delete_binding(&self, id: i64) -> RentalResult<bool> {
            self.inner.delete_binding(id).await
        }
        async fn load_bindings(&self) -> RentalResult<Vec<Binding>> {
            self.inner.load_bindings().await
        }
        async fn load_settings(&self) -> RentalResult<Option<Settings>> {
            self.inner.load_settings().await
        }
        async fn save_settings(&self, settings: &Settings) -> RentalResult<()> {
            self.inner.save_settings(settings).await
        }
        async fn load_templates(&self) -> RentalResult<Vec<(String, String)>> {
            self.inner.load_templates().await
        }
        async fn save_template(&self, name: &str, body: &str, now: DateTime<Utc>) -> RentalResult<()> {
            self.inner.save_template(name, body, now).await
        }
        async fn clear_templates(&self) -> RentalResult<()> {
            self.inner.clear_templates().await
        }
    }

    async fn setup() -> (RentalManager, Arc<FlakyRepository>, Arc<FakeProvider>) {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = Arc::new(FlakyRepository {
            inner: SqliteRepository::new(pool),
            fail_writes: AtomicBool::new(false),
        });
        let provider = Arc::new(FakeProvider::default());
        let manager = RentalManager::new(repo.clone(), provider.clone());
        (manager, repo, provider)
    }

    fn new_account(login: &str, account_type: &str, credential: Option<&str>) -> NewAccount {
        NewAccount {
            login: login.to_string(),
            password: "pw1".to_string(),
            account_type: account_type.to_string(),
            provider_credential: credential.map(str::to_string),
        }
    }

    fn request(account_type: Option<&str>, hours: i64) -> CheckoutRequest {
        CheckoutRequest {
            requester_id: "42".to_string(),
            requester_name: "alice".to_string(),
            duration_hours: hours,
            account_type: account_type.map(str::to_string),
            order_id: None,
            specific_account: None,
        }
    }

    #[tokio::test]
    async fn test_checkout_marks_account_rented() {
        let (manager, repo, _) = setup().await;
        manager.add_account(new_account("steamuser1", "pubg", None)).await.unwrap();

        let checkout = manager.checkout(request(Some("pubg"), 2)).await.unwrap();
        assert_eq!(checkout.account.status, AccountStatus::Rented);
        assert_eq!(checkout.account.rental_id.as_deref(), Some(checkout.rental.id.as_str()));
        assert_eq!(
            (checkout.rental.end_time - checkout.rental.start_time).num_seconds(),
            7200
        );

        let snapshot = repo.load_snapshot().await.unwrap();
        assert_eq!(snapshot.accounts[0].status, AccountStatus::Rented);
        assert_eq!(snapshot.rentals.len(), 1);
        assert!(manager.audit().await.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_validation_leaves_state_untouched() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();

        assert!(matches!(
            manager.checkout(request(None, 0)).await,
            Err(RentalError::Validation(_))
        ));
        assert!(manager.list_rentals(false).await.is_empty());
        assert_eq!(manager.get_account("a").await.unwrap().status, AccountStatus::Available);
    }

    #[tokio::test]
    async fn test_specific_account_must_be_available() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();

        let mut req = request(None, 1);
        req.specific_account = Some("a".to_string());
        manager.checkout(req.clone()).await.unwrap();

        assert!(matches!(
            manager.checkout(req).await,
            Err(RentalError::AccountUnavailable(login)) if login == "a"
        ));
    }

    #[tokio::test]
    async fn test_reclaim_rotates_and_syncs() {
        let (manager, _, provider) = setup().await;
        manager
            .add_account(new_account("a", "pubg", Some("api-key")))
            .await
            .unwrap();
        let checkout = manager.checkout(request(Some("pubg"), 1)).await.unwrap();

        let reclaimed = manager
            .reclaim(&checkout.rental.id, ReclaimReason::Forced)
            .await
            .unwrap();
        assert_ne!(reclaimed.new_password, "pw1");
        assert_eq!(reclaimed.account.status, AccountStatus::Available);
        assert!(reclaimed.account.rental_id.is_none());
        assert!(!reclaimed.rental.is_active);
        assert_eq!(reclaimed.password_sync, ProviderOutcome::Synced);
        assert_eq!(reclaimed.session_revoke, ProviderOutcome::Synced);

        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                format!("password:a:{}", reclaimed.new_password),
                "revoke:a".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_failure_does_not_undo_reclaim() {
        let (manager, _, provider) = setup().await;
        manager
            .add_account(new_account("a", "pubg", Some("api-key")))
            .await
            .unwrap();
        let checkout = manager.checkout(request(None, 1)).await.unwrap();
        provider.fail.store(true, Ordering::SeqCst);

        let reclaimed = manager.return_rental(&checkout.rental.id).await.unwrap();
        assert!(reclaimed.password_sync.is_failed());
        assert!(reclaimed.session_revoke.is_failed());

        let account = manager.get_account("a").await.unwrap();
        assert_eq!(account.status, AccountStatus::Available);
        assert_eq!(account.password, reclaimed.new_password);
    }

    #[tokio::test]
    async fn test_reclaim_twice_is_already_closed() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();
        let checkout = manager.checkout(request(None, 1)).await.unwrap();

        manager.return_rental(&checkout.rental.id).await.unwrap();
        assert!(matches!(
            manager.return_rental(&checkout.rental.id).await,
            Err(RentalError::AlreadyClosed(_))
        ));
        assert!(matches!(
            manager.return_rental("nope").await,
            Err(RentalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_restores_memory() {
        let (manager, repo, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();

        repo.fail_writes.store(true, Ordering::SeqCst);
        assert!(manager.checkout(request(None, 1)).await.is_err());
        assert!(manager.add_account(new_account("b", "pubg", None)).await.is_err());

        let account = manager.get_account("a").await.unwrap();
        assert_eq!(account.status, AccountStatus::Available);
        assert!(account.rental_id.is_none());
        assert!(manager.get_account("b").await.is_none());
        assert!(manager.list_rentals(false).await.is_empty());

        repo.fail_writes.store(false, Ordering::SeqCst);
        let checkout = manager.checkout(request(None, 1)).await.unwrap();

        repo.fail_writes.store(true, Ordering::SeqCst);
        assert!(manager.return_rental(&checkout.rental.id).await.is_err());
        let rental = manager.get_rental(&checkout.rental.id).await.unwrap();
        assert!(rental.is_active);
        assert_eq!(manager.get_account("a").await.unwrap().password, "pw1");
    }

    #[tokio::test]
    async fn test_orphaned_rental_is_closed() {
        let (manager, repo, _) = setup().await;
        let now = Utc::now();
        let rental = Rental::new("ghost", "42", "alice", 1, None, now - Duration::hours(2)).unwrap();
        repo.apply(&ChangeSet::new().rental(rental.clone())).await.unwrap();

        let manager = RentalManager::load(repo.clone(), Arc::new(FakeProvider::default()))
            .await
            .unwrap();
        assert_eq!(manager.audit().await.len(), 1);

        let report = manager.sweep_at(now).await;
        assert!(report.reclaimed.is_empty());
        assert_eq!(report.failures.len(), 1);

        let stored = manager.get_rental(&rental.id).await.unwrap();
        assert!(!stored.is_active);
        assert!(manager.audit().await.is_empty());
    }

    #[tokio::test]
    async fn test_force_reclaim_requires_rented() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();

        assert!(matches!(
            manager.force_reclaim("a").await,
            Err(RentalError::Conflict(_))
        ));
        assert!(matches!(
            manager.force_reclaim("zzz").await,
            Err(RentalError::NotFound(_))
        ));

        manager.checkout(request(None, 1)).await.unwrap();
        let reclaimed = manager.force_reclaim("a").await.unwrap();
        assert_eq!(reclaimed.reason, ReclaimReason::Forced);
    }

    #[tokio::test]
    async fn test_sweep_only_takes_expired() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("short", "pubg", None)).await.unwrap();
        manager.add_account(new_account("long", "pubg", None)).await.unwrap();

        let mut req = request(None, 1);
        req.specific_account = Some("short".to_string());
        let short = manager.checkout(req).await.unwrap();
        let mut req = request(None, 5);
        req.specific_account = Some("long".to_string());
        manager.checkout(req).await.unwrap();

        let report = manager.sweep_at(short.rental.end_time).await;
        assert_eq!(report.reclaimed.len(), 1);
        assert_eq!(report.reclaimed[0].rental.id, short.rental.id);
        assert_eq!(report.reclaimed[0].reason, ReclaimReason::Expired);
        assert!(report.failures.is_empty());

        let report = manager.sweep_at(short.rental.end_time).await;
        assert!(report.reclaimed.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_reset_guards() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();
        manager.checkout(request(None, 1)).await.unwrap();

        assert!(matches!(
            manager.remove_account("a").await,
            Err(RentalError::StillRented(_))
        ));
        assert!(matches!(
            manager.reset_to_original("a").await,
            Err(RentalError::CurrentlyRented(_))
        ));
        assert!(matches!(
            manager.set_disabled("a", true).await,
            Err(RentalError::CurrentlyRented(_))
        ));
        assert!(matches!(
            manager.revoke_sessions("a").await,
            Err(RentalError::CurrentlyRented(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_sessions_returns_account_to_pool() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();
        manager.set_disabled("a", true).await.unwrap();

        let outcome = manager.revoke_sessions("a").await.unwrap();
        assert_eq!(outcome, ProviderOutcome::Skipped);
        assert_eq!(
            manager.get_account("a").await.unwrap().status,
            AccountStatus::Available
        );
        assert!(matches!(
            manager.revoke_sessions("missing").await,
            Err(RentalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rotate_then_reset_to_original() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();

        let rotated = manager.rotate_password("a", None).await.unwrap();
        assert_ne!(rotated.new_password, "pw1");
        assert_eq!(rotated.provider, ProviderOutcome::Skipped);

        let reset = manager.reset_to_original("a").await.unwrap();
        assert_eq!(reset.new_password, "pw1");
        assert_eq!(reset.account.password, "pw1");
    }

    #[tokio::test]
    async fn test_disabled_accounts_are_not_matched() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();
        manager.set_disabled("a", true).await.unwrap();

        assert!(matches!(
            manager.checkout(request(Some("pubg"), 1)).await,
            Err(RentalError::NoAccountAvailable(_))
        ));

        manager.set_disabled("a", false).await.unwrap();
        manager.checkout(request(Some("pubg"), 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_account_info_and_stats() {
        let (manager, _, _) = setup().await;
        manager.add_account(new_account("a", "pubg", Some("k"))).await.unwrap();
        manager.add_account(new_account("b", "csgo", None)).await.unwrap();
        manager.add_account(new_account("c", "csgo", None)).await.unwrap();
        manager.set_disabled("c", true).await.unwrap();
        manager.checkout(request(Some("pubg"), 2)).await.unwrap();

        let info = manager.get_account_info("a").await.unwrap();
        assert!(info.has_provider_credential);
        assert!(info.rental.is_some());
        let remaining = info.remaining_minutes.unwrap();
        assert!(remaining > 100 && remaining <= 120);

        let stats = manager.stats().await;
        assert_eq!(stats.accounts_total, 3);
        assert_eq!((stats.available, stats.rented, stats.disabled), (1, 1, 1));
        assert_eq!(
            stats.by_type.get("csgo"),
            Some(&TypeStats {
                total: 2,
                available: 1,
                rented: 0
            })
        );
        assert_eq!(stats.rentals_active, 1);
        assert_eq!(stats.next_expiring.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_hours_are_rejected_without_mutation() {
        let (manager, repo, provider) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();
        manager.add_account(new_account("b", "pubg", None)).await.unwrap();

        assert!(matches!(
            manager.checkout(request(None, i64::MAX / 4)).await,
            Err(RentalError::Validation(_))
        ));
        assert_eq!(
            manager.get_account("a").await.unwrap().status,
            AccountStatus::Available
        );
        assert!(manager.list_rentals(false).await.is_empty());

        let checkout = manager.checkout(request(None, 2)).await.unwrap();
        assert!(matches!(
            manager.extend(&checkout.rental.id, i64::MAX / 4).await,
            Err(RentalError::Validation(_))
        ));
        let rental = manager.get_rental(&checkout.rental.id).await.unwrap();
        assert_eq!(rental, checkout.rental);

        let reloaded = RentalManager::load(repo, provider).await.unwrap();
        let stored = reloaded.get_rental(&checkout.rental.id).await.unwrap();
        assert_eq!(stored.duration_hours, 2);
        assert_eq!((stored.end_time - stored.start_time).num_seconds(), 7200);
        assert!(reloaded.audit().await.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let (manager, repo, provider) = setup().await;
        manager.add_account(new_account("a", "pubg", None)).await.unwrap();
        let checkout = manager.checkout(request(None, 3)).await.unwrap();
        manager.extend(&checkout.rental.id, 2).await.unwrap();

        let reloaded = RentalManager::load(repo, provider).await.unwrap();
        let rental = reloaded.get_rental(&checkout.rental.id).await.unwrap();
        assert_eq!(rental.duration_hours, 5);
        assert_eq!(
            reloaded.get_account("a").await.unwrap().status,
            AccountStatus::Rented
        );
        assert!(reloaded.audit().await.is_empty());
    }
}
