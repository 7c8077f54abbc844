/// Durable save/load interface behind the in-memory engine state
use crate::{
    account::{Account, AccountStatus},
    binding::Binding,
    error::RentalResult,
    rental::Rental,
    settings::Settings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Records touched by one engine operation, written in a single transaction
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub accounts: Vec<Account>,
    pub deleted_accounts: Vec<String>,
    pub rentals: Vec<Rental>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn delete_account(mut self, login: &str) -> Self {
        self.deleted_accounts.push(login.to_string());
        self
    }

    pub fn rental(mut self, rental: Rental) -> Self {
        self.rentals.push(rental);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.deleted_accounts.is_empty() && self.rentals.is_empty()
    }
}

/// Everything the engine needs to rebuild its state on startup
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub accounts: Vec<Account>,
    pub rentals: Vec<Rental>,
}

/// Storage backend for accounts, rentals, bindings, settings and templates
#[async_trait]
pub trait RentalRepository: Send + Sync {
    /// Write a change set atomically
    async fn apply(&self, changes: &ChangeSet) -> RentalResult<()>;

    async fn load_snapshot(&self) -> RentalResult<Snapshot>;

    /// Insert or overwrite the binding for `product_name`; the id of an
    /// existing binding is kept
    async fn save_binding(
        &self,
        product_name: &str,
        account_type: &str,
        duration_hours: i64,
        now: DateTime<Utc>,
    ) -> RentalResult<Binding>;

    async fn delete_binding(&self, id: i64) -> RentalResult<bool>;

    async fn load_bindings(&self) -> RentalResult<Vec<Binding>>;

    async fn load_settings(&self) -> RentalResult<Option<Settings>>;

    async fn save_settings(&self, settings: &Settings) -> RentalResult<()>;

    async fn load_templates(&self) -> RentalResult<Vec<(String, String)>>;

    async fn save_template(&self, name: &str, body: &str, now: DateTime<Utc>) -> RentalResult<()>;

    async fn clear_templates(&self) -> RentalResult<()>;
}

/// SQLite implementation
#[derive(Clone)]
pub struct SqliteRepository {
    db: SqlitePool,
}

impl SqliteRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> RentalResult<Account> {
    let status: String = row.try_get("status")?;

    Ok(Account {
        login: row.try_get("login")?,
        password: row.try_get("password")?,
        original_password: row.try_get("original_password")?,
        account_type: row.try_get("account_type")?,
        provider_credential: row.try_get("provider_credential")?,
        status: AccountStatus::parse(&status)?,
        rental_id: row.try_get("rental_id")?,
        position: row.try_get("position")?,
        created_at: row.try_get("created_at")?,
    })
}

fn rental_from_row(row: &sqlx::sqlite::SqliteRow) -> RentalResult<Rental> {
    Ok(Rental {
        id: row.try_get("id")?,
        account_login: row.try_get("account_login")?,
        requester_id: row.try_get("requester_id")?,
        requester_name: row.try_get("requester_name")?,
        start_time: row.try_get("start_time")?,
        duration_hours: row.try_get("duration_hours")?,
        end_time: row.try_get("end_time")?,
        order_id: row.try_get("order_id")?,
        is_active: row.try_get("is_active")?,
        closed_at: row.try_get("closed_at")?,
    })
}

#[async_trait]
impl RentalRepository for SqliteRepository {
    async fn apply(&self, changes: &ChangeSet) -> RentalResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        for account in &changes.accounts {
            sqlx::query(
                r#"
                INSERT INTO account (login, password, original_password, account_type,
                                     provider_credential, status, rental_id, position, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(login) DO UPDATE SET
                    password = excluded.password,
                    original_password = excluded.original_password,
                    account_type = excluded.account_type,
                    provider_credential = excluded.provider_credential,
                    status = excluded.status,
                    rental_id = excluded.rental_id
                "#,
            )
            .bind(&account.login)
            .bind(&account.password)
            .bind(&account.original_password)
            .bind(&account.account_type)
            .bind(&account.provider_credential)
            .bind(account.status.as_str())
            .bind(&account.rental_id)
            .bind(account.position)
            .bind(account.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for login in &changes.deleted_accounts {
            sqlx::query("DELETE FROM account WHERE login = ?")
                .bind(login)
                .execute(&mut *tx)
                .await?;
        }

        for rental in &changes.rentals {
            sqlx::query(
                r#"
                INSERT INTO rental (id, account_login, requester_id, requester_name, start_time,
                                    duration_hours, end_time, order_id, is_active, closed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    duration_hours = excluded.duration_hours,
                    end_time = excluded.end_time,
                    is_active = excluded.is_active,
                    closed_at = excluded.closed_at
                "#,
            )
            .bind(&rental.id)
            .bind(&rental.account_login)
            .bind(&rental.requester_id)
            .bind(&rental.requester_name)
            .bind(rental.start_time)
            .bind(rental.duration_hours)
            .bind(rental.end_time)
            .bind(&rental.order_id)
            .bind(rental.is_active)
            .bind(rental.closed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_snapshot(&self) -> RentalResult<Snapshot> {
        let account_rows = sqlx::query(
            r#"
            SELECT login, password, original_password, account_type, provider_credential,
                   status, rental_id, position, created_at
            FROM account
            ORDER BY position
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let rental_rows = sqlx::query(
            r#"
            SELECT id, account_login, requester_id, requester_name, start_time,
                   duration_hours, end_time, order_id, is_active, closed_at
            FROM rental
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(Snapshot {
            accounts: account_rows
                .iter()
                .map(account_from_row)
                .collect::<RentalResult<_>>()?,
            rentals: rental_rows
                .iter()
                .map(rental_from_row)
                .collect::<RentalResult<_>>()?,
        })
    }

    async fn save_binding(
        &self,
        product_name: &str,
        account_type: &str,
        duration_hours: i64,
        now: DateTime<Utc>,
    ) -> RentalResult<Binding> {
        let row = sqlx::query(
            r#"
            INSERT INTO binding (product_name, account_type, duration_hours, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(product_name) DO UPDATE SET
                account_type = excluded.account_type,
                duration_hours = excluded.duration_hours
            RETURNING id, created_at
            "#,
        )
        .bind(product_name)
        .bind(account_type)
        .bind(duration_hours)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(Binding {
            id: row.try_get("id")?,
            product_name: product_name.to_string(),
            account_type: account_type.to_string(),
            duration_hours,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn delete_binding(&self, id: i64) -> RentalResult<bool> {
        let result = sqlx::query("DELETE FROM binding WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_bindings(&self) -> RentalResult<Vec<Binding>> {
        let rows = sqlx::query(
            "SELECT id, product_name, account_type, duration_hours, created_at FROM binding ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| -> RentalResult<Binding> {
                Ok(Binding {
                    id: row.try_get("id")?,
                    product_name: row.try_get("product_name")?,
                    account_type: row.try_get("account_type")?,
                    duration_hours: row.try_get("duration_hours")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn load_settings(&self) -> RentalResult<Option<Settings>> {
        let row = sqlx::query("SELECT auto_start, admin_id FROM settings WHERE id = 1")
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => Ok(Some(Settings {
                auto_start: row.try_get("auto_start")?,
                admin_id: row.try_get("admin_id")?,
            })),
            None => Ok(None),
        }
    }

    async fn save_settings(&self, settings: &Settings) -> RentalResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, auto_start, admin_id)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                auto_start = excluded.auto_start,
                admin_id = excluded.admin_id
            "#,
        )
        .bind(settings.auto_start)
        .bind(&settings.admin_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn load_templates(&self) -> RentalResult<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT name, body FROM message_template ORDER BY name")
            .fetch_all(&self.db)
            .await?;

        rows.iter()
            .map(|row| -> RentalResult<(String, String)> {
                Ok((row.try_get("name")?, row.try_get("body")?))
            })
            .collect()
    }

    async fn save_template(&self, name: &str, body: &str, now: DateTime<Utc>) -> RentalResult<()> {
        sqlx::query(
            r#"
            INSERT INTO message_template (name, body, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(body)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn clear_templates(&self) -> RentalResult<()> {
        sqlx::query("DELETE FROM message_template")
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
