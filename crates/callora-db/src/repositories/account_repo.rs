//! Account repository implementation
//!
//! PostgreSQL-backed reads for account entities plus the presence write
//! path. Busy flags and balances are only ever written inside the call
//! service's transactions, never through this repository.

use callora_core::{
    models::{Account, AccountStatus},
    traits::AccountRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// Column list matching [`AccountRow`]; shared with the call service's
/// `FOR UPDATE` lock queries so the row mapping stays in one place.
pub const ACCOUNT_COLUMNS: &str = "id, coin_balance, is_busy, is_online, status, \
     audio_rate_coins, video_rate_coins, audio_enabled, video_enabled, \
     created_at, updated_at";

/// PostgreSQL implementation of AccountRepository
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Account>> {
        debug!("Finding account by id: {}", id);

        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let result = sqlx::query_as::<sqlx::Postgres, AccountRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding account {}: {}", id, e);
                AppError::Database(format!("Failed to find account: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn set_online(&self, id: i64, online: bool) -> AppResult<bool> {
        debug!("Setting account {} online flag to {}", id, online);

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET is_online = $2,
                updated_at = NOW()
            WHERE id = $1 AND status != 'deleted'
            "#,
        )
        .bind(id)
        .bind(online)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating presence for {}: {}", id, e);
            AppError::Database(format!("Failed to update presence: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn online_ids(&self) -> AppResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM accounts WHERE is_online = TRUE")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing online accounts: {}", e);
                AppError::Database(format!("Failed to list online accounts: {}", e))
            })?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub coin_balance: i64,
    pub is_busy: bool,
    pub is_online: bool,
    pub status: String,
    pub audio_rate_coins: i64,
    pub video_rate_coins: i64,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            coin_balance: row.coin_balance,
            is_busy: row.is_busy,
            is_online: row.is_online,
            status: AccountStatus::from_str(&row.status).unwrap_or(AccountStatus::Active),
            audio_rate_coins: row.audio_rate_coins,
            video_rate_coins: row.video_rate_coins,
            audio_enabled: row.audio_enabled,
            video_enabled: row.video_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
