//! Ledger repository implementation
//!
//! Read side of the append-only ledger. Entries are appended in the same
//! transaction that finalizes a session, never through this repository.

use callora_core::{
    models::{LedgerCategory, LedgerEntry},
    traits::LedgerRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of LedgerRepository
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    /// Create a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    #[instrument(skip(self))]
    async fn list_by_account(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<LedgerEntry>, i64)> {
        debug!(
            "Listing ledger entries for account {} limit {} offset {}",
            account_id, limit, offset
        );

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ledger_entries WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting ledger entries: {}", e);
                    AppError::Database(format!("Failed to count ledger entries: {}", e))
                })?;

        let rows = sqlx::query_as::<sqlx::Postgres, LedgerRow>(
            r#"
            SELECT id, account_id, amount, category, session_id, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing ledger entries: {}", e);
            AppError::Database(format!("Failed to list ledger entries: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    account_id: i64,
    amount: i64,
    category: String,
    session_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            amount: row.amount,
            category: LedgerCategory::from_str(&row.category)
                .unwrap_or(LedgerCategory::CallCharge),
            session_id: row.session_id,
            created_at: row.created_at,
        }
    }
}
