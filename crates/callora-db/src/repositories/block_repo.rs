//! Privacy block repository implementation
//!
//! Blocks are written by the out-of-scope profile service; admission only
//! needs the bidirectional existence check.

use callora_core::{traits::BlockRepository, AppError, AppResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, instrument};

/// PostgreSQL implementation of BlockRepository
pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    /// Create a new block repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    #[instrument(skip(self))]
    async fn block_exists_between(&self, a: i64, b: i64) -> AppResult<bool> {
        let result: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM account_blocks
                WHERE (blocker_id = $1 AND blocked_id = $2)
                   OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error checking blocks between {} and {}: {}", a, b, e);
            AppError::Database(format!("Failed to check blocks: {}", e))
        })?;

        Ok(result.0)
    }
}
