//! Call session repository implementation
//!
//! PostgreSQL-backed reads for call sessions: lookups, filtered history
//! listings, and the stale-session scans the reaper runs. Lifecycle writes
//! happen inside the call service's transactions.

use callora_core::{
    models::{CallSession, CallStatus, EndReason, MediaType},
    traits::SessionRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// Column list matching [`SessionRow`]; shared with the call service's
/// `FOR UPDATE` lock queries.
pub const SESSION_COLUMNS: &str = "id, channel_id, caller_id, receiver_id, media_type, status, \
     created_at, started_at, joined_at, ended_at, duration_secs, \
     coins_charged, coins_credited, rating, feedback, end_reason";

/// PostgreSQL implementation of SessionRepository
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallSession>> {
        debug!("Finding session by id: {}", id);

        let query = format!("SELECT {} FROM call_sessions WHERE id = $1", SESSION_COLUMNS);
        let result = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding session {}: {}", id, e);
                AppError::Database(format!("Failed to find session: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_filtered(
        &self,
        account_id: Option<i64>,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallSession>, i64)> {
        debug!(
            "Listing sessions: account={:?}, status={:?}, limit={}, offset={}",
            account_id, status, limit, offset
        );

        let status_str = status.map(|s| s.to_string());

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM call_sessions
            WHERE ($1::BIGINT IS NULL OR caller_id = $1 OR receiver_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(account_id)
        .bind(&status_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting sessions: {}", e);
            AppError::Database(format!("Failed to count sessions: {}", e))
        })?;

        let query = format!(
            r#"
            SELECT {}
            FROM call_sessions
            WHERE ($1::BIGINT IS NULL OR caller_id = $1 OR receiver_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            SESSION_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(account_id)
            .bind(&status_str)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing sessions: {}", e);
                AppError::Database(format!("Failed to list sessions: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self))]
    async fn stale_ringing(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM call_sessions
            WHERE status = 'ringing' AND created_at < $1
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error scanning stale ringing sessions: {}", e);
            AppError::Database(format!("Failed to scan stale sessions: {}", e))
        })?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self))]
    async fn stale_ongoing(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM call_sessions
            WHERE status = 'ongoing' AND joined_at IS NOT NULL AND joined_at < $1
            ORDER BY joined_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error scanning stale ongoing sessions: {}", e);
            AppError::Database(format!("Failed to scan stale sessions: {}", e))
        })?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub caller_id: i64,
    pub receiver_id: i64,
    pub media_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub coins_charged: i64,
    pub coins_credited: i64,
    pub rating: Option<i16>,
    pub feedback: Option<String>,
    pub end_reason: Option<String>,
}

impl From<SessionRow> for CallSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            channel_id: row.channel_id,
            caller_id: row.caller_id,
            receiver_id: row.receiver_id,
            media_type: MediaType::from_str(&row.media_type).unwrap_or(MediaType::Audio),
            status: CallStatus::from_str(&row.status).unwrap_or(CallStatus::Ended),
            created_at: row.created_at,
            started_at: row.started_at,
            joined_at: row.joined_at,
            ended_at: row.ended_at,
            duration_secs: row.duration_secs,
            coins_charged: row.coins_charged,
            coins_credited: row.coins_credited,
            rating: row.rating,
            feedback: row.feedback,
            end_reason: row.end_reason.as_deref().and_then(EndReason::from_str),
        }
    }
}
