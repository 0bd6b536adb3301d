//! Call lifecycle service
//!
//! Owns every write to sessions, busy flags, balances, and the ledger:
//! admission, the four client transitions, the post-call rating, and the
//! forced transitions the reaper drives. Each check-and-mutate runs as one
//! database transaction with the involved rows locked `FOR UPDATE`, account
//! rows always taken in ascending id order. The credential issuer is only
//! ever called with no locks held.

use callora_core::{
    admission, billing,
    models::{Account, Actor, CallSession, CallStatus, EndReason, MediaType},
    traits::{BlockRepository, CredentialIssuer, JoinCredential, SessionRepository},
    AppError, AppResult,
};
use callora_db::{AccountRow, SessionRow, ACCOUNT_COLUMNS, SESSION_COLUMNS};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Client-reported durations further than this from the server-computed
/// figure are logged for anomaly follow-up.
const DURATION_DIVERGENCE_TOLERANCE_SECS: i64 = 5;

/// Unbilled terminal transitions share one code path; this selects the
/// guard and the recorded reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnbilledTermination {
    Reject,
    Cancel,
}

/// Call lifecycle service
///
/// Generic over the session/block repositories and the credential issuer so
/// tests can substitute doubles; production wiring uses the Pg + HTTP
/// implementations (see `PgCallService` in the crate root).
pub struct CallService<S, B, C>
where
    S: SessionRepository,
    B: BlockRepository,
    C: CredentialIssuer,
{
    session_repo: Arc<S>,
    block_repo: Arc<B>,
    issuer: Arc<C>,
    pool: PgPool,
}

impl<S, B, C> CallService<S, B, C>
where
    S: SessionRepository,
    B: BlockRepository,
    C: CredentialIssuer,
{
    /// Create a new call service
    pub fn new(session_repo: Arc<S>, block_repo: Arc<B>, issuer: Arc<C>, pool: PgPool) -> Self {
        Self {
            session_repo,
            block_repo,
            issuer,
            pool,
        }
    }

    // ==================== Admission ====================

    /// Run the admission pipeline and, on success, create a RINGING session
    /// with both parties marked busy.
    ///
    /// The pipeline is evaluated twice: once against unlocked snapshots for
    /// a cheap, specific rejection, then again against rows locked
    /// `FOR UPDATE` inside the transaction that marks busy, so two
    /// concurrent initiations against one receiver cannot both pass the
    /// busy check.
    #[instrument(skip(self))]
    pub async fn initiate(
        &self,
        caller_id: i64,
        receiver_id: i64,
        media_type: MediaType,
    ) -> AppResult<CallSession> {
        let caller = self
            .fetch_account(caller_id)
            .await?
            .ok_or(AppError::UserUnavailable)?;
        let receiver = self
            .fetch_account(receiver_id)
            .await?
            .ok_or(AppError::UserUnavailable)?;

        let blocked = self
            .block_repo
            .block_exists_between(caller_id, receiver_id)
            .await?;

        // Fast path: reject without touching any locks. Also rules out
        // self-calls before the pair lock below.
        admission::evaluate(&caller, &receiver, blocked, media_type)?;

        let mut tx = self.begin().await?;

        let (caller, receiver) =
            Self::lock_account_pair(&mut tx, caller_id, receiver_id).await?;

        // Authoritative evaluation under the row locks.
        admission::evaluate(&caller, &receiver, blocked, media_type)?;

        let session = CallSession::new_ringing(caller_id, receiver_id, media_type);

        sqlx::query(
            r#"
            INSERT INTO call_sessions (
                id, channel_id, caller_id, receiver_id, media_type, status,
                created_at, duration_secs, coins_charged, coins_credited
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 0, 0)
            "#,
        )
        .bind(session.id)
        .bind(session.channel_id)
        .bind(session.caller_id)
        .bind(session.receiver_id)
        .bind(session.media_type.to_string())
        .bind(session.status.to_string())
        .bind(session.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create session: {}", e)))?;

        Self::set_busy(&mut tx, caller_id, receiver_id, true).await?;

        self.commit(tx).await?;

        info!(
            session_id = %session.id,
            caller_id,
            receiver_id,
            media = %media_type,
            "Call session admitted"
        );

        Ok(session)
    }

    // ==================== Transitions ====================

    /// Accept a ringing call (receiver only): RINGING -> ONGOING.
    ///
    /// The issuer is consulted between two short transactions so no row
    /// lock is ever held across the external call. A terminal transition
    /// that lands in that window wins; the accept then reports CONFLICT. On
    /// issuer timeout the session simply stays RINGING and the receiver may
    /// retry.
    #[instrument(skip(self))]
    pub async fn accept(
        &self,
        session_id: Uuid,
        actor: Actor,
    ) -> AppResult<(CallSession, JoinCredential)> {
        // Cheap pre-check so an unauthorized or already-transitioned accept
        // never reaches the issuer.
        let session = self.get(session_id).await?;
        session.ensure_can_accept(actor)?;

        let credential = self.issuer.issue(session.channel_id).await?;

        let mut tx = self.begin().await?;

        let mut session = Self::lock_session(&mut tx, session_id).await?;
        session.ensure_can_accept(actor)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE call_sessions
            SET status = 'ongoing',
                started_at = $2,
                joined_at = $2
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to accept session: {}", e)))?;

        self.commit(tx).await?;

        session.status = CallStatus::Ongoing;
        session.started_at = Some(now);
        session.joined_at = Some(now);

        info!(session_id = %session_id, "Call accepted, conversation started");

        Ok((session, credential))
    }

    /// Reject a ringing call (receiver only): RINGING -> REJECTED.
    #[instrument(skip(self))]
    pub async fn reject(&self, session_id: Uuid, actor: Actor) -> AppResult<CallSession> {
        self.terminate_unbilled(session_id, actor, UnbilledTermination::Reject)
            .await
    }

    /// Cancel a call that never connected (caller only, or the reaper for
    /// ring timeouts): RINGING -> CANCELLED.
    #[instrument(skip(self))]
    pub async fn cancel(&self, session_id: Uuid, actor: Actor) -> AppResult<CallSession> {
        self.terminate_unbilled(session_id, actor, UnbilledTermination::Cancel)
            .await
    }

    /// End a call (either party, or the reaper): RINGING/ONGOING -> ENDED.
    ///
    /// Billing is computed and posted, busy released, and the session
    /// finalized in one transaction; any failure rolls the whole transition
    /// back and busy stays held. Re-issuing End on an ENDED session is an
    /// idempotent no-op returning the stored result.
    #[instrument(skip(self))]
    pub async fn end(
        &self,
        session_id: Uuid,
        actor: Actor,
        reported_duration_secs: Option<i64>,
    ) -> AppResult<CallSession> {
        let mut tx = self.begin().await?;

        let session = Self::lock_session(&mut tx, session_id).await?;

        if session.status == CallStatus::Ended {
            if let Actor::Account(id) = actor {
                if session.party_of(id).is_none() {
                    return Err(AppError::UnauthorizedActor);
                }
            }
            // Already billed and released; the stored row is the result.
            return Ok(session);
        }

        session.ensure_can_end(actor)?;

        let now = Utc::now();
        let (caller, receiver) =
            Self::lock_account_pair(&mut tx, session.caller_id, session.receiver_id).await?;

        let rate = receiver.rate_for(session.media_type);
        let charge = billing::compute_charge(session.joined_at, now, rate, caller.coin_balance);

        if charge.coins_charged > 0 {
            Self::post_charge(&mut tx, &session, &caller, &receiver, charge.coins_charged)
                .await?;
        }

        Self::set_busy(&mut tx, session.caller_id, session.receiver_id, false).await?;

        let reason = session.hangup_reason(actor);
        sqlx::query(
            r#"
            UPDATE call_sessions
            SET status = 'ended',
                ended_at = $2,
                duration_secs = $3,
                coins_charged = $4,
                coins_credited = $4,
                end_reason = $5
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(charge.chargeable_secs)
        .bind(charge.coins_charged)
        .bind(reason.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to finalize session: {}", e)))?;

        self.commit(tx).await?;

        if let Some(reported) = reported_duration_secs {
            if duration_diverges(reported, charge.chargeable_secs) {
                warn!(
                    session_id = %session_id,
                    reported,
                    computed = charge.chargeable_secs,
                    "Client-reported duration diverges from server-computed duration"
                );
            }
        }

        info!(
            session_id = %session_id,
            duration_secs = charge.chargeable_secs,
            billable_minutes = charge.billable_minutes,
            coins_charged = charge.coins_charged,
            reason = %reason,
            "Call ended and billed"
        );

        let mut ended = session;
        ended.status = CallStatus::Ended;
        ended.ended_at = Some(now);
        ended.duration_secs = charge.chargeable_secs;
        ended.coins_charged = charge.coins_charged;
        ended.coins_credited = charge.coins_charged;
        ended.end_reason = Some(reason);

        Ok(ended)
    }

    /// Rate an ended call (caller only, write-once).
    #[instrument(skip(self, feedback))]
    pub async fn rate(
        &self,
        session_id: Uuid,
        actor: Actor,
        rating: i16,
        feedback: Option<String>,
    ) -> AppResult<CallSession> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let mut tx = self.begin().await?;

        let mut session = Self::lock_session(&mut tx, session_id).await?;
        session.ensure_can_rate(actor)?;

        sqlx::query(
            r#"
            UPDATE call_sessions
            SET rating = $2,
                feedback = $3
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(rating)
        .bind(&feedback)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to rate session: {}", e)))?;

        self.commit(tx).await?;

        info!(session_id = %session_id, rating, "Call rated");

        session.rating = Some(rating);
        session.feedback = feedback;

        Ok(session)
    }

    // ==================== Reads ====================

    /// Fetch a session by id
    pub async fn get(&self, session_id: Uuid) -> AppResult<CallSession> {
        self.session_repo
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
    }

    /// List sessions for the history/admin endpoint
    pub async fn list(
        &self,
        account_id: Option<i64>,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallSession>, i64)> {
        self.session_repo
            .list_filtered(account_id, status, limit, offset)
            .await
    }

    // ==================== Internals ====================

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to start transaction: {}", e)))
    }

    async fn commit(&self, tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    /// Unlocked account snapshot for the pre-lock admission pass
    async fn fetch_account(&self, id: i64) -> AppResult<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query_as::<sqlx::Postgres, AccountRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch account: {}", e)))?;

        Ok(row.map(Into::into))
    }

    /// Lock a session row for the duration of the transaction
    async fn lock_session(
        tx: &mut Transaction<'static, Postgres>,
        session_id: Uuid,
    ) -> AppResult<CallSession> {
        let query = format!(
            "SELECT {} FROM call_sessions WHERE id = $1 FOR UPDATE",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(session_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to lock session: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

        Ok(row.into())
    }

    /// Lock both account rows, always in ascending id order, and return
    /// them as (first, second).
    async fn lock_account_pair(
        tx: &mut Transaction<'static, Postgres>,
        first: i64,
        second: i64,
    ) -> AppResult<(Account, Account)> {
        let (lo, hi) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };

        let lo_account = Self::lock_account(tx, lo).await?;
        let hi_account = Self::lock_account(tx, hi).await?;

        if first <= second {
            Ok((lo_account, hi_account))
        } else {
            Ok((hi_account, lo_account))
        }
    }

    async fn lock_account(
        tx: &mut Transaction<'static, Postgres>,
        id: i64,
    ) -> AppResult<Account> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1 FOR UPDATE", ACCOUNT_COLUMNS);
        let row = sqlx::query_as::<sqlx::Postgres, AccountRow>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to lock account: {}", e)))?
            .ok_or_else(|| {
                // Accounts are soft-deleted, never removed; a vanished row
                // mid-session is a storage fault.
                AppError::Internal(format!("Account {} missing during transition", id))
            })?;

        Ok(row.into())
    }

    async fn set_busy(
        tx: &mut Transaction<'static, Postgres>,
        caller_id: i64,
        receiver_id: i64,
        busy: bool,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET is_busy = $3,
                updated_at = NOW()
            WHERE id IN ($1, $2)
            "#,
        )
        .bind(caller_id)
        .bind(receiver_id)
        .bind(busy)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update busy flags: {}", e)))?;

        Ok(())
    }

    /// Post the charge: both balance moves plus the debit/credit ledger
    /// pair, inside the caller's transaction.
    async fn post_charge(
        tx: &mut Transaction<'static, Postgres>,
        session: &CallSession,
        caller: &Account,
        receiver: &Account,
        coins: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET coin_balance = coin_balance - $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(caller.id)
        .bind(coins)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to debit caller: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE accounts
            SET coin_balance = coin_balance + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(receiver.id)
        .bind(coins)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to credit receiver: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (account_id, amount, category, session_id)
            VALUES ($1, $2, 'call_charge', $3),
                   ($4, $5, 'call_earning', $3)
            "#,
        )
        .bind(caller.id)
        .bind(-coins)
        .bind(session.id)
        .bind(receiver.id)
        .bind(coins)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to append ledger entries: {}", e)))?;

        Ok(())
    }

    /// Shared path for Reject and Cancel: terminal, unbilled, busy released.
    async fn terminate_unbilled(
        &self,
        session_id: Uuid,
        actor: Actor,
        kind: UnbilledTermination,
    ) -> AppResult<CallSession> {
        let mut tx = self.begin().await?;

        let mut session = Self::lock_session(&mut tx, session_id).await?;

        let (status, reason) = match kind {
            UnbilledTermination::Reject => {
                session.ensure_can_reject(actor)?;
                (CallStatus::Rejected, EndReason::Rejected)
            }
            UnbilledTermination::Cancel => {
                session.ensure_can_cancel(actor)?;
                let reason = if actor == Actor::System {
                    EndReason::RingTimeout
                } else {
                    EndReason::Cancelled
                };
                (CallStatus::Cancelled, reason)
            }
        };

        // Same account lock order as admission and End.
        Self::lock_account_pair(&mut tx, session.caller_id, session.receiver_id).await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE call_sessions
            SET status = $2,
                ended_at = $3,
                end_reason = $4
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(status.to_string())
        .bind(now)
        .bind(reason.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to terminate session: {}", e)))?;

        Self::set_busy(&mut tx, session.caller_id, session.receiver_id, false).await?;

        self.commit(tx).await?;

        info!(
            session_id = %session_id,
            status = %status,
            reason = %reason,
            "Call terminated without billing"
        );

        session.status = status;
        session.ended_at = Some(now);
        session.end_reason = Some(reason);

        Ok(session)
    }
}

/// Whether a client-reported duration is far enough from the computed one
/// to be worth an operator's attention.
fn duration_diverges(reported_secs: i64, computed_secs: i64) -> bool {
    (reported_secs - computed_secs).abs() > DURATION_DIVERGENCE_TOLERANCE_SECS
}
