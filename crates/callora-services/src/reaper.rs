//! Stale-session reaper
//!
//! Background sweep that force-terminates sessions abandoned by crashed
//! clients or lost events, and expires lapsed presence. Every forced
//! termination goes through the same transactional transitions a client
//! would have driven, so billing and busy-release guarantees hold; there is
//! no bulk "reset all busy flags" path.

use crate::{CallService, PresenceService};
use callora_core::{
    config::CallConfig,
    models::Actor,
    traits::{AccountRepository, BlockRepository, CacheService, CredentialIssuer, SessionRepository},
    AppError, AppResult,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Counts from one reaper sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// RINGING sessions cancelled for ring timeout
    pub ring_timeouts: usize,
    /// ONGOING sessions force-ended past the conversation ceiling
    pub force_ended: usize,
    /// Accounts flipped offline for a lapsed heartbeat
    pub presence_lapsed: usize,
    /// Sessions whose forced transition failed (left for the next sweep)
    pub failures: usize,
}

/// The cutoff instants for one sweep: sessions created (ringing) or joined
/// (ongoing) before these are stale.
pub fn sweep_cutoffs(now: DateTime<Utc>, config: &CallConfig) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now - Duration::seconds(config.ring_timeout_secs),
        now - Duration::seconds(config.max_ongoing_secs),
    )
}

/// Stale-session reaper
pub struct SessionReaper<S, B, C, A, K>
where
    S: SessionRepository,
    B: BlockRepository,
    C: CredentialIssuer,
    A: AccountRepository,
    K: CacheService,
{
    call_service: Arc<CallService<S, B, C>>,
    presence: Arc<PresenceService<A, K>>,
    session_repo: Arc<S>,
    config: CallConfig,
}

impl<S, B, C, A, K> SessionReaper<S, B, C, A, K>
where
    S: SessionRepository + 'static,
    B: BlockRepository + 'static,
    C: CredentialIssuer + 'static,
    A: AccountRepository + 'static,
    K: CacheService + 'static,
{
    /// Create a new reaper
    pub fn new(
        call_service: Arc<CallService<S, B, C>>,
        presence: Arc<PresenceService<A, K>>,
        session_repo: Arc<S>,
        config: CallConfig,
    ) -> Self {
        Self {
            call_service,
            presence,
            session_repo,
            config,
        }
    }

    /// Spawn the periodic sweep loop
    pub fn spawn(self) -> JoinHandle<()> {
        let interval_secs = self.config.reaper_interval_secs;
        info!(
            interval_secs,
            ring_timeout_secs = self.config.ring_timeout_secs,
            max_ongoing_secs = self.config.max_ongoing_secs,
            "Starting stale-session reaper"
        );

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("Reaper sweep failed: {}", e);
                }
            }
        })
    }

    /// Run one sweep: cancel timed-out ringing sessions, force-end
    /// over-ceiling conversations, expire lapsed presence.
    ///
    /// Individual session failures are logged and left for the next sweep;
    /// they never abort the rest of the pass.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let (ring_cutoff, ongoing_cutoff) = sweep_cutoffs(Utc::now(), &self.config);
        let mut report = SweepReport::default();

        for session_id in self.session_repo.stale_ringing(ring_cutoff).await? {
            match self.call_service.cancel(session_id, Actor::System).await {
                Ok(_) => {
                    info!(session_id = %session_id, "Reaped ring-timeout session");
                    report.ring_timeouts += 1;
                }
                // A client transition won the race between scan and cancel.
                Err(AppError::Conflict(_)) => {
                    debug!(session_id = %session_id, "Session transitioned before reap");
                }
                Err(e) => {
                    error!(session_id = %session_id, "Failed to reap ringing session: {}", e);
                    report.failures += 1;
                }
            }
        }

        for session_id in self.session_repo.stale_ongoing(ongoing_cutoff).await? {
            match self.call_service.end(session_id, Actor::System, None).await {
                Ok(session) => {
                    info!(
                        session_id = %session_id,
                        coins_charged = session.coins_charged,
                        "Force-ended stale conversation"
                    );
                    report.force_ended += 1;
                }
                Err(AppError::Conflict(_)) => {
                    debug!(session_id = %session_id, "Session transitioned before reap");
                }
                Err(e) => {
                    error!(session_id = %session_id, "Failed to force-end session: {}", e);
                    report.failures += 1;
                }
            }
        }

        match self.presence.sweep_lapsed().await {
            Ok(lapsed) => report.presence_lapsed = lapsed,
            // Presence is advisory; a cache outage postpones the sweep.
            Err(e) => warn!("Presence sweep skipped: {}", e),
        }

        if report != SweepReport::default() {
            info!(
                ring_timeouts = report.ring_timeouts,
                force_ended = report.force_ended,
                presence_lapsed = report.presence_lapsed,
                failures = report.failures,
                "Reaper sweep completed"
            );
        }

        Ok(report)
    }
}
