//! Presence service
//!
//! Ingests online/offline signals from the connectivity collaborator and
//! keeps the two presence representations in step: the authoritative
//! `is_online` column admission reads, and the TTL-keyed Redis heartbeat
//! whose lapse is how crashed clients eventually read as offline.

use callora_cache::keys::presence_key;
use callora_core::{
    traits::{AccountRepository, CacheService},
    AppError, AppResult,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Presence service
pub struct PresenceService<A, C>
where
    A: AccountRepository,
    C: CacheService,
{
    account_repo: Arc<A>,
    cache: Arc<C>,
    ttl_secs: u64,
}

impl<A, C> PresenceService<A, C>
where
    A: AccountRepository,
    C: CacheService,
{
    /// Create a new presence service
    pub fn new(account_repo: Arc<A>, cache: Arc<C>, ttl_secs: u64) -> Self {
        Self {
            account_repo,
            cache,
            ttl_secs,
        }
    }

    /// Record a heartbeat: mark the account online and refresh its TTL key.
    ///
    /// The heartbeat key is advisory; a cache failure is logged and the
    /// authoritative flag still flips, so a Redis blip never takes users
    /// offline.
    #[instrument(skip(self))]
    pub async fn heartbeat(&self, account_id: i64) -> AppResult<()> {
        let found = self.account_repo.set_online(account_id, true).await?;
        if !found {
            return Err(AppError::NotFound(format!(
                "Account {} not found",
                account_id
            )));
        }

        if let Err(e) = self
            .cache
            .set(&presence_key(account_id), &Utc::now(), self.ttl_secs)
            .await
        {
            warn!("Failed to refresh heartbeat key for {}: {}", account_id, e);
        }

        debug!("Heartbeat recorded for account {}", account_id);
        Ok(())
    }

    /// Explicit disconnect: mark the account offline and drop its key.
    #[instrument(skip(self))]
    pub async fn mark_offline(&self, account_id: i64) -> AppResult<()> {
        let found = self.account_repo.set_online(account_id, false).await?;
        if !found {
            return Err(AppError::NotFound(format!(
                "Account {} not found",
                account_id
            )));
        }

        if let Err(e) = self.cache.delete(&presence_key(account_id)).await {
            warn!("Failed to drop heartbeat key for {}: {}", account_id, e);
        }

        debug!("Account {} marked offline", account_id);
        Ok(())
    }

    /// Flip accounts whose heartbeat key has lapsed to offline.
    ///
    /// Returns the number of accounts flipped. A cache error aborts the
    /// sweep instead of treating every heartbeat as lapsed, so a Redis
    /// outage cannot mass-offline the user base.
    #[instrument(skip(self))]
    pub async fn sweep_lapsed(&self) -> AppResult<usize> {
        let mut lapsed = 0;

        for account_id in self.account_repo.online_ids().await? {
            if self.cache.exists(&presence_key(account_id)).await? {
                continue;
            }
            if self.account_repo.set_online(account_id, false).await? {
                lapsed += 1;
            }
        }

        if lapsed > 0 {
            info!("Presence sweep flipped {} lapsed accounts offline", lapsed);
        }

        Ok(lapsed)
    }
}
