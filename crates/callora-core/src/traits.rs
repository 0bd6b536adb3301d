//! Common traits for repositories and external collaborators
//!
//! Defines the seams between the call core and its storage, cache, and the
//! real-time media provider.

use crate::error::AppError;
use crate::models::{Account, CallSession, CallStatus, LedgerEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Account repository trait
///
/// Busy flags and balances are mutated only inside the call service's
/// transactions; this trait covers the plain reads plus the presence write
/// path.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find account by ID
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AppError>;

    /// Set the online flag; returns false if the account doesn't exist
    async fn set_online(&self, id: i64, online: bool) -> Result<bool, AppError>;

    /// IDs of all accounts currently flagged online
    async fn online_ids(&self) -> Result<Vec<i64>, AppError>;
}

/// Call session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Find session by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallSession>, AppError>;

    /// List sessions with filtering and pagination
    async fn list_filtered(
        &self,
        account_id: Option<i64>,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CallSession>, i64), AppError>;

    /// Sessions still RINGING that were created before the cutoff
    async fn stale_ringing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;

    /// Sessions still ONGOING whose conversation started before the cutoff
    async fn stale_ongoing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;
}

/// Ledger repository trait
///
/// Entries are appended inside billing transactions; this trait covers the
/// read side.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// List entries for an account, newest first, with pagination
    async fn list_by_account(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LedgerEntry>, i64), AppError>;
}

/// Privacy block repository trait (read-only; blocks are written by the
/// profile service)
#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// True if either account has blocked the other
    async fn block_exists_between(&self, a: i64, b: i64) -> Result<bool, AppError>;
}

/// Join credential issued by the real-time media provider
#[derive(Debug, Clone, Serialize)]
pub struct JoinCredential {
    /// Opaque join token for the media channel
    pub token: String,

    /// Expiry of the token
    pub expires_at: DateTime<Utc>,
}

/// Session Credential Issuer
///
/// External collaborator producing short-lived join tokens for a media
/// channel. Called once per Accept, after the state transition is
/// validated and with no storage locks held.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Issue a join credential for the given channel
    async fn issue(&self, channel_id: Uuid) -> Result<JoinCredential, AppError>;
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
