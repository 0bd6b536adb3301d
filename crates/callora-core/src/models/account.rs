//! Account model
//!
//! Represents the parties able to place or receive calls, including the
//! busy/online presence flags and the per-minute rates a receiver charges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::MediaType;

/// Account status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Active account - can make and receive calls
    #[default]
    Active,
    /// Suspended account - administratively blocked from calling
    Suspended,
    /// Soft-deleted account - unresolvable for admission
    Deleted,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Suspended => write!(f, "suspended"),
            AccountStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl AccountStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "deleted" => Some(AccountStatus::Deleted),
            _ => None,
        }
    }
}

/// Account entity
///
/// Balance and the busy flag are owned exclusively by this core: every write
/// goes through an admission or transition transaction. The online flag is
/// fed by the connectivity collaborator through the presence interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (assigned by the registration system)
    pub id: i64,

    /// Current coin balance, never negative
    pub coin_balance: i64,

    /// True iff this account is a party to exactly one ringing/ongoing session
    pub is_busy: bool,

    /// Connectivity flag, written via the presence interface
    pub is_online: bool,

    /// Account status
    pub status: AccountStatus,

    /// Coins charged per minute of audio conversation with this receiver
    pub audio_rate_coins: i64,

    /// Coins charged per minute of video conversation with this receiver
    pub video_rate_coins: i64,

    /// Whether this receiver accepts audio calls
    pub audio_enabled: bool,

    /// Whether this receiver accepts video calls
    pub video_enabled: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Check if the account is soft-deleted
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.status == AccountStatus::Deleted
    }

    /// Check if the account may place outbound calls
    #[inline]
    pub fn can_place_calls(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Per-minute rate this receiver charges for the given media type
    #[inline]
    pub fn rate_for(&self, media: MediaType) -> i64 {
        match media {
            MediaType::Audio => self.audio_rate_coins,
            MediaType::Video => self.video_rate_coins,
        }
    }

    /// Whether this receiver has the given media type enabled
    #[inline]
    pub fn media_enabled(&self, media: MediaType) -> bool {
        match media {
            MediaType::Audio => self.audio_enabled,
            MediaType::Video => self.video_enabled,
        }
    }
}

impl Default for Account {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            coin_balance: 0,
            is_busy: false,
            is_online: false,
            status: AccountStatus::Active,
            audio_rate_coins: 0,
            video_rate_coins: 0,
            audio_enabled: true,
            video_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}
