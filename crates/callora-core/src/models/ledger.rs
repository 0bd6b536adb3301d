//! Ledger entry model
//!
//! Append-only record of every balance change. The sum of an account's
//! entries since creation equals its current balance; rows are never edited
//! or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ledger entry category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCategory {
    /// Debit on the caller for a completed call
    CallCharge,
    /// Credit to the receiver for a completed call
    CallEarning,
}

impl fmt::Display for LedgerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerCategory::CallCharge => write!(f, "call_charge"),
            LedgerCategory::CallEarning => write!(f, "call_earning"),
        }
    }
}

impl LedgerCategory {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "call_charge" => Some(LedgerCategory::CallCharge),
            "call_earning" => Some(LedgerCategory::CallEarning),
            _ => None,
        }
    }
}

/// Append-only balance change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier
    pub id: i64,

    /// Account whose balance changed
    pub account_id: i64,

    /// Signed coin amount (negative for charges, positive for earnings)
    pub amount: i64,

    /// Entry category
    pub category: LedgerCategory,

    /// Session that produced this entry
    pub session_id: Uuid,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
