//! Ledger DTOs

use callora_core::models::LedgerEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One ledger entry in an account statement
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntryResponse {
    pub id: i64,
    pub account_id: i64,
    /// Signed coin amount (negative for charges)
    pub amount: i64,
    pub category: String,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            account_id: entry.account_id,
            amount: entry.amount,
            category: entry.category.to_string(),
            session_id: entry.session_id,
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callora_core::models::LedgerCategory;

    #[test]
    fn test_ledger_response_conversion() {
        let entry = LedgerEntry {
            id: 7,
            account_id: 10,
            amount: -30,
            category: LedgerCategory::CallCharge,
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };

        let response = LedgerEntryResponse::from(entry);
        assert_eq!(response.amount, -30);
        assert_eq!(response.category, "call_charge");
    }
}
