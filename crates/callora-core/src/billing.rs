//! Billing computation
//!
//! Pure duration-to-coins arithmetic for a terminating session. Posting the
//! result (balance updates plus ledger entries) happens in the storage
//! transaction that also finalizes the session, so these functions stay
//! free of I/O and fully testable.

use chrono::{DateTime, Utc};

/// Outcome of the billing computation for one terminating session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeBreakdown {
    /// Conversation seconds from receiver-joined to ended, clamped >= 0
    pub chargeable_secs: i64,

    /// Ceiling-rounded billable minutes
    pub billable_minutes: i64,

    /// Coins to debit the caller and credit the receiver
    pub coins_charged: i64,
}

impl ChargeBreakdown {
    /// A zero charge (unanswered call, or zero-rate receiver)
    pub const ZERO: ChargeBreakdown = ChargeBreakdown {
        chargeable_secs: 0,
        billable_minutes: 0,
        coins_charged: 0,
    };
}

/// Ceiling-rounded minutes for a chargeable duration
///
/// A call lasting 1 second bills as 1 minute; non-positive durations bill
/// as zero.
#[inline]
pub fn billable_minutes(chargeable_secs: i64) -> i64 {
    if chargeable_secs <= 0 {
        return 0;
    }
    (chargeable_secs + 59) / 60
}

/// Compute the charge for a session terminating at `ended_at`.
///
/// - Never joined (ended while still ringing): zero charge, no ledger
///   entries will be written.
/// - Ring time is excluded: the clock starts at `joined_at`.
/// - The charge is clamped to the caller's current balance; the call
///   already happened, so the shortfall is absorbed rather than rejected,
///   and the clamped figure is both debited and credited (zero-sum).
pub fn compute_charge(
    joined_at: Option<DateTime<Utc>>,
    ended_at: DateTime<Utc>,
    rate_per_minute: i64,
    caller_balance: i64,
) -> ChargeBreakdown {
    let joined_at = match joined_at {
        Some(t) => t,
        None => return ChargeBreakdown::ZERO,
    };

    let chargeable_secs = (ended_at - joined_at).num_seconds().max(0);
    let minutes = billable_minutes(chargeable_secs);
    let full_charge = minutes.saturating_mul(rate_per_minute.max(0));
    let coins_charged = full_charge.min(caller_balance.max(0));

    ChargeBreakdown {
        chargeable_secs,
        billable_minutes: minutes,
        coins_charged,
    }
}
