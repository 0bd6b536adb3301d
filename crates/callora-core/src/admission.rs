//! Call admission rules
//!
//! The fixed-order check pipeline run before a session is created. Callers
//! of the API rely on receiving the most specific rejection, so the order
//! here is a contract, not an implementation detail.
//!
//! This function is pure: it judges a snapshot of both accounts. The
//! atomicity that makes the busy/balance checks trustworthy comes from the
//! storage layer, which evaluates it against rows locked `FOR UPDATE` and
//! applies the busy-marking in the same transaction.

use crate::error::AppError;
use crate::models::{Account, MediaType};
use crate::AppResult;

/// Evaluate the admission pipeline for one initiation attempt.
///
/// Check order (short-circuits at the first failure):
/// 1. caller not soft-deleted
/// 2. caller not suspended
/// 3. receiver not soft-deleted
/// 4. no self-calling
/// 5. no block in either direction (`blocked`, resolved by the caller of
///    this function), surfaced as the generic unavailable rejection
/// 6. receiver online
/// 7. receiver not busy, then caller not busy (one active session per
///    account, both directions)
/// 8. requested media type enabled by the receiver
/// 9. caller balance covers one minute at the receiver's rate
///
/// Returns the receiver's per-minute rate for the requested media type.
pub fn evaluate(
    caller: &Account,
    receiver: &Account,
    blocked: bool,
    media: MediaType,
) -> AppResult<i64> {
    if caller.is_deleted() {
        return Err(AppError::UserUnavailable);
    }
    if !caller.can_place_calls() {
        return Err(AppError::UserUnavailable);
    }
    if receiver.is_deleted() {
        return Err(AppError::UserUnavailable);
    }
    if caller.id == receiver.id {
        return Err(AppError::SelfCall);
    }
    if blocked {
        return Err(AppError::UserUnavailable);
    }
    if !receiver.is_online {
        return Err(AppError::UserOffline);
    }
    if receiver.is_busy {
        return Err(AppError::UserBusy);
    }
    if caller.is_busy {
        return Err(AppError::UserBusy);
    }
    if !receiver.media_enabled(media) {
        return Err(AppError::CallTypeDisabled(media.to_string()));
    }

    let rate = receiver.rate_for(media);
    if caller.coin_balance < rate {
        return Err(AppError::InsufficientBalance {
            required: rate,
            available: caller.coin_balance,
        });
    }

    Ok(rate)
}
