//! Call session model
//!
//! The authoritative record of one attempted-or-completed call, together
//! with the state-machine guards every transition must pass. The guards are
//! pure so the transition rules can be tested without a database; the
//! serialization of concurrent transitions happens at the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppResult;

/// Call media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

impl MediaType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "audio" => Some(MediaType::Audio),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

/// Call session status
///
/// RINGING -> ONGOING -> ENDED, with REJECTED and CANCELLED as the
/// pre-conversation terminal branches. Terminal rows are immutable apart
/// from the post-call rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Ongoing,
    Ended,
    Rejected,
    Cancelled,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Ringing => write!(f, "ringing"),
            CallStatus::Ongoing => write!(f, "ongoing"),
            CallStatus::Ended => write!(f, "ended"),
            CallStatus::Rejected => write!(f, "rejected"),
            CallStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl CallStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ringing" => Some(CallStatus::Ringing),
            "ongoing" => Some(CallStatus::Ongoing),
            "ended" => Some(CallStatus::Ended),
            "rejected" => Some(CallStatus::Rejected),
            "cancelled" => Some(CallStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Ended | CallStatus::Rejected | CallStatus::Cancelled
        )
    }

    /// States that hold both parties busy
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Ringing | CallStatus::Ongoing)
    }
}

/// How a session reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    CallerHangup,
    ReceiverHangup,
    Rejected,
    Cancelled,
    RingTimeout,
    StaleReaped,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::CallerHangup => write!(f, "caller_hangup"),
            EndReason::ReceiverHangup => write!(f, "receiver_hangup"),
            EndReason::Rejected => write!(f, "rejected"),
            EndReason::Cancelled => write!(f, "cancelled"),
            EndReason::RingTimeout => write!(f, "ring_timeout"),
            EndReason::StaleReaped => write!(f, "stale_reaped"),
        }
    }
}

impl EndReason {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "caller_hangup" => Some(EndReason::CallerHangup),
            "receiver_hangup" => Some(EndReason::ReceiverHangup),
            "rejected" => Some(EndReason::Rejected),
            "cancelled" => Some(EndReason::Cancelled),
            "ring_timeout" => Some(EndReason::RingTimeout),
            "stale_reaped" => Some(EndReason::StaleReaped),
            _ => None,
        }
    }
}

/// Who is driving a transition
///
/// Client transitions carry the acting account id; the stale-session reaper
/// acts as `System`, which bypasses the party check but never the state
/// check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Account(i64),
    System,
}

/// Which side of the call an account is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Caller,
    Receiver,
}

/// Call session entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Unique session identifier
    pub id: Uuid,

    /// Media channel identifier, generated at admission and handed to the
    /// real-time provider unchanged for the session's lifetime
    pub channel_id: Uuid,

    /// Calling account
    pub caller_id: i64,

    /// Receiving account
    pub receiver_id: i64,

    /// Requested media type
    pub media_type: MediaType,

    /// Current lifecycle state
    pub status: CallStatus,

    /// Admission timestamp
    pub created_at: DateTime<Utc>,

    /// Session establishment timestamp (accept)
    pub started_at: Option<DateTime<Utc>>,

    /// Conversation start: the receiver joined. Billing anchors here, so
    /// ring time is never charged.
    pub joined_at: Option<DateTime<Utc>>,

    /// Termination timestamp
    pub ended_at: Option<DateTime<Utc>>,

    /// Chargeable conversation seconds, written once at termination
    pub duration_secs: i64,

    /// Coins debited from the caller, written once at termination
    pub coins_charged: i64,

    /// Coins credited to the receiver, written once at termination
    pub coins_credited: i64,

    /// Post-call rating from the caller (1-5)
    pub rating: Option<i16>,

    /// Optional free-text feedback accompanying the rating
    pub feedback: Option<String>,

    /// How the session terminated
    pub end_reason: Option<EndReason>,
}

impl CallSession {
    /// Create a fresh RINGING session at admission time
    pub fn new_ringing(caller_id: i64, receiver_id: i64, media_type: MediaType) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            caller_id,
            receiver_id,
            media_type,
            status: CallStatus::Ringing,
            created_at: Utc::now(),
            started_at: None,
            joined_at: None,
            ended_at: None,
            duration_secs: 0,
            coins_charged: 0,
            coins_credited: 0,
            rating: None,
            feedback: None,
            end_reason: None,
        }
    }

    /// Which side of this call the account is on, if any
    pub fn party_of(&self, account_id: i64) -> Option<PartyRole> {
        if account_id == self.caller_id {
            Some(PartyRole::Caller)
        } else if account_id == self.receiver_id {
            Some(PartyRole::Receiver)
        } else {
            None
        }
    }

    fn ensure_role(&self, actor: Actor, required: PartyRole) -> AppResult<()> {
        match actor {
            Actor::System => Ok(()),
            Actor::Account(id) => {
                if self.party_of(id) == Some(required) {
                    Ok(())
                } else {
                    Err(AppError::UnauthorizedActor)
                }
            }
        }
    }

    fn conflict(&self, attempted: &str) -> AppError {
        AppError::Conflict(format!(
            "Cannot {} a session in state {}",
            attempted, self.status
        ))
    }

    /// Guard for Accept: receiver only, RINGING -> ONGOING
    pub fn ensure_can_accept(&self, actor: Actor) -> AppResult<()> {
        self.ensure_role(actor, PartyRole::Receiver)?;
        if self.status != CallStatus::Ringing {
            return Err(self.conflict("accept"));
        }
        Ok(())
    }

    /// Guard for Reject: receiver only, RINGING -> REJECTED
    pub fn ensure_can_reject(&self, actor: Actor) -> AppResult<()> {
        self.ensure_role(actor, PartyRole::Receiver)?;
        if self.status != CallStatus::Ringing {
            return Err(self.conflict("reject"));
        }
        Ok(())
    }

    /// Guard for Cancel: caller only, RINGING -> CANCELLED, or ONGOING with
    /// no receiver-joined timestamp yet
    pub fn ensure_can_cancel(&self, actor: Actor) -> AppResult<()> {
        self.ensure_role(actor, PartyRole::Caller)?;
        let cancellable = self.status == CallStatus::Ringing
            || (self.status == CallStatus::Ongoing && self.joined_at.is_none());
        if !cancellable {
            return Err(self.conflict("cancel"));
        }
        Ok(())
    }

    /// Guard for End: either party, RINGING/ONGOING -> ENDED
    ///
    /// End on an already-ENDED session is handled before this guard as an
    /// idempotent no-op; here ENDED is a conflict like the other terminals.
    pub fn ensure_can_end(&self, actor: Actor) -> AppResult<()> {
        if let Actor::Account(id) = actor {
            if self.party_of(id).is_none() {
                return Err(AppError::UnauthorizedActor);
            }
        }
        if self.status.is_terminal() {
            return Err(self.conflict("end"));
        }
        Ok(())
    }

    /// Guard for Rate: caller only, on an ENDED session, write-once
    pub fn ensure_can_rate(&self, actor: Actor) -> AppResult<()> {
        self.ensure_role(actor, PartyRole::Caller)?;
        if self.status != CallStatus::Ended {
            return Err(self.conflict("rate"));
        }
        if self.rating.is_some() {
            return Err(AppError::Conflict(
                "Session has already been rated".to_string(),
            ));
        }
        Ok(())
    }

    /// Hangup reason derived from which party issued the End
    pub fn hangup_reason(&self, actor: Actor) -> EndReason {
        match actor {
            Actor::Account(id) if self.party_of(id) == Some(PartyRole::Receiver) => {
                EndReason::ReceiverHangup
            }
            Actor::Account(_) => EndReason::CallerHangup,
            Actor::System => EndReason::StaleReaped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ringing() -> CallSession {
        CallSession::new_ringing(1, 2, MediaType::Audio)
    }

    #[test]
    fn test_accept_requires_receiver() {
        let session = ringing();

        assert!(session.ensure_can_accept(Actor::Account(2)).is_ok());
        assert!(matches!(
            session.ensure_can_accept(Actor::Account(1)),
            Err(AppError::UnauthorizedActor)
        ));
        assert!(matches!(
            session.ensure_can_accept(Actor::Account(99)),
            Err(AppError::UnauthorizedActor)
        ));
    }

    #[test]
    fn test_accept_on_terminal_is_conflict() {
        let mut session = ringing();
        session.status = CallStatus::Ended;

        assert!(matches!(
            session.ensure_can_accept(Actor::Account(2)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_second_accept_is_conflict() {
        let mut session = ringing();
        session.status = CallStatus::Ongoing;
        session.joined_at = Some(Utc::now());

        assert!(matches!(
            session.ensure_can_accept(Actor::Account(2)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_cancel_rules() {
        let session = ringing();
        assert!(session.ensure_can_cancel(Actor::Account(1)).is_ok());
        assert!(matches!(
            session.ensure_can_cancel(Actor::Account(2)),
            Err(AppError::UnauthorizedActor)
        ));

        // Once the receiver has joined, the caller must End, not Cancel.
        let mut joined = ringing();
        joined.status = CallStatus::Ongoing;
        joined.joined_at = Some(Utc::now());
        assert!(matches!(
            joined.ensure_can_cancel(Actor::Account(1)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_end_allows_either_party_but_not_strangers() {
        let mut session = ringing();
        session.status = CallStatus::Ongoing;

        assert!(session.ensure_can_end(Actor::Account(1)).is_ok());
        assert!(session.ensure_can_end(Actor::Account(2)).is_ok());
        assert!(session.ensure_can_end(Actor::System).is_ok());
        assert!(matches!(
            session.ensure_can_end(Actor::Account(3)),
            Err(AppError::UnauthorizedActor)
        ));
    }

    #[test]
    fn test_end_on_cancelled_is_conflict() {
        let mut session = ringing();
        session.status = CallStatus::Cancelled;

        assert!(matches!(
            session.ensure_can_end(Actor::Account(1)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_rate_is_caller_only_post_ended_write_once() {
        let mut session = ringing();
        session.status = CallStatus::Ended;

        assert!(session.ensure_can_rate(Actor::Account(1)).is_ok());
        assert!(matches!(
            session.ensure_can_rate(Actor::Account(2)),
            Err(AppError::UnauthorizedActor)
        ));

        session.rating = Some(4);
        assert!(matches!(
            session.ensure_can_rate(Actor::Account(1)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_hangup_reason_by_actor() {
        let mut session = ringing();
        session.status = CallStatus::Ongoing;

        assert_eq!(
            session.hangup_reason(Actor::Account(1)),
            EndReason::CallerHangup
        );
        assert_eq!(
            session.hangup_reason(Actor::Account(2)),
            EndReason::ReceiverHangup
        );
        assert_eq!(session.hangup_reason(Actor::System), EndReason::StaleReaped);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(CallStatus::from_str("ringing"), Some(CallStatus::Ringing));
        assert_eq!(CallStatus::from_str("ENDED"), Some(CallStatus::Ended));
        assert_eq!(CallStatus::from_str("nope"), None);
        assert!(CallStatus::Rejected.is_terminal());
        assert!(CallStatus::Ongoing.is_active());
    }
}
