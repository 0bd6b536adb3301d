//! Call session DTOs
//!
//! One versioned session representation, returned identically from every
//! transition endpoint; the credential field is populated only by Accept.

use callora_core::{
    models::{CallSession, CallStatus, MediaType},
    traits::JoinCredential,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to initiate a call
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitiateCallRequest {
    /// Calling account
    #[validate(range(min = 1))]
    pub caller_id: i64,

    /// Receiving account
    #[validate(range(min = 1))]
    pub receiver_id: i64,

    /// Requested media type
    pub media_type: MediaType,
}

/// Request body for accept/reject/cancel transitions
///
/// The acting account id is injected by the gateway from the authenticated
/// session; this core only verifies it against the call's parties.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransitionRequest {
    /// Acting account
    #[validate(range(min = 1))]
    pub account_id: i64,
}

/// Request to end a call
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EndCallRequest {
    /// Acting account
    #[validate(range(min = 1))]
    pub account_id: i64,

    /// Client-side duration measurement, kept for anomaly detection only;
    /// the server-computed duration is authoritative
    #[validate(range(min = 0))]
    pub reported_duration_secs: Option<i64>,
}

/// Request to rate an ended call
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateCallRequest {
    /// Acting account (must be the caller)
    #[validate(range(min = 1))]
    pub account_id: i64,

    /// Rating, 1-5
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,

    /// Optional free-text feedback
    #[validate(length(max = 500))]
    pub feedback: Option<String>,
}

/// Filter parameters for the session history listing
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SessionFilterParams {
    /// Restrict to sessions where this account is a party
    #[serde(default, deserialize_with = "super::common::deserialize_optional_number")]
    pub account_id: Option<i64>,

    /// Restrict to one lifecycle state
    pub status: Option<String>,

    #[serde(flatten)]
    #[validate(nested)]
    pub pagination: super::common::PaginationParams,
}

/// Join credential payload, present only in Accept responses
#[derive(Debug, Clone, Serialize)]
pub struct CredentialResponse {
    /// Opaque join token for the media channel
    pub token: String,

    /// Token expiry
    pub expires_at: DateTime<Utc>,
}

impl From<JoinCredential> for CredentialResponse {
    fn from(credential: JoinCredential) -> Self {
        Self {
            token: credential.token,
            expires_at: credential.expires_at,
        }
    }
}

/// The session representation every endpoint returns
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub channel_id: Uuid,
    pub caller_id: i64,
    pub receiver_id: i64,
    pub media_type: MediaType,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub coins_charged: i64,
    pub coins_earned: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    /// Populated only by Accept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialResponse>,
}

impl SessionResponse {
    /// Attach the join credential to an Accept response
    pub fn with_credential(mut self, credential: JoinCredential) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

impl From<CallSession> for SessionResponse {
    fn from(session: CallSession) -> Self {
        Self {
            session_id: session.id,
            channel_id: session.channel_id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            media_type: session.media_type,
            status: session.status,
            created_at: session.created_at,
            started_at: session.started_at,
            joined_at: session.joined_at,
            ended_at: session.ended_at,
            duration_secs: session.duration_secs,
            coins_charged: session.coins_charged,
            coins_earned: session.coins_credited,
            rating: session.rating,
            end_reason: session.end_reason.map(|r| r.to_string()),
            credential: None,
        }
    }
}
