//! Presence DTOs

use serde::Deserialize;
use validator::Validate;

/// Heartbeat or disconnect signal from the connectivity collaborator
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PresenceRequest {
    /// Account the signal is about
    #[validate(range(min = 1))]
    pub account_id: i64,
}
