//! Integration tests for session API DTOs
//!
//! These tests exercise the request validation and response shaping the
//! handlers rely on. For full end-to-end coverage, see the DATABASE_URL
//! gated tests in callora-services.

#[cfg(test)]
mod tests {
    use callora_api::dto::{
        EndCallRequest, InitiateCallRequest, PaginationParams, RateCallRequest, SessionResponse,
        TransitionRequest,
    };
    use callora_core::models::{CallSession, CallStatus, EndReason, MediaType};
    use chrono::Utc;
    use validator::Validate;

    #[test]
    fn test_initiate_request_validation() {
        let valid = InitiateCallRequest {
            caller_id: 1,
            receiver_id: 2,
            media_type: MediaType::Audio,
        };
        assert!(valid.validate().is_ok());

        let invalid = InitiateCallRequest {
            caller_id: 0,
            receiver_id: 2,
            media_type: MediaType::Audio,
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_transition_request_validation() {
        assert!(TransitionRequest { account_id: 1 }.validate().is_ok());
        assert!(TransitionRequest { account_id: -5 }.validate().is_err());
    }

    #[test]
    fn test_end_request_rejects_negative_reported_duration() {
        let valid = EndCallRequest {
            account_id: 1,
            reported_duration_secs: Some(120),
        };
        assert!(valid.validate().is_ok());

        let invalid = EndCallRequest {
            account_id: 1,
            reported_duration_secs: Some(-1),
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_rate_request_bounds() {
        for rating in 1..=5 {
            let req = RateCallRequest {
                account_id: 1,
                rating,
                feedback: None,
            };
            assert!(req.validate().is_ok());
        }

        let req = RateCallRequest {
            account_id: 1,
            rating: 6,
            feedback: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_session_response_from_ended_session() {
        let mut session = CallSession::new_ringing(10, 20, MediaType::Audio);
        session.status = CallStatus::Ended;
        session.ended_at = Some(Utc::now());
        session.duration_secs = 125;
        session.coins_charged = 30;
        session.coins_credited = 30;
        session.end_reason = Some(EndReason::CallerHangup);

        let response = SessionResponse::from(session);

        assert_eq!(response.status, CallStatus::Ended);
        assert_eq!(response.duration_secs, 125);
        assert_eq!(response.coins_charged, 30);
        assert_eq!(response.coins_earned, 30);
        assert_eq!(response.end_reason.as_deref(), Some("caller_hangup"));
    }

    #[test]
    fn test_session_response_serializes_without_empty_fields() {
        let session = CallSession::new_ringing(10, 20, MediaType::Audio);
        let response = SessionResponse::from(session);

        let json = serde_json::to_value(&response).unwrap();
        // A fresh RINGING session has no timestamps, rating, or credential.
        assert!(json.get("ended_at").is_none());
        assert!(json.get("rating").is_none());
        assert!(json.get("credential").is_none());
        assert_eq!(json["status"], "ringing");
    }

    #[test]
    fn test_pagination_defaults() {
        let params = PaginationParams::default();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 50);
        assert_eq!(params.offset(), 0);
    }
}
