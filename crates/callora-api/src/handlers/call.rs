//! Call lifecycle handlers
//!
//! HTTP surface for admission, the four transitions, rating, and session
//! reads. Every transition returns the same `SessionResponse` shape.

use crate::dto::{
    ApiResponse, EndCallRequest, InitiateCallRequest, RateCallRequest, SessionFilterParams,
    SessionResponse, TransitionRequest,
};
use actix_web::{web, HttpResponse};
use callora_core::models::{Actor, CallStatus};
use callora_core::AppError;
use callora_services::PgCallService;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Initiate a call
///
/// POST /api/v1/calls
#[instrument(skip(service, req))]
pub async fn initiate_call(
    service: web::Data<PgCallService>,
    req: web::Json<InitiateCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Initiate validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(
        caller_id = req.caller_id,
        receiver_id = req.receiver_id,
        "Initiating call"
    );

    let session = service
        .initiate(req.caller_id, req.receiver_id, req.media_type)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Accept a ringing call (receiver only)
///
/// POST /api/v1/calls/{id}/accept
#[instrument(skip(service, req))]
pub async fn accept_call(
    service: web::Data<PgCallService>,
    path: web::Path<Uuid>,
    req: web::Json<TransitionRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session_id = path.into_inner();
    let (session, credential) = service
        .accept(session_id, Actor::Account(req.account_id))
        .await?;

    let response = SessionResponse::from(session).with_credential(credential);
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// Reject a ringing call (receiver only)
///
/// POST /api/v1/calls/{id}/reject
#[instrument(skip(service, req))]
pub async fn reject_call(
    service: web::Data<PgCallService>,
    path: web::Path<Uuid>,
    req: web::Json<TransitionRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = service
        .reject(path.into_inner(), Actor::Account(req.account_id))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Cancel a call that never connected (caller only)
///
/// POST /api/v1/calls/{id}/cancel
#[instrument(skip(service, req))]
pub async fn cancel_call(
    service: web::Data<PgCallService>,
    path: web::Path<Uuid>,
    req: web::Json<TransitionRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = service
        .cancel(path.into_inner(), Actor::Account(req.account_id))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// End a call (either party); bills and releases both parties
///
/// POST /api/v1/calls/{id}/end
#[instrument(skip(service, req))]
pub async fn end_call(
    service: web::Data<PgCallService>,
    path: web::Path<Uuid>,
    req: web::Json<EndCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = service
        .end(
            path.into_inner(),
            Actor::Account(req.account_id),
            req.reported_duration_secs,
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Rate an ended call (caller only, write-once)
///
/// POST /api/v1/calls/{id}/rate
#[instrument(skip(service, req))]
pub async fn rate_call(
    service: web::Data<PgCallService>,
    path: web::Path<Uuid>,
    req: web::Json<RateCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Rating validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let session = service
        .rate(
            path.into_inner(),
            Actor::Account(req.account_id),
            req.rating,
            req.feedback.clone(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Fetch one session (conflict-recovery path for clients)
///
/// GET /api/v1/calls/{id}
#[instrument(skip(service))]
pub async fn get_call(
    service: web::Data<PgCallService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let session = service.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// List session history with filtering and pagination
///
/// GET /api/v1/calls
#[instrument(skip(service, params))]
pub async fn list_calls(
    service: web::Data<PgCallService>,
    params: web::Query<SessionFilterParams>,
) -> Result<HttpResponse, AppError> {
    params
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let status = match params.status.as_deref() {
        Some(s) => Some(
            CallStatus::from_str(s)
                .ok_or_else(|| AppError::Validation(format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };

    let (sessions, total) = service
        .list(
            params.account_id,
            status,
            params.pagination.limit(),
            params.pagination.offset(),
        )
        .await?;

    let data: Vec<SessionResponse> = sessions.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(params.pagination.paginate(data, total)))
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("", web::post().to(initiate_call))
            .route("", web::get().to(list_calls))
            .route("/{id}", web::get().to(get_call))
            .route("/{id}/accept", web::post().to(accept_call))
            .route("/{id}/reject", web::post().to(reject_call))
            .route("/{id}/cancel", web::post().to(cancel_call))
            .route("/{id}/end", web::post().to(end_call))
            .route("/{id}/rate", web::post().to(rate_call)),
    );
}
