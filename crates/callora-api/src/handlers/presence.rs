//! Presence handlers
//!
//! Write path for the connectivity collaborator's online/offline signals.

use crate::dto::PresenceRequest;
use actix_web::{web, HttpResponse};
use callora_core::AppError;
use callora_services::PgPresenceService;
use tracing::{debug, instrument};
use validator::Validate;

/// Record a presence heartbeat
///
/// POST /api/v1/presence/heartbeat
#[instrument(skip(service, req))]
pub async fn heartbeat(
    service: web::Data<PgPresenceService>,
    req: web::Json<PresenceRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    debug!(account_id = req.account_id, "Presence heartbeat");
    service.heartbeat(req.account_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Record an explicit disconnect
///
/// POST /api/v1/presence/offline
#[instrument(skip(service, req))]
pub async fn offline(
    service: web::Data<PgPresenceService>,
    req: web::Json<PresenceRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    debug!(account_id = req.account_id, "Presence offline");
    service.mark_offline(req.account_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Configure presence routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/presence")
            .route("/heartbeat", web::post().to(heartbeat))
            .route("/offline", web::post().to(offline)),
    );
}
