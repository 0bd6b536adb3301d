//! Ledger handlers
//!
//! Read-only account statement for admin tooling.

use crate::dto::{LedgerEntryResponse, PaginationParams};
use actix_web::{web, HttpResponse};
use callora_core::traits::{AccountRepository, LedgerRepository};
use callora_core::AppError;
use callora_db::{PgAccountRepository, PgLedgerRepository};
use sqlx::PgPool;
use tracing::{debug, instrument};
use validator::Validate;

/// List ledger entries for an account
///
/// GET /api/v1/accounts/{id}/ledger
#[instrument(skip(pool, params))]
pub async fn list_account_ledger(
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    params: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    params
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let account_id = path.into_inner();
    debug!(account_id, "Listing account ledger");

    let account_repo = PgAccountRepository::new(pool.get_ref().clone());
    account_repo
        .find_by_id(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account {} not found", account_id)))?;

    let ledger_repo = PgLedgerRepository::new(pool.get_ref().clone());
    let (entries, total) = ledger_repo
        .list_by_account(account_id, params.limit(), params.offset())
        .await?;

    let data: Vec<LedgerEntryResponse> = entries.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(params.paginate(data, total)))
}

/// Configure ledger routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/accounts").route("/{id}/ledger", web::get().to(list_account_ledger)),
    );
}
