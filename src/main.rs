//! Callora Call Core Server
//!
//! Owns the call session lifecycle and billing engine: admission, the call
//! state machine, per-minute coin billing against the ledger, presence, and
//! the stale-session reaper.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use callora_api::handlers::{configure_calls, configure_ledger, configure_presence};
use callora_cache::RedisCache;
use callora_core::AppConfig;
use callora_db::{
    create_pool, run_migrations, PgAccountRepository, PgBlockRepository, PgSessionRepository,
};
use callora_rtc::HttpCredentialIssuer;
use callora_services::{CallService, PresenceService, SessionReaper};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "callora-call-core",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Health check
            .route("/health", web::get().to(health_check))
            // Call lifecycle endpoints
            .configure(configure_calls)
            // Presence ingestion endpoints
            .configure(configure_presence)
            // Account ledger endpoints
            .configure(configure_ledger),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "callora={},callora_api={},callora_services={},callora_db={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting Callora call core v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().expect("Failed to load configuration");

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .expect("Failed to create database pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    info!("Connecting to Redis...");
    let cache = Arc::new(
        RedisCache::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let issuer = Arc::new(
        HttpCredentialIssuer::new(
            &config.rtc.issuer_url,
            config.rtc.api_key.clone(),
            config.rtc.issue_timeout_ms,
        )
        .expect("Failed to build credential issuer client"),
    );

    // Wire the services
    let session_repo = Arc::new(PgSessionRepository::new(pool.clone()));
    let block_repo = Arc::new(PgBlockRepository::new(pool.clone()));
    let account_repo = Arc::new(PgAccountRepository::new(pool.clone()));

    let call_service = Arc::new(CallService::new(
        session_repo.clone(),
        block_repo,
        issuer,
        pool.clone(),
    ));
    let presence_service = Arc::new(PresenceService::new(
        account_repo,
        cache,
        config.call.presence_ttl_secs,
    ));

    // The reaper is the correctness backstop for crashed clients; it runs
    // for the lifetime of the process.
    SessionReaper::new(
        call_service.clone(),
        presence_service.clone(),
        session_repo,
        config.call.clone(),
    )
    .spawn();

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    let cors_origins = config.server.cors_origins.clone();

    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        // Configure CORS - clone origins for each worker
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            // Shared state
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::from(call_service.clone()))
            .app_data(web::Data::from(presence_service.clone()))
            // Malformed query strings get a JSON error body
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "VALIDATION",
                        "message": error_message
                    })),
                )
                .into()
            }))
            // Middleware
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            // Configure routes
            .configure(configure_routes)
            // Root redirect to health
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
