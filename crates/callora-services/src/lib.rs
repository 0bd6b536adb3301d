//! Business logic services for Callora
//!
//! This crate contains the services that own the call lifecycle:
//!
//! # Architecture
//!
//! - Each service owns its dependencies (repositories, cache, issuer)
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `CallService` - admission, state transitions, and billing as single
//!   transactional units
//! - `PresenceService` - online/offline ingestion and heartbeat liveness
//! - `SessionReaper` - background recovery for abandoned sessions

pub mod call_service;
pub mod presence;
pub mod reaper;

pub use call_service::CallService;
pub use presence::PresenceService;
pub use reaper::{SessionReaper, SweepReport};

use callora_cache::RedisCache;
use callora_db::{PgAccountRepository, PgBlockRepository, PgSessionRepository};
use callora_rtc::HttpCredentialIssuer;

/// Production call service wiring
pub type PgCallService = CallService<PgSessionRepository, PgBlockRepository, HttpCredentialIssuer>;

/// Production presence service wiring
pub type PgPresenceService = PresenceService<PgAccountRepository, RedisCache>;

/// Production reaper wiring
pub type PgSessionReaper = SessionReaper<
    PgSessionRepository,
    PgBlockRepository,
    HttpCredentialIssuer,
    PgAccountRepository,
    RedisCache,
>;
