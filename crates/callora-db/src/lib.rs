//! Database layer for Callora
//!
//! PostgreSQL pool management, embedded migrations, and the repository
//! implementations backing the call core. The transactional lifecycle
//! writes (admission, transitions, billing) live in callora-services; this
//! crate supplies the pool, the reads, and the row mappings those
//! transactions reuse.

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::{
    AccountRow, PgAccountRepository, PgBlockRepository, PgLedgerRepository, PgSessionRepository,
    SessionRow, ACCOUNT_COLUMNS, SESSION_COLUMNS,
};
