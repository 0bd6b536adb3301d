//! Repository implementations for PostgreSQL

pub mod account_repo;
pub mod block_repo;
pub mod ledger_repo;
pub mod session_repo;

pub use account_repo::{AccountRow, PgAccountRepository, ACCOUNT_COLUMNS};
pub use block_repo::PgBlockRepository;
pub use ledger_repo::PgLedgerRepository;
pub use session_repo::{PgSessionRepository, SessionRow, SESSION_COLUMNS};
