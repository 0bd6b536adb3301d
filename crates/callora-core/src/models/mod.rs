//! Domain models for the call lifecycle and billing core

pub mod account;
pub mod ledger;
pub mod session;

pub use account::{Account, AccountStatus};
pub use ledger::{LedgerCategory, LedgerEntry};
pub use session::{Actor, CallSession, CallStatus, EndReason, MediaType, PartyRole};
