//! HTTP handlers for the Callora API

pub mod call;
pub mod ledger;
pub mod presence;

pub use call::configure as configure_calls;
pub use ledger::configure as configure_ledger;
pub use presence::configure as configure_presence;
