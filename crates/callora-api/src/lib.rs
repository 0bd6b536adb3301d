//! HTTP API layer for Callora
//!
//! Request/response DTOs and actix-web handlers for the call lifecycle,
//! presence ingestion, and the admin ledger listing. Every transition
//! endpoint returns the single versioned `SessionResponse` shape; error
//! mapping is automatic through `AppError`'s `ResponseError` impl.

pub mod dto;
pub mod handlers;
