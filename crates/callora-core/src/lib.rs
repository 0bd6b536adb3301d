//! Callora Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Callora call core. It includes:
//!
//! - Domain models (Account, CallSession, LedgerEntry)
//! - The pure admission pipeline and billing arithmetic
//! - Common traits for repositories and external collaborators
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod admission;
pub mod billing;
pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
