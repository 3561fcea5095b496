//! Idempotent order reconciliation for in-app purchases
//!
//! Verified App Store and Google Play transactions are applied to an external order ledger at most
//! once, serialized per transaction and guarded against subscription hijacking.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod payments;
pub mod services;

pub use error::{ErrorKind, ReconcileError, ReconcileResult};
