//! # Domain Ledger Core
//!
//! Storage-agnostic logic for Domain Ledger: versioned aggregate models,
//! store traits, the create-or-update write path, embedding indexing,
//! two-family similarity search and impact analysis.
//!
//! This crate contains no tokio, sqlx or filesystem I/O. Concrete stores
//! and network embedding providers live in the `domain-ledger` app crate.

pub mod embedding;
pub mod error;
pub mod impact;
pub mod indexer;
pub mod ledger;
pub mod models;
pub mod projection;
pub mod search;
pub mod store;
pub mod versioning;

pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerOptions};
