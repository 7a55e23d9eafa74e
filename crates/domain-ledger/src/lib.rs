//! # Domain Ledger
//!
//! **Versioned domain documents and project conventions with similarity
//! search and impact analysis.**
//!
//! This crate is the native half of the ledger: SQLite persistence, HTTP
//! and local embedding providers, configuration and the `ledger` CLI. The
//! versioning, indexing and search logic lives in [`domain_ledger_core`]
//! and is written against store traits this crate implements.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────────┐
//! │   CLI    │──▶│    Ledger     │──▶│   SQLite stores   │
//! │ (ledger) │   │ version/search│   │ documents+conv.   │
//! └──────────┘   └──────┬────────┘   └───────────────────┘
//!                       │
//!                       ▼
//!                ┌──────────────┐
//!                │  Embedding   │
//!                │  provider    │
//!                └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. A write (`ledger doc put`) validates a draft, assigns the next version
//!    and inserts a new immutable row set. Older versions are never touched.
//! 2. The new version's canonical text is embedded and the vector stored
//!    alongside it. Indexing failures are logged, never surfaced.
//! 3. Searches embed the query and rank both families by cosine similarity.
//! 4. Impact analysis follows relationship edges backwards to the documents
//!    that depend on a key.
//!
//! ## Quick Start
//!
//! ```bash
//! ledger init
//! ledger doc put --file user.json
//! ledger search "user authentication policy"
//! ledger doc impact ecommerce user-service User
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema setup (idempotent) |
//! | [`sqlite_store`] | SQLite implementations of the store traits |
//! | [`embedding`] | Hash, OpenAI, Ollama and local embedding providers |
//! | [`app`] | Composition root: config to [`app::SqliteLedger`] |
//! | [`document_cmd`] | `ledger doc` commands |
//! | [`convention_cmd`] | `ledger convention` commands |
//! | [`search`] | `ledger search` |
//! | [`embed_cmd`] | Embedding backfill: `pending` and `rebuild` |
//! | [`projects`] | Project listing |

pub mod app;
pub mod config;
pub mod convention_cmd;
pub mod db;
pub mod document_cmd;
pub mod embed_cmd;
pub mod embedding;
pub mod migrate;
pub mod projects;
pub mod search;
pub mod sqlite_store;

pub use domain_ledger_core::{models, store, Ledger, LedgerError, LedgerOptions};
