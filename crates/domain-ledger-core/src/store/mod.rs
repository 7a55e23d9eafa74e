//! Storage abstraction for versioned aggregates.
//!
//! [`AggregateStore`] is the append-only versioning repository shared by
//! both aggregate families; [`DocumentStore`] and [`ConventionStore`] add
//! the family-specific queries. The SQLite implementation lives in the app
//! crate; [`memory::InMemoryStore`] backs tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`save`](AggregateStore::save) | Insert one new version (never updates) |
//! | [`find_latest_by_logical_key`](AggregateStore::find_latest_by_logical_key) | Highest non-deleted version |
//! | [`find_all_versions_by_logical_key`](AggregateStore::find_all_versions_by_logical_key) | Non-deleted history, newest first |
//! | [`find_all_latest_by_project`](AggregateStore::find_all_latest_by_project) | Latest version of every key in a project |
//! | [`soft_delete_all_versions_by_logical_key`](AggregateStore::soft_delete_all_versions_by_logical_key) | Mark every version deleted |
//! | [`similarity_search`](AggregateStore::similarity_search) | Nearest embedded rows above a threshold |

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Aggregate, DocumentKey, DomainDocument, KeyOf, ProjectConvention};

/// An aggregate paired with its similarity to a query vector.
#[derive(Debug, Clone)]
pub struct Scored<A> {
    pub aggregate: A,
    pub similarity: f64,
}

/// A document version whose relationships point at an analyzed key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependent {
    pub source: DocumentKey,
    pub source_version: i64,
    pub relation_type: String,
    pub description: String,
    pub impact_description: Option<String>,
}

/// Append-only versioning repository for one aggregate family.
///
/// "Active" means `deleted_at` is unset. Unless stated otherwise, queries
/// only see active rows.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    type Aggregate: Aggregate;

    /// Insert a new version, plus nested rows, atomically.
    ///
    /// Fails with [`LedgerError::Conflict`](crate::error::LedgerError::Conflict)
    /// when `(logical key, version)` already exists, deleted or not.
    async fn save(&self, aggregate: &Self::Aggregate) -> Result<Self::Aggregate>;

    /// Lookup by surrogate identifier, deleted rows included.
    async fn find_by_identifier(&self, identifier: Uuid) -> Result<Option<Self::Aggregate>>;

    /// Exact `(key, version)` lookup among active rows.
    async fn find_by_version(
        &self,
        key: &KeyOf<Self::Aggregate>,
        version: i64,
    ) -> Result<Option<Self::Aggregate>>;

    async fn find_latest_by_logical_key(
        &self,
        key: &KeyOf<Self::Aggregate>,
    ) -> Result<Option<Self::Aggregate>>;

    /// Active versions of `key`, ordered by version descending.
    async fn find_all_versions_by_logical_key(
        &self,
        key: &KeyOf<Self::Aggregate>,
    ) -> Result<Vec<Self::Aggregate>>;

    /// Latest active version of every logical key under `project`.
    async fn find_all_latest_by_project(&self, project: &str) -> Result<Vec<Self::Aggregate>>;

    /// Highest version ever written for `key`, soft-deleted rows included.
    async fn max_version(&self, key: &KeyOf<Self::Aggregate>) -> Result<Option<i64>>;

    /// Set `deleted_at` on every active version of `key` in one atomic step.
    /// Returns the number of rows affected; 0 when nothing was active.
    async fn soft_delete_all_versions_by_logical_key(
        &self,
        key: &KeyOf<Self::Aggregate>,
    ) -> Result<u64>;

    /// Distinct project names with at least one active row.
    async fn get_all_unique_project_names(&self) -> Result<BTreeSet<String>>;

    /// Store or overwrite the vector of one version.
    async fn update_embedding(&self, identifier: Uuid, vector: &[f32]) -> Result<()>;

    /// Drop every stored vector. Returns the number of rows cleared.
    async fn clear_embeddings(&self) -> Result<u64>;

    /// Active rows that have no vector yet, oldest first.
    async fn find_unembedded(&self, limit: Option<usize>) -> Result<Vec<Self::Aggregate>>;

    /// Up to `top_k` active, embedded rows whose cosine similarity to
    /// `query_vec` is strictly greater than `threshold`, most similar first.
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<Scored<Self::Aggregate>>>;
}

/// Domain document repository.
#[async_trait]
pub trait DocumentStore: AggregateStore<Aggregate = DomainDocument> {
    /// Latest active documents with a relationship targeting `target`.
    async fn find_dependents(&self, target: &DocumentKey) -> Result<Vec<Dependent>>;
}

/// Project convention repository.
#[async_trait]
pub trait ConventionStore: AggregateStore<Aggregate = ProjectConvention> {
    async fn find_all_latest_by_category(
        &self,
        project: &str,
        category: &str,
    ) -> Result<Vec<ProjectConvention>>;
}

/// Resolve the dependents of `target` from a set of latest documents.
///
/// Shared by stores that cannot express the lookup natively.
pub fn dependents_among(latest: &[DomainDocument], target: &DocumentKey) -> Vec<Dependent> {
    let mut out = Vec::new();
    for doc in latest {
        for rel in doc.dependencies.iter().filter(|r| &r.target == target) {
            out.push(Dependent {
                source: doc.key(),
                source_version: doc.version,
                relation_type: rel.relation_type.clone(),
                description: rel.description.clone(),
                impact_description: rel.impact_description.clone(),
            });
        }
    }
    out
}

/// Used by [`ConventionStore`] implementations that filter in memory.
pub fn in_category(conventions: Vec<ProjectConvention>, category: &str) -> Vec<ProjectConvention> {
    conventions
        .into_iter()
        .filter(|c| c.category == category)
        .collect()
}
