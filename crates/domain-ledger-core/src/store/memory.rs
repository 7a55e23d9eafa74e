//! In-memory store implementation for tests.
//!
//! Rows and vectors live behind `std::sync::RwLock`. Every version is kept
//! in insertion order; the `(logical key, version)` unique constraint of the
//! SQLite schema is emulated in [`AggregateStore::save`]. Similarity search
//! is brute-force cosine similarity over all stored vectors.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{LedgerError, Result};
use crate::models::{
    now_millis, Aggregate, DocumentKey, DomainDocument, KeyOf, ProjectConvention,
};

use super::{
    dependents_among, in_category, AggregateStore, ConventionStore, Dependent, DocumentStore,
    Scored,
};

/// In-memory store for one aggregate family.
pub struct InMemoryStore<A: Aggregate> {
    rows: RwLock<Vec<A>>,
    vectors: RwLock<HashMap<Uuid, Vec<f32>>>,
}

impl<A: Aggregate> InMemoryStore<A> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            vectors: RwLock::new(HashMap::new()),
        }
    }

    /// Stored vector of one version, if any.
    pub fn embedding_of(&self, identifier: Uuid) -> Result<Option<Vec<f32>>> {
        Ok(read(&self.vectors)?.get(&identifier).cloned())
    }

    fn latest_active(&self, filter: impl Fn(&A) -> bool) -> Result<Vec<A>> {
        let rows = read(&self.rows)?;
        let mut latest: HashMap<KeyOf<A>, &A> = HashMap::new();
        for row in rows.iter().filter(|r| r.deleted_at().is_none() && filter(r)) {
            let slot = latest.entry(row.logical_key()).or_insert(row);
            if row.version() > slot.version() {
                *slot = row;
            }
        }
        let mut out: Vec<A> = latest.into_values().cloned().collect();
        out.sort_by_key(|a| a.logical_key().to_string());
        Ok(out)
    }
}

impl<A: Aggregate> Default for InMemoryStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| LedgerError::Infrastructure(anyhow!("in-memory store lock poisoned")))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| LedgerError::Infrastructure(anyhow!("in-memory store lock poisoned")))
}

#[async_trait]
impl<A: Aggregate> AggregateStore for InMemoryStore<A> {
    type Aggregate = A;

    async fn save(&self, aggregate: &A) -> Result<A> {
        let mut rows = write(&self.rows)?;
        let key = aggregate.logical_key();
        if rows
            .iter()
            .any(|r| r.logical_key() == key && r.version() == aggregate.version())
        {
            return Err(LedgerError::Conflict {
                key: key.to_string(),
                version: aggregate.version(),
            });
        }
        if rows.iter().any(|r| r.identifier() == aggregate.identifier()) {
            return Err(LedgerError::Infrastructure(anyhow!(
                "identifier {} already stored",
                aggregate.identifier()
            )));
        }
        rows.push(aggregate.clone());
        Ok(aggregate.clone())
    }

    async fn find_by_identifier(&self, identifier: Uuid) -> Result<Option<A>> {
        let rows = read(&self.rows)?;
        Ok(rows.iter().find(|r| r.identifier() == identifier).cloned())
    }

    async fn find_by_version(&self, key: &KeyOf<A>, version: i64) -> Result<Option<A>> {
        let rows = read(&self.rows)?;
        Ok(rows
            .iter()
            .find(|r| {
                r.deleted_at().is_none() && &r.logical_key() == key && r.version() == version
            })
            .cloned())
    }

    async fn find_latest_by_logical_key(&self, key: &KeyOf<A>) -> Result<Option<A>> {
        let rows = read(&self.rows)?;
        Ok(rows
            .iter()
            .filter(|r| r.deleted_at().is_none() && &r.logical_key() == key)
            .max_by_key(|r| r.version())
            .cloned())
    }

    async fn find_all_versions_by_logical_key(&self, key: &KeyOf<A>) -> Result<Vec<A>> {
        let rows = read(&self.rows)?;
        let mut versions: Vec<A> = rows
            .iter()
            .filter(|r| r.deleted_at().is_none() && &r.logical_key() == key)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version().cmp(&a.version()));
        Ok(versions)
    }

    async fn find_all_latest_by_project(&self, project: &str) -> Result<Vec<A>> {
        self.latest_active(|r| r.project() == project)
    }

    async fn max_version(&self, key: &KeyOf<A>) -> Result<Option<i64>> {
        let rows = read(&self.rows)?;
        Ok(rows
            .iter()
            .filter(|r| &r.logical_key() == key)
            .map(|r| r.version())
            .max())
    }

    async fn soft_delete_all_versions_by_logical_key(&self, key: &KeyOf<A>) -> Result<u64> {
        let mut rows = write(&self.rows)?;
        let now = now_millis();
        let mut affected = 0u64;
        for row in rows
            .iter_mut()
            .filter(|r| r.deleted_at().is_none() && &r.logical_key() == key)
        {
            row.mark_deleted(now);
            affected += 1;
        }
        Ok(affected)
    }

    async fn get_all_unique_project_names(&self) -> Result<BTreeSet<String>> {
        let rows = read(&self.rows)?;
        Ok(rows
            .iter()
            .filter(|r| r.deleted_at().is_none())
            .map(|r| r.project().to_string())
            .collect())
    }

    async fn update_embedding(&self, identifier: Uuid, vector: &[f32]) -> Result<()> {
        if !read(&self.rows)?.iter().any(|r| r.identifier() == identifier) {
            return Err(LedgerError::Infrastructure(anyhow!(
                "no aggregate with identifier {}",
                identifier
            )));
        }
        write(&self.vectors)?.insert(identifier, vector.to_vec());
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let mut vectors = write(&self.vectors)?;
        let cleared = vectors.len() as u64;
        vectors.clear();
        Ok(cleared)
    }

    async fn find_unembedded(&self, limit: Option<usize>) -> Result<Vec<A>> {
        let rows = read(&self.rows)?;
        let vectors = read(&self.vectors)?;
        Ok(rows
            .iter()
            .filter(|r| r.deleted_at().is_none() && !vectors.contains_key(&r.identifier()))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<Scored<A>>> {
        let rows = read(&self.rows)?;
        let vectors = read(&self.vectors)?;
        let mut scored: Vec<Scored<A>> = rows
            .iter()
            .filter(|r| r.deleted_at().is_none())
            .filter_map(|r| {
                let vec = vectors
                    .get(&r.identifier())
                    .filter(|v| v.len() == query_vec.len())?;
                let similarity = cosine_similarity(query_vec, vec) as f64;
                (similarity > threshold).then(|| Scored {
                    aggregate: r.clone(),
                    similarity,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore<DomainDocument> {
    async fn find_dependents(&self, target: &DocumentKey) -> Result<Vec<Dependent>> {
        let latest = self.latest_active(|_| true)?;
        Ok(dependents_among(&latest, target))
    }
}

#[async_trait]
impl ConventionStore for InMemoryStore<ProjectConvention> {
    async fn find_all_latest_by_category(
        &self,
        project: &str,
        category: &str,
    ) -> Result<Vec<ProjectConvention>> {
        let latest = self.latest_active(|r| r.project() == project)?;
        Ok(in_category(latest, category))
    }
}
