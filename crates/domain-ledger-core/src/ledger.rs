//! The [`Ledger`] facade: every operation callers need, composed from the
//! stores, version services, indexer and search engine it is built with.
//!
//! Collaborators are passed in explicitly; the ledger never looks anything
//! up from ambient state. Without an embedding provider the write path skips
//! indexing and [`Ledger::semantic_search`] fails.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;

use crate::embedding::EmbeddingProvider;
use crate::error::{LedgerError, Result};
use crate::impact::ImpactReport;
use crate::indexer::{EmbeddingIndexer, IndexReport};
use crate::models::{
    ConventionDraft, ConventionKey, DocumentDraft, DocumentKey, DomainDocument, ProjectConvention,
};
use crate::search::{SearchEngine, SearchResult};
use crate::store::{ConventionStore, DocumentStore};
use crate::versioning::{RetryPause, VersionService, DEFAULT_MAX_ATTEMPTS};

/// Tuning knobs for a [`Ledger`].
#[derive(Clone)]
pub struct LedgerOptions {
    pub max_write_attempts: u32,
    /// Awaited between conflicting write attempts. `None` retries at once.
    pub retry_pause: Option<Arc<dyn RetryPause>>,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            max_write_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_pause: None,
        }
    }
}

pub struct Ledger<D: ?Sized, C: ?Sized>
where
    D: DocumentStore,
    C: ConventionStore,
{
    documents: VersionService<D>,
    conventions: VersionService<C>,
    indexer: Option<Arc<EmbeddingIndexer>>,
    search: Option<SearchEngine<D, C>>,
}

impl<D, C> Ledger<D, C>
where
    D: DocumentStore + ?Sized,
    C: ConventionStore + ?Sized,
{
    pub fn new(
        documents: Arc<D>,
        conventions: Arc<C>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        options: LedgerOptions,
    ) -> Self {
        let indexer = provider
            .clone()
            .map(|p| Arc::new(EmbeddingIndexer::new(p)));
        let search = provider.map(|p| SearchEngine::new(documents.clone(), conventions.clone(), p));

        Self {
            documents: VersionService::new(documents, indexer.clone())
                .with_max_attempts(options.max_write_attempts)
                .with_retry_pause(options.retry_pause.clone()),
            conventions: VersionService::new(conventions, indexer.clone())
                .with_max_attempts(options.max_write_attempts)
                .with_retry_pause(options.retry_pause),
            indexer,
            search,
        }
    }

    pub fn document_store(&self) -> &Arc<D> {
        self.documents.store()
    }

    pub fn convention_store(&self) -> &Arc<C> {
        self.conventions.store()
    }

    /// Latest active version of a document, or the exact version.
    pub async fn read_spec(
        &self,
        key: &DocumentKey,
        version: Option<i64>,
    ) -> Result<Option<DomainDocument>> {
        self.documents.read(key, version).await
    }

    pub async fn read_convention(
        &self,
        key: &ConventionKey,
        version: Option<i64>,
    ) -> Result<Option<ProjectConvention>> {
        self.conventions.read(key, version).await
    }

    /// Latest version of every convention in `project`, optionally only
    /// those in `category`.
    pub async fn read_conventions(
        &self,
        project: &str,
        category: Option<&str>,
    ) -> Result<Vec<ProjectConvention>> {
        let store = self.conventions.store();
        match category {
            Some(category) => store.find_all_latest_by_category(project, category).await,
            None => store.find_all_latest_by_project(project).await,
        }
    }

    /// Latest version of every document in `project`.
    pub async fn latest_documents(&self, project: &str) -> Result<Vec<DomainDocument>> {
        self.documents.store().find_all_latest_by_project(project).await
    }

    pub async fn document_history(&self, key: &DocumentKey) -> Result<Vec<DomainDocument>> {
        self.documents.history(key).await
    }

    pub async fn convention_history(&self, key: &ConventionKey) -> Result<Vec<ProjectConvention>> {
        self.conventions.history(key).await
    }

    pub async fn create_or_update_document(&self, draft: &DocumentDraft) -> Result<DomainDocument> {
        self.documents.create_or_update(draft).await
    }

    pub async fn create_or_update_convention(
        &self,
        draft: &ConventionDraft,
    ) -> Result<ProjectConvention> {
        self.conventions.create_or_update(draft).await
    }

    pub async fn soft_delete_document(&self, key: &DocumentKey) -> Result<u64> {
        self.documents.soft_delete(key).await
    }

    pub async fn soft_delete_convention(&self, key: &ConventionKey) -> Result<u64> {
        self.conventions.soft_delete(key).await
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<SearchResult> {
        match &self.search {
            Some(engine) => engine.search(query, top_k, similarity_threshold).await,
            None => Err(LedgerError::Infrastructure(anyhow!(
                "semantic search requires an embedding provider"
            ))),
        }
    }

    /// Documents whose latest active version depends on `key`.
    pub async fn analyze_impact(&self, key: &DocumentKey) -> Result<ImpactReport> {
        let dependents = self.documents.store().find_dependents(key).await?;
        tracing::info!(key = %key, dependents = dependents.len(), "impact analysis");
        Ok(ImpactReport::new(key.clone(), dependents))
    }

    /// Sorted union of active project names across both families.
    pub async fn project_names(&self) -> Result<BTreeSet<String>> {
        let mut names = self.documents.store().get_all_unique_project_names().await?;
        names.extend(self.conventions.store().get_all_unique_project_names().await?);
        Ok(names)
    }

    /// Index every active version that has no vector yet, both families.
    pub async fn reindex_pending(&self, limit: Option<usize>) -> Result<IndexReport> {
        let indexer = self.require_indexer()?;
        let mut report = indexer
            .reindex_pending(self.documents.store().as_ref(), limit)
            .await?;
        let remaining = limit.map(|l| l.saturating_sub(report.processed));
        if remaining != Some(0) {
            let conv = indexer
                .reindex_pending(self.conventions.store().as_ref(), remaining)
                .await?;
            report.merge(&conv);
        }
        Ok(report)
    }

    /// Drop every stored vector and recompute them all.
    pub async fn rebuild_index(&self) -> Result<IndexReport> {
        self.require_indexer()?;
        let cleared = self.documents.store().clear_embeddings().await?
            + self.conventions.store().clear_embeddings().await?;
        tracing::info!(cleared, "cleared embeddings");
        self.reindex_pending(None).await
    }

    fn require_indexer(&self) -> Result<&Arc<EmbeddingIndexer>> {
        self.indexer.as_ref().ok_or_else(|| {
            LedgerError::Infrastructure(anyhow!("indexing requires an embedding provider"))
        })
    }
}
