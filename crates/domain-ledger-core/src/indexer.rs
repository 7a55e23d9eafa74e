//! Embedding indexer: aggregate -> projection text -> vector -> store.

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{LedgerError, Result};
use crate::models::Aggregate;
use crate::store::AggregateStore;

/// Outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub processed: usize,
    pub indexed: usize,
    pub failed: usize,
}

impl IndexReport {
    pub fn merge(&mut self, other: &IndexReport) {
        self.processed += other.processed;
        self.indexed += other.indexed;
        self.failed += other.failed;
    }
}

/// Computes and stores the vector of an aggregate version.
pub struct EmbeddingIndexer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingIndexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Index one aggregate, overwriting any previous vector for its
    /// identifier. Every failure comes back as [`LedgerError::Indexing`].
    pub async fn index<S>(&self, store: &S, aggregate: &S::Aggregate) -> Result<()>
    where
        S: AggregateStore + ?Sized,
    {
        let identifier = aggregate.identifier();
        self.try_index(store, aggregate)
            .await
            .map_err(|source| LedgerError::Indexing {
                identifier,
                source: Box::new(source),
            })
    }

    async fn try_index<S>(&self, store: &S, aggregate: &S::Aggregate) -> Result<()>
    where
        S: AggregateStore + ?Sized,
    {
        let text = aggregate.projection();
        let vector = self.provider.generate(&text).await?;
        store
            .update_embedding(aggregate.identifier(), &vector)
            .await?;
        tracing::debug!(
            kind = %<S::Aggregate as Aggregate>::KIND,
            identifier = %aggregate.identifier(),
            dims = vector.len(),
            "indexed aggregate"
        );
        Ok(())
    }

    /// Index active rows that have no vector yet.
    ///
    /// Failures are counted and logged, not returned; only a failure to list
    /// pending rows aborts the run.
    pub async fn reindex_pending<S>(&self, store: &S, limit: Option<usize>) -> Result<IndexReport>
    where
        S: AggregateStore + ?Sized,
    {
        let pending = store.find_unembedded(limit).await?;
        let mut report = IndexReport::default();

        for aggregate in &pending {
            report.processed += 1;
            match self.index(store, aggregate).await {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(error = %e, "backfill skipped aggregate");
                }
            }
        }

        tracing::info!(
            kind = %<S::Aggregate as Aggregate>::KIND,
            processed = report.processed,
            indexed = report.indexed,
            failed = report.failed,
            "backfill finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::models::{now_millis, ConventionDraft, Draft, ProjectConvention};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct BrokenProvider;

    #[async_trait]
    impl EmbeddingProvider for BrokenProvider {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(LedgerError::Infrastructure(anyhow::anyhow!("model unavailable")))
        }
    }

    fn convention(title: &str) -> ProjectConvention {
        ConventionDraft {
            project: "p".to_string(),
            category: "STYLE".to_string(),
            title: title.to_string(),
            content: "keep functions short".to_string(),
            example_correct: None,
            example_incorrect: None,
        }
        .build(Uuid::new_v4(), 1, now_millis())
    }

    #[tokio::test]
    async fn test_index_overwrites_vector() {
        let store = InMemoryStore::new();
        let conv = store.save(&convention("short fns")).await.unwrap();
        store.update_embedding(conv.identifier, &[9.0]).await.unwrap();

        let provider = HashingProvider::new(16);
        let indexer = EmbeddingIndexer::new(Arc::new(provider.clone()));
        indexer.index(&store, &conv).await.unwrap();

        let stored = store.embedding_of(conv.identifier).unwrap().unwrap();
        assert_eq!(stored, provider.embed_one(&conv.projection()));
    }

    #[tokio::test]
    async fn test_index_failure_is_indexing_error() {
        let store = InMemoryStore::new();
        let conv = store.save(&convention("short fns")).await.unwrap();
        let indexer = EmbeddingIndexer::new(Arc::new(BrokenProvider));

        let err = indexer.index(&store, &conv).await.unwrap_err();
        match err {
            LedgerError::Indexing { identifier, .. } => assert_eq!(identifier, conv.identifier),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.embedding_of(conv.identifier).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reindex_pending_counts() {
        let store = InMemoryStore::new();
        for title in ["a", "b", "c"] {
            store.save(&convention(title)).await.unwrap();
        }
        let indexer = EmbeddingIndexer::new(Arc::new(HashingProvider::new(16)));

        let report = indexer.reindex_pending(&store, Some(2)).await.unwrap();
        assert_eq!(report, IndexReport { processed: 2, indexed: 2, failed: 0 });

        let report = indexer.reindex_pending(&store, None).await.unwrap();
        assert_eq!(report.indexed, 1);
        assert!(store.find_unembedded(None).await.unwrap().is_empty());

        let broken = EmbeddingIndexer::new(Arc::new(BrokenProvider));
        store.clear_embeddings().await.unwrap();
        let report = broken.reindex_pending(&store, None).await.unwrap();
        assert_eq!(report, IndexReport { processed: 3, indexed: 0, failed: 3 });
    }
}
