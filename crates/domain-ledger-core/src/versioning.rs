//! The create-or-update write path.
//!
//! Version assignment is read-then-write application logic: read the
//! highest version ever written for the key, build `max + 1` with a fresh
//! identifier, insert. Two writers racing on the same key can compute the
//! same number; the store's unique constraint rejects the loser with
//! [`LedgerError::Conflict`] and the whole sequence is retried up to
//! `max_attempts` times. Between attempts the service awaits its
//! [`RetryPause`], if one was supplied; the core owns no timer, so the
//! runtime hosting the ledger provides it.
//!
//! After a successful insert the new version is indexed best-effort: an
//! indexing failure is logged and never fails the write.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::indexer::EmbeddingIndexer;
use crate::models::{now_millis, Aggregate, Draft, KeyOf};
use crate::store::AggregateStore;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Wait inserted after a conflicting attempt, before the next one.
#[async_trait]
pub trait RetryPause: Send + Sync {
    /// `attempt` is the 1-based attempt that just conflicted.
    async fn pause(&self, attempt: u32);
}

/// Exponential delay for `attempt` with up to 50% random jitter added, so
/// writers that collided once spread out before trying again.
///
/// `attempt` 1 waits between `base_ms` and `1.5 * base_ms`; the exponent is
/// capped at 5.
pub fn jittered_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let exp = base_ms.saturating_mul(1 << attempt.saturating_sub(1).min(5));
    let spread = exp / 2;
    if spread == 0 {
        return exp;
    }
    let jitter = (Uuid::new_v4().as_u128() % (spread as u128 + 1)) as u64;
    exp + jitter
}

/// Sole writer of new versions for one aggregate family.
pub struct VersionService<S: AggregateStore + ?Sized> {
    store: Arc<S>,
    indexer: Option<Arc<EmbeddingIndexer>>,
    max_attempts: u32,
    pause: Option<Arc<dyn RetryPause>>,
}

impl<S: AggregateStore + ?Sized> VersionService<S> {
    pub fn new(store: Arc<S>, indexer: Option<Arc<EmbeddingIndexer>>) -> Self {
        Self {
            store,
            indexer,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            pause: None,
        }
    }

    pub fn with_retry_pause(mut self, pause: Option<Arc<dyn RetryPause>>) -> Self {
        self.pause = pause;
        self
    }

    /// Attempts per write before a conflict is surfaced. Clamped to >= 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Append the next version of the draft's logical key.
    ///
    /// Returns the stored aggregate: version 1 for a new key, otherwise one
    /// more than the highest version ever written (soft-deleted versions
    /// count, so a re-created key continues its sequence).
    pub async fn create_or_update<D>(&self, draft: &D) -> Result<S::Aggregate>
    where
        D: Draft<Aggregate = S::Aggregate>,
    {
        draft.validate()?;
        let key = draft.logical_key();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let version = self.next_version(&key).await?;
            let aggregate = draft.build(Uuid::new_v4(), version, now_millis());

            match self.store.save(&aggregate).await {
                Ok(saved) => {
                    tracing::info!(
                        kind = %<S::Aggregate as Aggregate>::KIND,
                        key = %key,
                        version = saved.version(),
                        "stored new version"
                    );
                    self.index_best_effort(&saved).await;
                    return Ok(saved);
                }
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    tracing::warn!(
                        key = %key,
                        version,
                        attempt,
                        "version conflict, retrying"
                    );
                    if let Some(pause) = &self.pause {
                        pause.pause(attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn next_version(&self, key: &KeyOf<S::Aggregate>) -> Result<i64> {
        Ok(self.store.max_version(key).await?.map_or(1, |v| v + 1))
    }

    async fn index_best_effort(&self, aggregate: &S::Aggregate) {
        let Some(indexer) = &self.indexer else {
            return;
        };
        if let Err(e) = indexer.index(self.store.as_ref(), aggregate).await {
            tracing::warn!(error = %e, "indexing failed; version stored without embedding");
        }
    }

    /// Mark every version of `key` deleted. Returns the affected count.
    pub async fn soft_delete(&self, key: &KeyOf<S::Aggregate>) -> Result<u64> {
        let affected = self
            .store
            .soft_delete_all_versions_by_logical_key(key)
            .await?;
        tracing::info!(
            kind = %<S::Aggregate as Aggregate>::KIND,
            key = %key,
            affected,
            "soft-deleted logical key"
        );
        Ok(affected)
    }

    /// Latest active version, or the exact active version when given.
    pub async fn read(
        &self,
        key: &KeyOf<S::Aggregate>,
        version: Option<i64>,
    ) -> Result<Option<S::Aggregate>> {
        match version {
            Some(v) if v < 1 => Err(LedgerError::invalid(format!(
                "version must be >= 1, got {}",
                v
            ))),
            Some(v) => self.store.find_by_version(key, v).await,
            None => self.store.find_latest_by_logical_key(key).await,
        }
    }

    /// Active versions of `key`, newest first.
    pub async fn history(&self, key: &KeyOf<S::Aggregate>) -> Result<Vec<S::Aggregate>> {
        self.store.find_all_versions_by_logical_key(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashingProvider};
    use crate::models::{
        ConventionDraft, ConventionKey, DocumentDraft, DocumentKey, DomainDocument,
        DomainPolicy, DomainProperty, ProjectConvention,
    };
    use crate::store::memory::InMemoryStore;
    use crate::store::Scored;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user_draft(summary: &str) -> DocumentDraft {
        DocumentDraft {
            project: "Ttutta".to_string(),
            service: "Auth".to_string(),
            domain: "User".to_string(),
            summary: summary.to_string(),
            properties: vec![DomainProperty {
                name: "email".to_string(),
                description: "user email".to_string(),
                data_type: "String".to_string(),
                is_required: true,
                is_immutable: false,
            }],
            policies: vec![DomainPolicy {
                category: "PERMISSION".to_string(),
                subject: Some("ADMIN".to_string()),
                content: "admin only".to_string(),
            }],
            dependencies: Vec::new(),
        }
    }

    fn user_key() -> DocumentKey {
        DocumentKey::new("Ttutta", "Auth", "User")
    }

    fn service(
        store: Arc<InMemoryStore<DomainDocument>>,
    ) -> VersionService<InMemoryStore<DomainDocument>> {
        let indexer = EmbeddingIndexer::new(Arc::new(HashingProvider::default()));
        VersionService::new(store, Some(Arc::new(indexer)))
    }

    #[tokio::test]
    async fn test_versions_are_dense_and_descending() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());

        let v1 = svc.create_or_update(&user_draft("user accounts")).await.unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v1.properties.len(), 1);
        assert_eq!(v1.policies.len(), 1);

        let v2 = svc
            .create_or_update(&user_draft("user accounts and login sessions"))
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_ne!(v1.identifier, v2.identifier);

        for n in 3..=5 {
            let v = svc.create_or_update(&user_draft("more")).await.unwrap();
            assert_eq!(v.version, n);
        }

        let history = svc.history(&user_key()).await.unwrap();
        let versions: Vec<i64> = history.iter().map(|d| d.version).collect();
        assert_eq!(versions, vec![5, 4, 3, 2, 1]);

        let old = svc.read(&user_key(), Some(1)).await.unwrap().unwrap();
        assert_eq!(old.summary, "user accounts");
        let latest = svc.read(&user_key(), None).await.unwrap().unwrap();
        assert_eq!(latest.version, 5);
    }

    #[tokio::test]
    async fn test_write_indexes_new_version() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());
        let doc = svc.create_or_update(&user_draft("user accounts")).await.unwrap();
        assert!(store.embedding_of(doc.identifier).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_soft_delete_then_recreate_continues_sequence() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());
        svc.create_or_update(&user_draft("a")).await.unwrap();
        svc.create_or_update(&user_draft("b")).await.unwrap();

        assert_eq!(svc.soft_delete(&user_key()).await.unwrap(), 2);
        assert_eq!(svc.soft_delete(&user_key()).await.unwrap(), 0);
        assert!(svc.read(&user_key(), None).await.unwrap().is_none());

        let again = svc.create_or_update(&user_draft("c")).await.unwrap();
        assert_eq!(again.version, 3);
        assert_eq!(svc.history(&user_key()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_draft_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());
        let err = svc.create_or_update(&user_draft(" ")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert!(store.max_version(&user_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_zero_is_rejected() {
        let svc = service(Arc::new(InMemoryStore::new()));
        assert!(svc.read(&user_key(), Some(0)).await.is_err());
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(LedgerError::Infrastructure(anyhow::anyhow!("model load failed")))
        }
    }

    #[tokio::test]
    async fn test_indexing_failure_does_not_fail_write() {
        let store = Arc::new(InMemoryStore::new());
        let indexer = EmbeddingIndexer::new(Arc::new(FailingProvider));
        let svc = VersionService::new(store.clone(), Some(Arc::new(indexer)));

        let doc = svc.create_or_update(&user_draft("user accounts")).await.unwrap();
        assert_eq!(doc.version, 1);
        assert!(store.embedding_of(doc.identifier).unwrap().is_none());
        assert!(store.find_by_identifier(doc.identifier).await.unwrap().is_some());
    }

    /// Store whose first `stale_reads` calls to `max_version` lag one write
    /// behind, as if another writer committed in between.
    struct LaggingStore {
        inner: InMemoryStore<ProjectConvention>,
        stale_reads: AtomicUsize,
    }

    impl LaggingStore {
        fn new(stale_reads: usize) -> Self {
            Self {
                inner: InMemoryStore::new(),
                stale_reads: AtomicUsize::new(stale_reads),
            }
        }
    }

    #[async_trait]
    impl AggregateStore for LaggingStore {
        type Aggregate = ProjectConvention;

        async fn save(&self, a: &ProjectConvention) -> Result<ProjectConvention> {
            self.inner.save(a).await
        }
        async fn find_by_identifier(&self, id: Uuid) -> Result<Option<ProjectConvention>> {
            self.inner.find_by_identifier(id).await
        }
        async fn find_by_version(
            &self,
            key: &ConventionKey,
            version: i64,
        ) -> Result<Option<ProjectConvention>> {
            self.inner.find_by_version(key, version).await
        }
        async fn find_latest_by_logical_key(
            &self,
            key: &ConventionKey,
        ) -> Result<Option<ProjectConvention>> {
            self.inner.find_latest_by_logical_key(key).await
        }
        async fn find_all_versions_by_logical_key(
            &self,
            key: &ConventionKey,
        ) -> Result<Vec<ProjectConvention>> {
            self.inner.find_all_versions_by_logical_key(key).await
        }
        async fn find_all_latest_by_project(&self, p: &str) -> Result<Vec<ProjectConvention>> {
            self.inner.find_all_latest_by_project(p).await
        }
        async fn max_version(&self, key: &ConventionKey) -> Result<Option<i64>> {
            let actual = self.inner.max_version(key).await?;
            let stale = self
                .stale_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(match (stale, actual) {
                (true, Some(v)) if v > 1 => Some(v - 1),
                (true, Some(_)) => None,
                (_, actual) => actual,
            })
        }
        async fn soft_delete_all_versions_by_logical_key(&self, key: &ConventionKey) -> Result<u64> {
            self.inner.soft_delete_all_versions_by_logical_key(key).await
        }
        async fn get_all_unique_project_names(&self) -> Result<BTreeSet<String>> {
            self.inner.get_all_unique_project_names().await
        }
        async fn update_embedding(&self, id: Uuid, vector: &[f32]) -> Result<()> {
            self.inner.update_embedding(id, vector).await
        }
        async fn clear_embeddings(&self) -> Result<u64> {
            self.inner.clear_embeddings().await
        }
        async fn find_unembedded(&self, limit: Option<usize>) -> Result<Vec<ProjectConvention>> {
            self.inner.find_unembedded(limit).await
        }
        async fn similarity_search(
            &self,
            q: &[f32],
            top_k: usize,
            threshold: f64,
        ) -> Result<Vec<Scored<ProjectConvention>>> {
            self.inner.similarity_search(q, top_k, threshold).await
        }
    }

    fn naming_draft(content: &str) -> ConventionDraft {
        ConventionDraft {
            project: "p".to_string(),
            category: "NAMING".to_string(),
            title: "vars".to_string(),
            content: content.to_string(),
            example_correct: None,
            example_incorrect: None,
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let store = Arc::new(LaggingStore::new(0));
        let svc = VersionService::new(store.clone(), None);
        svc.create_or_update(&naming_draft("v1")).await.unwrap();

        // The next read is stale, so the first attempt collides with v1.
        store.stale_reads.store(1, Ordering::SeqCst);
        let saved = svc.create_or_update(&naming_draft("v2")).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(saved.content, "v2");
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_max_attempts() {
        let store = Arc::new(LaggingStore::new(0));
        let svc = VersionService::new(store.clone(), None).with_max_attempts(2);
        svc.create_or_update(&naming_draft("v1")).await.unwrap();

        store.stale_reads.store(2, Ordering::SeqCst);
        let err = svc.create_or_update(&naming_draft("v2")).await.unwrap_err();
        assert!(err.is_conflict());

        let key = ConventionKey::new("p", "NAMING", "vars");
        let latest = store.find_latest_by_logical_key(&key).await.unwrap().unwrap();
        assert_eq!(latest.content, "v1");
    }

    #[derive(Default)]
    struct RecordingPause {
        attempts: std::sync::Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl RetryPause for RecordingPause {
        async fn pause(&self, attempt: u32) {
            self.attempts.lock().unwrap().push(attempt);
        }
    }

    #[tokio::test]
    async fn test_pause_runs_between_conflicting_attempts() {
        let store = Arc::new(LaggingStore::new(0));
        let pause = Arc::new(RecordingPause::default());
        let svc = VersionService::new(store.clone(), None)
            .with_max_attempts(3)
            .with_retry_pause(Some(pause.clone()));
        svc.create_or_update(&naming_draft("v1")).await.unwrap();
        assert!(pause.attempts.lock().unwrap().is_empty());

        store.stale_reads.store(2, Ordering::SeqCst);
        let saved = svc.create_or_update(&naming_draft("v2")).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(*pause.attempts.lock().unwrap(), vec![1, 2]);

        // No pause after the final attempt; the conflict surfaces directly.
        store.stale_reads.store(3, Ordering::SeqCst);
        pause.attempts.lock().unwrap().clear();
        let err = svc.create_or_update(&naming_draft("v3")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(*pause.attempts.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_jittered_backoff_bounds() {
        for _ in 0..50 {
            let first = jittered_backoff_ms(20, 1);
            assert!((20..=30).contains(&first), "{}", first);
            let third = jittered_backoff_ms(20, 3);
            assert!((80..=120).contains(&third), "{}", third);
            let capped = jittered_backoff_ms(20, 40);
            assert!((640..=960).contains(&capped), "{}", capped);
        }
        assert_eq!(jittered_backoff_ms(0, 4), 0);
        assert_eq!(jittered_backoff_ms(1, 1), 1);
    }
}
