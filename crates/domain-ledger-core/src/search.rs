//! Similarity search across both aggregate families.
//!
//! The engine operates entirely through the store traits and the
//! [`EmbeddingProvider`] handed to it at construction.
//!
//! # Algorithm
//!
//! 1. Embed the query text (empty text is [`LedgerError::InvalidInput`]).
//! 2. Per family, fetch up to `top_k` active embedded rows with similarity
//!    strictly above the threshold, most similar first.
//! 3. Concatenate documents then conventions, each tagged with its kind.
//! 4. Stable sort by similarity descending; ties keep per-family order.
//! 5. Truncate to `top_k`.
//!
//! Both families get the full `top_k` as their own limit, so neither can be
//! under-counted before the global truncation.

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{LedgerError, Result};
use crate::models::{Aggregate, AggregateKind};
use crate::store::{ConventionStore, DocumentStore, Scored};

/// One ranked hit.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMatch {
    pub document_type: AggregateKind,
    /// Identifier of the matched version.
    pub document_id: String,
    pub similarity: f64,
    /// The matched aggregate, serialized.
    pub content: serde_json::Value,
}

/// Response of [`SearchEngine::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub matches: Vec<DocumentMatch>,
    pub total_count: usize,
}

/// Two-family similarity search.
pub struct SearchEngine<D: ?Sized, C: ?Sized> {
    documents: Arc<D>,
    conventions: Arc<C>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl<D, C> SearchEngine<D, C>
where
    D: DocumentStore + ?Sized,
    C: ConventionStore + ?Sized,
{
    pub fn new(documents: Arc<D>, conventions: Arc<C>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            documents,
            conventions,
            provider,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<SearchResult> {
        if !similarity_threshold.is_finite() {
            return Err(LedgerError::invalid("similarity_threshold must be a finite number"));
        }

        let query_vec = self.provider.generate(query).await?;

        let docs = self
            .documents
            .similarity_search(&query_vec, top_k, similarity_threshold)
            .await?;
        let convs = self
            .conventions
            .similarity_search(&query_vec, top_k, similarity_threshold)
            .await?;
        tracing::debug!(
            documents = docs.len(),
            conventions = convs.len(),
            "per-family candidates"
        );

        let matches = merge_and_rank(to_matches(docs)?, to_matches(convs)?, top_k);
        tracing::info!(query, top_k, hits = matches.len(), "semantic search");

        Ok(SearchResult {
            query: query.to_string(),
            total_count: matches.len(),
            matches,
        })
    }
}

fn to_matches<A: Aggregate>(scored: Vec<Scored<A>>) -> Result<Vec<DocumentMatch>> {
    scored
        .into_iter()
        .map(|s| {
            let content = serde_json::to_value(&s.aggregate)
                .map_err(|e| LedgerError::Infrastructure(e.into()))?;
            Ok(DocumentMatch {
                document_type: A::KIND,
                document_id: s.aggregate.identifier().to_string(),
                similarity: s.similarity,
                content,
            })
        })
        .collect()
}

/// Merge per-family lists, sort by similarity descending, keep `top_k`.
///
/// The sort is stable: on equal similarity, documents stay ahead of
/// conventions and each family keeps its own order.
pub fn merge_and_rank(
    documents: Vec<DocumentMatch>,
    conventions: Vec<DocumentMatch>,
    top_k: usize,
) -> Vec<DocumentMatch> {
    let mut merged = documents;
    merged.extend(conventions);
    merged.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    merged.truncate(top_k);
    merged
}
