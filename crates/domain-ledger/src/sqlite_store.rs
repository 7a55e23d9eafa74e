//! SQLite-backed stores for both aggregate families.
//!
//! Every write is one transaction scoped to a single aggregate version:
//! the parent row plus, for documents, its property, policy and
//! relationship rows. Nothing is ever updated in place except
//! `deleted_at` and `embedding`.
//!
//! Query helpers return `anyhow::Result`; the trait methods convert at the
//! boundary, which recovers a [`LedgerError::Conflict`] raised on a unique
//! violation and turns everything else into an infrastructure error.

use std::collections::BTreeSet;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use domain_ledger_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use domain_ledger_core::models::{
    ConventionKey, DocumentKey, DomainDocument, DomainPolicy, DomainProperty, DomainRelationship,
    ProjectConvention,
};
use domain_ledger_core::store::{
    AggregateStore, ConventionStore, Dependent, DocumentStore, Scored,
};
use domain_ledger_core::{LedgerError, Result};

const DOCUMENT_COLUMNS: &str =
    "identifier, project, service, domain, summary, version, created_at, updated_at, deleted_at";

const CONVENTION_COLUMNS: &str = "identifier, project, category, title, version, content, \
     example_correct, example_incorrect, created_at, updated_at, deleted_at";

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

fn parse_identifier(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid identifier in database: {}", raw))
}

/// A unique violation on insert means another writer took this version.
fn insert_error(err: sqlx::Error, key: String, version: i64) -> anyhow::Error {
    let unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    if unique {
        LedgerError::Conflict { key, version }.into()
    } else {
        anyhow::Error::new(err).context("insert failed")
    }
}

/// Score `(identifier, blob)` rows against `query`, keep those strictly
/// above `threshold`, most similar first, at most `top_k`.
fn rank_vectors(
    rows: Vec<(String, Vec<u8>)>,
    query: &[f32],
    top_k: usize,
    threshold: f64,
) -> Vec<(String, f64)> {
    // vectors from another model or dimension are not comparable
    let mut scored: Vec<(String, f64)> = rows
        .into_iter()
        .filter(|(_, blob)| blob.len() == query.len() * 4)
        .map(|(id, blob)| {
            let sim = cosine_similarity(query, &blob_to_vec(&blob)) as f64;
            (id, sim)
        })
        .filter(|(_, sim)| *sim > threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

// ============ Domain documents ============

/// SQLite implementation of [`DocumentStore`].
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert(&self, doc: &DomainDocument) -> anyhow::Result<()> {
        let id = doc.identifier.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO domain_document (identifier, project, service, domain, summary,
                                         version, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&doc.project)
        .bind(&doc.service)
        .bind(&doc.domain)
        .bind(&doc.summary)
        .bind(doc.version)
        .bind(to_millis(doc.created_at))
        .bind(to_millis(doc.updated_at))
        .bind(doc.deleted_at.map(to_millis))
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, doc.key().to_string(), doc.version))?;

        for (order, p) in doc.properties.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO domain_property (document_identifier, display_order, name,
                                             description, data_type, is_required, is_immutable)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(order as i64)
            .bind(&p.name)
            .bind(&p.description)
            .bind(&p.data_type)
            .bind(p.is_required)
            .bind(p.is_immutable)
            .execute(&mut *tx)
            .await?;
        }

        for (order, p) in doc.policies.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO domain_policy (document_identifier, display_order, category,
                                           subject, content)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(order as i64)
            .bind(&p.category)
            .bind(&p.subject)
            .bind(&p.content)
            .execute(&mut *tx)
            .await?;
        }

        for (order, r) in doc.dependencies.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO domain_relationship (source_identifier, display_order,
                                                 target_project, target_service, target_domain,
                                                 relation_type, description, impact_description)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(order as i64)
            .bind(&r.target.project)
            .bind(&r.target.service)
            .bind(&r.target.domain)
            .bind(&r.relation_type)
            .bind(&r.description)
            .bind(&r.impact_description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Parent columns only; children are filled in by [`Self::hydrate`].
    fn header(row: &SqliteRow) -> anyhow::Result<DomainDocument> {
        let identifier: String = row.try_get("identifier")?;
        let deleted_at: Option<i64> = row.try_get("deleted_at")?;
        Ok(DomainDocument {
            identifier: parse_identifier(&identifier)?,
            project: row.try_get("project")?,
            service: row.try_get("service")?,
            domain: row.try_get("domain")?,
            summary: row.try_get("summary")?,
            version: row.try_get("version")?,
            properties: Vec::new(),
            policies: Vec::new(),
            dependencies: Vec::new(),
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
            deleted_at: deleted_at.map(from_millis).transpose()?,
        })
    }

    async fn hydrate(&self, row: &SqliteRow) -> anyhow::Result<DomainDocument> {
        let mut doc = Self::header(row)?;
        let id = doc.identifier.to_string();

        doc.properties = sqlx::query(
            "SELECT name, description, data_type, is_required, is_immutable \
             FROM domain_property WHERE document_identifier = ? ORDER BY display_order",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> anyhow::Result<DomainProperty> {
            Ok(DomainProperty {
                name: r.try_get("name")?,
                description: r.try_get("description")?,
                data_type: r.try_get("data_type")?,
                is_required: r.try_get("is_required")?,
                is_immutable: r.try_get("is_immutable")?,
            })
        })
        .collect::<anyhow::Result<_>>()?;

        doc.policies = sqlx::query(
            "SELECT category, subject, content \
             FROM domain_policy WHERE document_identifier = ? ORDER BY display_order",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> anyhow::Result<DomainPolicy> {
            Ok(DomainPolicy {
                category: r.try_get("category")?,
                subject: r.try_get("subject")?,
                content: r.try_get("content")?,
            })
        })
        .collect::<anyhow::Result<_>>()?;

        doc.dependencies = sqlx::query(
            "SELECT target_project, target_service, target_domain, relation_type, \
                    description, impact_description \
             FROM domain_relationship WHERE source_identifier = ? ORDER BY display_order",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> anyhow::Result<DomainRelationship> {
            Ok(DomainRelationship {
                target: DocumentKey::new(
                    r.try_get::<String, _>("target_project")?,
                    r.try_get::<String, _>("target_service")?,
                    r.try_get::<String, _>("target_domain")?,
                ),
                relation_type: r.try_get("relation_type")?,
                description: r.try_get("description")?,
                impact_description: r.try_get("impact_description")?,
            })
        })
        .collect::<anyhow::Result<_>>()?;

        Ok(doc)
    }

    async fn hydrate_all(&self, rows: Vec<SqliteRow>) -> anyhow::Result<Vec<DomainDocument>> {
        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            docs.push(self.hydrate(row).await?);
        }
        Ok(docs)
    }

    async fn by_identifier(&self, identifier: &str) -> anyhow::Result<Option<DomainDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM domain_document WHERE identifier = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn saved(&self, doc: &DomainDocument) -> anyhow::Result<DomainDocument> {
        self.insert(doc).await?;
        self.by_identifier(&doc.identifier.to_string())
            .await?
            .ok_or_else(|| anyhow!("document {} vanished after insert", doc.identifier))
    }

    async fn by_version(
        &self,
        key: &DocumentKey,
        version: i64,
    ) -> anyhow::Result<Option<DomainDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM domain_document \
             WHERE project = ? AND service = ? AND domain = ? AND version = ? \
               AND deleted_at IS NULL",
            DOCUMENT_COLUMNS
        ))
        .bind(&key.project)
        .bind(&key.service)
        .bind(&key.domain)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn versions(&self, key: &DocumentKey, limit: i64) -> anyhow::Result<Vec<DomainDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM domain_document \
             WHERE project = ? AND service = ? AND domain = ? AND deleted_at IS NULL \
             ORDER BY version DESC LIMIT ?",
            DOCUMENT_COLUMNS
        ))
        .bind(&key.project)
        .bind(&key.service)
        .bind(&key.domain)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    async fn latest_in_project(&self, project: &str) -> anyhow::Result<Vec<DomainDocument>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {cols} FROM (
                SELECT {cols},
                       ROW_NUMBER() OVER (PARTITION BY service, domain ORDER BY version DESC) AS rn
                FROM domain_document
                WHERE project = ? AND deleted_at IS NULL
            )
            WHERE rn = 1
            ORDER BY service, domain
            "#,
            cols = DOCUMENT_COLUMNS
        ))
        .bind(project)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    async fn dependents(&self, target: &DocumentKey) -> anyhow::Result<Vec<Dependent>> {
        let rows = sqlx::query(
            r#"
            SELECT d.project, d.service, d.domain, d.version,
                   r.relation_type, r.description, r.impact_description
            FROM domain_relationship r
            JOIN (
                SELECT identifier, project, service, domain, version,
                       ROW_NUMBER() OVER (
                           PARTITION BY project, service, domain ORDER BY version DESC
                       ) AS rn
                FROM domain_document
                WHERE deleted_at IS NULL
            ) d ON d.identifier = r.source_identifier AND d.rn = 1
            WHERE r.target_project = ? AND r.target_service = ? AND r.target_domain = ?
            ORDER BY d.project, d.service, d.domain, r.display_order
            "#,
        )
        .bind(&target.project)
        .bind(&target.service)
        .bind(&target.domain)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> anyhow::Result<Dependent> {
                Ok(Dependent {
                    source: DocumentKey::new(
                        r.try_get::<String, _>("project")?,
                        r.try_get::<String, _>("service")?,
                        r.try_get::<String, _>("domain")?,
                    ),
                    source_version: r.try_get("version")?,
                    relation_type: r.try_get("relation_type")?,
                    description: r.try_get("description")?,
                    impact_description: r.try_get("impact_description")?,
                })
            })
            .collect()
    }

    async fn unembedded(&self, limit: Option<usize>) -> anyhow::Result<Vec<DomainDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM domain_document \
             WHERE deleted_at IS NULL AND embedding IS NULL \
             ORDER BY created_at, rowid LIMIT ?",
            DOCUMENT_COLUMNS
        ))
        .bind(limit.map_or(-1, |l| l as i64))
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    async fn nearest(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> anyhow::Result<Vec<Scored<DomainDocument>>> {
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT identifier, embedding FROM domain_document \
             WHERE deleted_at IS NULL AND embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for (id, similarity) in rank_vectors(rows, query, top_k, threshold) {
            if let Some(aggregate) = self.by_identifier(&id).await? {
                out.push(Scored {
                    aggregate,
                    similarity,
                });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl AggregateStore for SqliteDocumentStore {
    type Aggregate = DomainDocument;

    async fn save(&self, doc: &DomainDocument) -> Result<DomainDocument> {
        Ok(self.saved(doc).await?)
    }

    async fn find_by_identifier(&self, identifier: Uuid) -> Result<Option<DomainDocument>> {
        Ok(self.by_identifier(&identifier.to_string()).await?)
    }

    async fn find_by_version(
        &self,
        key: &DocumentKey,
        version: i64,
    ) -> Result<Option<DomainDocument>> {
        Ok(self.by_version(key, version).await?)
    }

    async fn find_latest_by_logical_key(&self, key: &DocumentKey) -> Result<Option<DomainDocument>> {
        Ok(self.versions(key, 1).await?.into_iter().next())
    }

    async fn find_all_versions_by_logical_key(
        &self,
        key: &DocumentKey,
    ) -> Result<Vec<DomainDocument>> {
        Ok(self.versions(key, -1).await?)
    }

    async fn find_all_latest_by_project(&self, project: &str) -> Result<Vec<DomainDocument>> {
        Ok(self.latest_in_project(project).await?)
    }

    async fn max_version(&self, key: &DocumentKey) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM domain_document \
             WHERE project = ? AND service = ? AND domain = ?",
        )
        .bind(&key.project)
        .bind(&key.service)
        .bind(&key.domain)
        .fetch_one(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(max)
    }

    async fn soft_delete_all_versions_by_logical_key(&self, key: &DocumentKey) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE domain_document SET deleted_at = ? \
             WHERE project = ? AND service = ? AND domain = ? AND deleted_at IS NULL",
        )
        .bind(to_millis(Utc::now()))
        .bind(&key.project)
        .bind(&key.service)
        .bind(&key.domain)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(result.rows_affected())
    }

    async fn get_all_unique_project_names(&self) -> Result<BTreeSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT project FROM domain_document WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(names.into_iter().collect())
    }

    async fn update_embedding(&self, identifier: Uuid, vector: &[f32]) -> Result<()> {
        let result = sqlx::query("UPDATE domain_document SET embedding = ? WHERE identifier = ?")
            .bind(vec_to_blob(vector))
            .bind(identifier.to_string())
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::new)?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no domain document with identifier {}", identifier).into());
        }
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE domain_document SET embedding = NULL WHERE embedding IS NOT NULL")
                .execute(&self.pool)
                .await
                .map_err(anyhow::Error::new)?;
        Ok(result.rows_affected())
    }

    async fn find_unembedded(&self, limit: Option<usize>) -> Result<Vec<DomainDocument>> {
        Ok(self.unembedded(limit).await?)
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<Scored<DomainDocument>>> {
        Ok(self.nearest(query_vec, top_k, threshold).await?)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find_dependents(&self, target: &DocumentKey) -> Result<Vec<Dependent>> {
        Ok(self.dependents(target).await?)
    }
}

// ============ Project conventions ============

/// SQLite implementation of [`ConventionStore`].
pub struct SqliteConventionStore {
    pool: SqlitePool,
}

impl SqliteConventionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> anyhow::Result<ProjectConvention> {
        let identifier: String = row.try_get("identifier")?;
        let deleted_at: Option<i64> = row.try_get("deleted_at")?;
        Ok(ProjectConvention {
            identifier: parse_identifier(&identifier)?,
            project: row.try_get("project")?,
            category: row.try_get("category")?,
            title: row.try_get("title")?,
            version: row.try_get("version")?,
            content: row.try_get("content")?,
            example_correct: row.try_get("example_correct")?,
            example_incorrect: row.try_get("example_incorrect")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
            deleted_at: deleted_at.map(from_millis).transpose()?,
        })
    }

    fn from_rows(rows: &[SqliteRow]) -> anyhow::Result<Vec<ProjectConvention>> {
        rows.iter().map(Self::from_row).collect()
    }

    async fn insert(&self, conv: &ProjectConvention) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_convention (identifier, project, category, title, version,
                                            content, example_correct, example_incorrect,
                                            created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conv.identifier.to_string())
        .bind(&conv.project)
        .bind(&conv.category)
        .bind(&conv.title)
        .bind(conv.version)
        .bind(&conv.content)
        .bind(&conv.example_correct)
        .bind(&conv.example_incorrect)
        .bind(to_millis(conv.created_at))
        .bind(to_millis(conv.updated_at))
        .bind(conv.deleted_at.map(to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, conv.key().to_string(), conv.version))?;
        Ok(())
    }

    async fn by_identifier(&self, identifier: &str) -> anyhow::Result<Option<ProjectConvention>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM project_convention WHERE identifier = ?",
            CONVENTION_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn versions(&self, key: &ConventionKey, limit: i64) -> anyhow::Result<Vec<ProjectConvention>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_convention \
             WHERE project = ? AND category = ? AND title = ? AND deleted_at IS NULL \
             ORDER BY version DESC LIMIT ?",
            CONVENTION_COLUMNS
        ))
        .bind(&key.project)
        .bind(&key.category)
        .bind(&key.title)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Self::from_rows(&rows)
    }

    async fn latest(
        &self,
        project: &str,
        category: Option<&str>,
    ) -> anyhow::Result<Vec<ProjectConvention>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {cols} FROM (
                SELECT {cols},
                       ROW_NUMBER() OVER (PARTITION BY category, title ORDER BY version DESC) AS rn
                FROM project_convention
                WHERE project = ? AND deleted_at IS NULL AND (? IS NULL OR category = ?)
            )
            WHERE rn = 1
            ORDER BY category, title
            "#,
            cols = CONVENTION_COLUMNS
        ))
        .bind(project)
        .bind(category)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Self::from_rows(&rows)
    }
}

#[async_trait]
impl AggregateStore for SqliteConventionStore {
    type Aggregate = ProjectConvention;

    async fn save(&self, conv: &ProjectConvention) -> Result<ProjectConvention> {
        self.insert(conv).await?;
        let stored = self
            .by_identifier(&conv.identifier.to_string())
            .await?
            .ok_or_else(|| anyhow!("convention {} vanished after insert", conv.identifier))?;
        Ok(stored)
    }

    async fn find_by_identifier(&self, identifier: Uuid) -> Result<Option<ProjectConvention>> {
        Ok(self.by_identifier(&identifier.to_string()).await?)
    }

    async fn find_by_version(
        &self,
        key: &ConventionKey,
        version: i64,
    ) -> Result<Option<ProjectConvention>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM project_convention \
             WHERE project = ? AND category = ? AND title = ? AND version = ? \
               AND deleted_at IS NULL",
            CONVENTION_COLUMNS
        ))
        .bind(&key.project)
        .bind(&key.category)
        .bind(&key.title)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(row.as_ref().map(Self::from_row).transpose()?)
    }

    async fn find_latest_by_logical_key(
        &self,
        key: &ConventionKey,
    ) -> Result<Option<ProjectConvention>> {
        Ok(self.versions(key, 1).await?.into_iter().next())
    }

    async fn find_all_versions_by_logical_key(
        &self,
        key: &ConventionKey,
    ) -> Result<Vec<ProjectConvention>> {
        Ok(self.versions(key, -1).await?)
    }

    async fn find_all_latest_by_project(&self, project: &str) -> Result<Vec<ProjectConvention>> {
        Ok(self.latest(project, None).await?)
    }

    async fn max_version(&self, key: &ConventionKey) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM project_convention \
             WHERE project = ? AND category = ? AND title = ?",
        )
        .bind(&key.project)
        .bind(&key.category)
        .bind(&key.title)
        .fetch_one(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(max)
    }

    async fn soft_delete_all_versions_by_logical_key(&self, key: &ConventionKey) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE project_convention SET deleted_at = ? \
             WHERE project = ? AND category = ? AND title = ? AND deleted_at IS NULL",
        )
        .bind(to_millis(Utc::now()))
        .bind(&key.project)
        .bind(&key.category)
        .bind(&key.title)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(result.rows_affected())
    }

    async fn get_all_unique_project_names(&self) -> Result<BTreeSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT project FROM project_convention WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(names.into_iter().collect())
    }

    async fn update_embedding(&self, identifier: Uuid, vector: &[f32]) -> Result<()> {
        let result =
            sqlx::query("UPDATE project_convention SET embedding = ? WHERE identifier = ?")
                .bind(vec_to_blob(vector))
                .bind(identifier.to_string())
                .execute(&self.pool)
                .await
                .map_err(anyhow::Error::new)?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no project convention with identifier {}", identifier).into());
        }
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE project_convention SET embedding = NULL WHERE embedding IS NOT NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(result.rows_affected())
    }

    async fn find_unembedded(&self, limit: Option<usize>) -> Result<Vec<ProjectConvention>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_convention \
             WHERE deleted_at IS NULL AND embedding IS NULL \
             ORDER BY created_at, rowid LIMIT ?",
            CONVENTION_COLUMNS
        ))
        .bind(limit.map_or(-1, |l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;
        Ok(Self::from_rows(&rows)?)
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<Scored<ProjectConvention>>> {
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT identifier, embedding FROM project_convention \
             WHERE deleted_at IS NULL AND embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::new)?;

        let mut out = Vec::new();
        for (id, similarity) in rank_vectors(rows, query_vec, top_k, threshold) {
            if let Some(aggregate) = self.by_identifier(&id).await? {
                out.push(Scored {
                    aggregate,
                    similarity,
                });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ConventionStore for SqliteConventionStore {
    async fn find_all_latest_by_category(
        &self,
        project: &str,
        category: &str,
    ) -> Result<Vec<ProjectConvention>> {
        Ok(self.latest(project, Some(category)).await?)
    }
}
