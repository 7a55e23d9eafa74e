//! Versioned aggregate models.
//!
//! Two aggregate families share one shape: a logical key, a version that
//! starts at 1 and grows by exactly one per write, a fresh surrogate
//! identifier per version, and timestamps. Versions are immutable once
//! written except for `deleted_at` and the stored embedding (which lives in
//! the store, not on the model).
//!
//! | Family | Logical key | Payload |
//! |--------|-------------|---------|
//! | [`DomainDocument`] | project / service / domain | summary, properties, policies, dependencies |
//! | [`ProjectConvention`] | project / category / title | content, correct/incorrect examples |
//!
//! New versions are described by drafts ([`DocumentDraft`],
//! [`ConventionDraft`]); the version service turns a draft into an
//! aggregate once it has computed the next version number.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::projection;

/// Which aggregate family a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateKind {
    DomainDocument,
    ProjectConvention,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::DomainDocument => "DOMAIN_DOCUMENT",
            AggregateKind::ProjectConvention => "PROJECT_CONVENTION",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a conceptual entity independent of its version.
pub trait LogicalKey:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    fn project(&self) -> &str;
}

/// Logical key of a domain document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub project: String,
    pub service: String,
    pub domain: String,
}

impl DocumentKey {
    pub fn new(
        project: impl Into<String>,
        service: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            service: service.into(),
            domain: domain.into(),
        }
    }
}

impl LogicalKey for DocumentKey {
    fn project(&self) -> &str {
        &self.project
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.service, self.domain)
    }
}

/// Logical key of a project convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConventionKey {
    pub project: String,
    pub category: String,
    pub title: String,
}

impl ConventionKey {
    pub fn new(
        project: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            category: category.into(),
            title: title.into(),
        }
    }
}

impl LogicalKey for ConventionKey {
    fn project(&self) -> &str {
        &self.project
    }
}

impl fmt::Display for ConventionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.category, self.title)
    }
}

/// A field of a domain document. Declaration order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProperty {
    pub name: String,
    pub description: String,
    /// Data type, e.g. `String`, `UUID`, `Enum`.
    #[serde(rename = "type")]
    pub data_type: String,
    pub is_required: bool,
    pub is_immutable: bool,
}

/// A business rule attached to a domain document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPolicy {
    /// e.g. `PERMISSION`, `LIFECYCLE`.
    pub category: String,
    /// Who the policy applies to, e.g. `ADMIN`.
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
}

/// Directed edge from the owning document version to another document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRelationship {
    pub target: DocumentKey,
    /// e.g. `DEPENDENCY`.
    pub relation_type: String,
    pub description: String,
    #[serde(default)]
    pub impact_description: Option<String>,
}

/// One immutable version of a domain document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDocument {
    pub identifier: Uuid,
    pub project: String,
    pub service: String,
    pub domain: String,
    pub summary: String,
    pub version: i64,
    #[serde(default)]
    pub properties: Vec<DomainProperty>,
    #[serde(default)]
    pub policies: Vec<DomainPolicy>,
    /// Documents this version depends on.
    #[serde(default)]
    pub dependencies: Vec<DomainRelationship>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DomainDocument {
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(&self.project, &self.service, &self.domain)
    }
}

/// One immutable version of a project convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConvention {
    pub identifier: Uuid,
    pub project: String,
    pub category: String,
    pub title: String,
    pub version: i64,
    pub content: String,
    #[serde(default)]
    pub example_correct: Option<String>,
    #[serde(default)]
    pub example_incorrect: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ProjectConvention {
    pub fn key(&self) -> ConventionKey {
        ConventionKey::new(&self.project, &self.category, &self.title)
    }
}

/// Logical key type of an aggregate.
pub type KeyOf<A> = <A as Aggregate>::Key;

/// Behaviour shared by both aggregate families.
///
/// Stores, the version service, the indexer and the search engine are all
/// written against this trait so each family is handled by the same code.
pub trait Aggregate: Clone + fmt::Debug + Serialize + Send + Sync + 'static {
    type Key: LogicalKey;

    const KIND: AggregateKind;

    fn identifier(&self) -> Uuid;
    fn logical_key(&self) -> Self::Key;
    fn version(&self) -> i64;
    fn project(&self) -> &str;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
    fn mark_deleted(&mut self, at: DateTime<Utc>);

    /// Canonical text fed to the embedding generator.
    fn projection(&self) -> String;
}

impl Aggregate for DomainDocument {
    type Key = DocumentKey;

    const KIND: AggregateKind = AggregateKind::DomainDocument;

    fn identifier(&self) -> Uuid {
        self.identifier
    }
    fn logical_key(&self) -> DocumentKey {
        self.key()
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn project(&self) -> &str {
        &self.project
    }
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
    fn projection(&self) -> String {
        projection::document_text(self)
    }
}

impl Aggregate for ProjectConvention {
    type Key = ConventionKey;

    const KIND: AggregateKind = AggregateKind::ProjectConvention;

    fn identifier(&self) -> Uuid {
        self.identifier
    }
    fn logical_key(&self) -> ConventionKey {
        self.key()
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn project(&self) -> &str {
        &self.project
    }
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
    fn projection(&self) -> String {
        projection::convention_text(self)
    }
}

/// Content of a write before a version number has been assigned.
pub trait Draft: Send + Sync {
    type Aggregate: Aggregate;

    fn logical_key(&self) -> KeyOf<Self::Aggregate>;

    /// Structural validation: every required field must be non-blank.
    fn validate(&self) -> Result<()>;

    /// Materialize version `version` of the aggregate.
    fn build(&self, identifier: Uuid, version: i64, now: DateTime<Utc>) -> Self::Aggregate;
}

/// Input of a domain document create-or-update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub project: String,
    pub service: String,
    pub domain: String,
    pub summary: String,
    #[serde(default)]
    pub properties: Vec<DomainProperty>,
    #[serde(default)]
    pub policies: Vec<DomainPolicy>,
    #[serde(default)]
    pub dependencies: Vec<DomainRelationship>,
}

impl Draft for DocumentDraft {
    type Aggregate = DomainDocument;

    fn logical_key(&self) -> DocumentKey {
        DocumentKey::new(&self.project, &self.service, &self.domain)
    }

    fn validate(&self) -> Result<()> {
        require("project", &self.project)?;
        require("service", &self.service)?;
        require("domain", &self.domain)?;
        require("summary", &self.summary)?;
        for (i, p) in self.properties.iter().enumerate() {
            require(&format!("properties[{}].name", i), &p.name)?;
            require(&format!("properties[{}].type", i), &p.data_type)?;
        }
        for (i, p) in self.policies.iter().enumerate() {
            require(&format!("policies[{}].category", i), &p.category)?;
            require(&format!("policies[{}].content", i), &p.content)?;
        }
        for (i, d) in self.dependencies.iter().enumerate() {
            require(&format!("dependencies[{}].target.project", i), &d.target.project)?;
            require(&format!("dependencies[{}].target.service", i), &d.target.service)?;
            require(&format!("dependencies[{}].target.domain", i), &d.target.domain)?;
            require(&format!("dependencies[{}].relation_type", i), &d.relation_type)?;
        }
        Ok(())
    }

    fn build(&self, identifier: Uuid, version: i64, now: DateTime<Utc>) -> DomainDocument {
        DomainDocument {
            identifier,
            project: self.project.clone(),
            service: self.service.clone(),
            domain: self.domain.clone(),
            summary: self.summary.clone(),
            version,
            properties: self.properties.clone(),
            policies: self.policies.clone(),
            dependencies: self.dependencies.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Input of a project convention create-or-update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConventionDraft {
    pub project: String,
    pub category: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub example_correct: Option<String>,
    #[serde(default)]
    pub example_incorrect: Option<String>,
}

impl Draft for ConventionDraft {
    type Aggregate = ProjectConvention;

    fn logical_key(&self) -> ConventionKey {
        ConventionKey::new(&self.project, &self.category, &self.title)
    }

    fn validate(&self) -> Result<()> {
        require("project", &self.project)?;
        require("category", &self.category)?;
        require("title", &self.title)?;
        require("content", &self.content)
    }

    fn build(&self, identifier: Uuid, version: i64, now: DateTime<Utc>) -> ProjectConvention {
        ProjectConvention {
            identifier,
            project: self.project.clone(),
            category: self.category.clone(),
            title: self.title.clone(),
            version,
            content: self.content.clone(),
            example_correct: self.example_correct.clone(),
            example_incorrect: self.example_incorrect.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Current time truncated to millisecond precision, the resolution the
/// SQLite store keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
