//! Idempotent schema setup.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running migrations
//! against an existing database is a no-op.
//!
//! The primary tables carry a `UNIQUE` constraint over logical key plus
//! version; it is what turns a lost version-assignment race into a
//! conflict instead of a duplicate row. Timestamps are unix milliseconds
//! and vectors are little-endian `f32` BLOBs.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS domain_document (
        identifier TEXT PRIMARY KEY,
        project TEXT NOT NULL,
        service TEXT NOT NULL,
        domain TEXT NOT NULL,
        summary TEXT NOT NULL,
        version INTEGER NOT NULL CHECK (version >= 1),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        deleted_at INTEGER,
        embedding BLOB,
        UNIQUE(project, service, domain, version)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domain_property (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_identifier TEXT NOT NULL,
        display_order INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        data_type TEXT NOT NULL,
        is_required INTEGER NOT NULL,
        is_immutable INTEGER NOT NULL,
        UNIQUE(document_identifier, display_order),
        FOREIGN KEY (document_identifier) REFERENCES domain_document(identifier)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domain_policy (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_identifier TEXT NOT NULL,
        display_order INTEGER NOT NULL,
        category TEXT NOT NULL,
        subject TEXT,
        content TEXT NOT NULL,
        UNIQUE(document_identifier, display_order),
        FOREIGN KEY (document_identifier) REFERENCES domain_document(identifier)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domain_relationship (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_identifier TEXT NOT NULL,
        display_order INTEGER NOT NULL,
        target_project TEXT NOT NULL,
        target_service TEXT NOT NULL,
        target_domain TEXT NOT NULL,
        relation_type TEXT NOT NULL,
        description TEXT NOT NULL,
        impact_description TEXT,
        UNIQUE(source_identifier, display_order),
        FOREIGN KEY (source_identifier) REFERENCES domain_document(identifier)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_convention (
        identifier TEXT PRIMARY KEY,
        project TEXT NOT NULL,
        category TEXT NOT NULL,
        title TEXT NOT NULL,
        version INTEGER NOT NULL CHECK (version >= 1),
        content TEXT NOT NULL,
        example_correct TEXT,
        example_incorrect TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        deleted_at INTEGER,
        embedding BLOB,
        UNIQUE(project, category, title, version)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_domain_document_project ON domain_document(project, deleted_at)",
    "CREATE INDEX IF NOT EXISTS idx_domain_property_document ON domain_property(document_identifier)",
    "CREATE INDEX IF NOT EXISTS idx_domain_policy_document ON domain_policy(document_identifier)",
    "CREATE INDEX IF NOT EXISTS idx_domain_relationship_source ON domain_relationship(source_identifier)",
    r#"
    CREATE INDEX IF NOT EXISTS idx_domain_relationship_target
        ON domain_relationship(target_project, target_service, target_domain)
    "#,
    "CREATE INDEX IF NOT EXISTS idx_project_convention_project ON project_convention(project, category, deleted_at)",
];

/// Create all tables and indexes on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Migration failed: {}", statement.trim()))?;
    }
    Ok(())
}

/// Connect to the configured database, apply the schema, and close.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    tracing::info!(path = %config.db.path.display(), "database initialized");
    pool.close().await;
    Ok(())
}
