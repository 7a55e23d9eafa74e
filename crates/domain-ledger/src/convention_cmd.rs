//! `ledger convention ...`: read and write project conventions.

use std::path::Path;

use anyhow::{bail, Context, Result};

use domain_ledger_core::models::{ConventionDraft, ConventionKey, ProjectConvention};

use crate::app;
use crate::config::Config;

pub fn read_draft(path: &Path) -> Result<ConventionDraft> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read draft file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid convention draft: {}", path.display()))
}

pub async fn run_put(config: &Config, file: &Path, json: bool) -> Result<()> {
    let draft = read_draft(file)?;
    let ledger = app::open(config).await?;
    let saved = ledger.create_or_update_convention(&draft).await;
    app::close(ledger).await;
    let saved = saved?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "saved {} v{} ({})",
            saved.key(),
            saved.version,
            saved.identifier
        );
    }
    Ok(())
}

pub async fn run_get(
    config: &Config,
    key: &ConventionKey,
    version: Option<i64>,
    json: bool,
) -> Result<()> {
    let ledger = app::open(config).await?;
    let conv = ledger.read_convention(key, version).await;
    app::close(ledger).await;

    let Some(conv) = conv? else {
        bail!("convention not found: {}", key);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&conv)?);
    } else {
        print_convention(&conv);
    }
    Ok(())
}

pub async fn run_history(config: &Config, key: &ConventionKey, json: bool) -> Result<()> {
    let ledger = app::open(config).await?;
    let versions = ledger.convention_history(key).await;
    app::close(ledger).await;
    let versions = versions?;

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    if versions.is_empty() {
        println!("No versions of {}.", key);
    }
    for conv in &versions {
        println!(
            "v{}  {}  {}",
            conv.version,
            conv.created_at.format("%Y-%m-%d %H:%M:%S"),
            conv.identifier
        );
    }
    Ok(())
}

/// Latest conventions of a project, optionally one category only.
pub async fn run_list(
    config: &Config,
    project: &str,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let ledger = app::open(config).await?;
    let conventions = ledger.read_conventions(project, category).await;
    app::close(ledger).await;
    let conventions = conventions?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conventions)?);
        return Ok(());
    }

    if conventions.is_empty() {
        println!("No conventions in project {}.", project);
    }
    for conv in &conventions {
        println!("{} (v{})", conv.key(), conv.version);
    }
    Ok(())
}

pub async fn run_delete(config: &Config, key: &ConventionKey) -> Result<()> {
    let ledger = app::open(config).await?;
    let deleted = ledger.soft_delete_convention(key).await;
    app::close(ledger).await;
    let deleted = deleted?;

    if deleted == 0 {
        println!("{}: nothing to delete", key);
    } else {
        println!("soft-deleted {} version(s) of {}", deleted, key);
    }
    Ok(())
}

fn print_convention(conv: &ProjectConvention) {
    println!("--- Project Convention ---");
    println!("key:          {}", conv.key());
    println!("version:      {}", conv.version);
    println!("id:           {}", conv.identifier);
    println!("created_at:   {}", conv.created_at);
    println!();
    println!("{}", conv.content);
    if let Some(example) = &conv.example_correct {
        println!();
        println!("correct:");
        println!("{}", example);
    }
    if let Some(example) = &conv.example_incorrect {
        println!();
        println!("incorrect:");
        println!("{}", example);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_draft_with_examples() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"project": "p", "category": "API", "title": "REST naming",
                "content": "Use plural nouns", "example_correct": "GET /users"}}"#
        )
        .unwrap();
        let draft = read_draft(file.path()).unwrap();
        assert_eq!(draft.example_correct.as_deref(), Some("GET /users"));
        assert!(draft.example_incorrect.is_none());
    }
}
