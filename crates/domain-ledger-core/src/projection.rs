//! Canonical text projection of aggregates.
//!
//! The projection is what the embedding generator sees. Field order is
//! fixed and segments are joined with [`SEPARATOR`], so two aggregates with
//! equal content always produce byte-identical text.

use crate::models::{DomainDocument, ProjectConvention};

/// Joins projection segments.
pub const SEPARATOR: &str = " | ";

/// `domain | project | service | summary | properties | policies`.
///
/// Properties render as `name(type): description` and policies as
/// `category - content`. Empty lists are left out.
pub fn document_text(doc: &DomainDocument) -> String {
    let mut parts = vec![
        format!("domain: {}", doc.domain),
        format!("project: {}", doc.project),
        format!("service: {}", doc.service),
        format!("summary: {}", doc.summary),
    ];

    if !doc.properties.is_empty() {
        let props: Vec<String> = doc
            .properties
            .iter()
            .map(|p| format!("{}({}): {}", p.name, p.data_type, p.description))
            .collect();
        parts.push(format!("properties: {}", props.join(", ")));
    }

    if !doc.policies.is_empty() {
        let policies: Vec<String> = doc
            .policies
            .iter()
            .map(|p| format!("{} - {}", p.category, p.content))
            .collect();
        parts.push(format!("policies: {}", policies.join(", ")));
    }

    parts.join(SEPARATOR)
}

/// `title | category | content`, then the examples when present.
pub fn convention_text(conv: &ProjectConvention) -> String {
    let mut parts = vec![
        format!("convention: {}", conv.title),
        format!("category: {}", conv.category),
        format!("content: {}", conv.content),
    ];
    if let Some(ok) = non_blank(&conv.example_correct) {
        parts.push(format!("correct example: {}", ok));
    }
    if let Some(bad) = non_blank(&conv.example_incorrect) {
        parts.push(format!("incorrect example: {}", bad));
    }
    parts.join(SEPARATOR)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
