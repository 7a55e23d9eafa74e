//! Impact analysis: which documents depend on a given document.

use serde::Serialize;

use crate::models::DocumentKey;
use crate::store::Dependent;

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub target: DocumentKey,
    pub dependents: Vec<Dependent>,
}

impl ImpactReport {
    pub fn new(target: DocumentKey, mut dependents: Vec<Dependent>) -> Self {
        dependents.sort_by(|a, b| {
            a.source
                .to_string()
                .cmp(&b.source.to_string())
                .then_with(|| a.relation_type.cmp(&b.relation_type))
        });
        Self { target, dependents }
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Human-readable summary, one line per dependent.
    pub fn describe(&self) -> String {
        if self.dependents.is_empty() {
            return format!("{}: no dependents found", self.target);
        }

        let mut out = format!(
            "{} has {} dependent(s):",
            self.target,
            self.dependents.len()
        );
        for d in &self.dependents {
            out.push_str(&format!(
                "\n- {} (v{}) [{}]: {}",
                d.source, d.source_version, d.relation_type, d.description
            ));
            if let Some(impact) = d.impact_description.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!("\n  impact: {}", impact));
            }
        }
        out
    }
}
