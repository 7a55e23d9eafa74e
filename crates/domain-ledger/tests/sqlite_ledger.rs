use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use domain_ledger::app::{self, SqliteLedger};
use domain_ledger::config::{Config, EmbeddingConfig};
use domain_ledger::models::{
    now_millis, AggregateKind, ConventionDraft, ConventionKey, DocumentDraft, DocumentKey,
    DomainPolicy, DomainProperty, DomainRelationship, Draft,
};
use domain_ledger::store::{AggregateStore, DocumentStore};
use domain_ledger::LedgerError;

async fn open_ledger(provider: &str) -> (TempDir, SqliteLedger) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("data/ledger.sqlite"));
    config.embedding = EmbeddingConfig {
        provider: provider.to_string(),
        dims: Some(384),
        ..EmbeddingConfig::default()
    };
    let ledger = app::open(&config).await.unwrap();
    (tmp, ledger)
}

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

fn order_draft() -> DocumentDraft {
    DocumentDraft {
        project: "Ttutta".to_string(),
        service: "Shop".to_string(),
        domain: "Order".to_string(),
        summary: "customer purchase orders".to_string(),
        properties: vec![DomainProperty {
            name: "amount".to_string(),
            description: "total price".to_string(),
            data_type: "Decimal".to_string(),
            is_required: true,
            is_immutable: true,
        }],
        policies: vec![DomainPolicy {
            category: "LIFECYCLE".to_string(),
            subject: None,
            content: "orders expire after 30 days".to_string(),
        }],
        dependencies: vec![DomainRelationship {
            target: user_key(),
            relation_type: "DEPENDENCY".to_string(),
            description: "orders belong to a user".to_string(),
            impact_description: Some("user removal orphans orders".to_string()),
        }],
    }
}

fn naming_draft(content: &str) -> ConventionDraft {
    ConventionDraft {
        project: "Ttutta".to_string(),
        category: "NAMING".to_string(),
        title: "Variable naming".to_string(),
        content: content.to_string(),
        example_correct: Some("let user_id = 1;".to_string()),
        example_incorrect: Some("let userId = 1;".to_string()),
    }
}

fn user_key() -> DocumentKey {
    DocumentKey::new("Ttutta", "Auth", "User")
}

#[tokio::test]
async fn test_versions_are_appended() {
    let (_tmp, ledger) = open_ledger("hash").await;

    let v1 = ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    let v2 = ledger
        .create_or_update_document(&user_draft("registered user accounts"))
        .await
        .unwrap();

    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_ne!(v1.identifier, v2.identifier);

    let latest = ledger.read_spec(&user_key(), None).await.unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.summary, "registered user accounts");

    let first = ledger.read_spec(&user_key(), Some(1)).await.unwrap().unwrap();
    assert_eq!(first.summary, "user accounts");
    assert_eq!(first.properties, v1.properties);
    assert_eq!(first.policies, v1.policies);

    let history = ledger.document_history(&user_key()).await.unwrap();
    let versions: Vec<i64> = history.iter().map(|d| d.version).collect();
    assert_eq!(versions, vec![2, 1]);
}

#[tokio::test]
async fn test_children_round_trip_in_order() {
    let (_tmp, ledger) = open_ledger("disabled").await;

    let mut draft = user_draft("user accounts");
    draft.properties.push(DomainProperty {
        name: "nickname".to_string(),
        description: "display name".to_string(),
        data_type: "String".to_string(),
        is_required: false,
        is_immutable: false,
    });
    let saved = ledger.create_or_update_document(&draft).await.unwrap();

    let names: Vec<&str> = saved.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["email", "nickname"]);
    assert_eq!(saved.policies[0].subject.as_deref(), Some("ADMIN"));
}

#[tokio::test]
async fn test_save_round_trips_by_identifier() {
    let (_tmp, ledger) = open_ledger("disabled").await;

    let mut draft = order_draft();
    draft.dependencies.push(DomainRelationship {
        target: DocumentKey::new("Ttutta", "Shop", "Cart"),
        relation_type: "REFERENCE".to_string(),
        description: "orders are created from carts".to_string(),
        impact_description: None,
    });
    let document = draft.build(Uuid::new_v4(), 1, now_millis());
    ledger.document_store().save(&document).await.unwrap();
    let loaded = ledger
        .document_store()
        .find_by_identifier(document.identifier)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, document);
    assert!(loaded.policies[0].subject.is_none());
    assert!(loaded.dependencies[1].impact_description.is_none());

    let convention = ConventionDraft {
        example_correct: Some(String::new()),
        example_incorrect: None,
        ..naming_draft("use snake_case for variables")
    }
    .build(Uuid::new_v4(), 1, now_millis());
    ledger.convention_store().save(&convention).await.unwrap();
    let loaded = ledger
        .convention_store()
        .find_by_identifier(convention.identifier)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, convention);
    assert_eq!(loaded.example_correct.as_deref(), Some(""));
    assert!(loaded.example_incorrect.is_none());
}

#[tokio::test]
async fn test_invalid_draft_writes_nothing() {
    let (_tmp, ledger) = open_ledger("hash").await;

    let err = ledger
        .create_or_update_document(&user_draft("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
    assert!(ledger.read_spec(&user_key(), None).await.unwrap().is_none());
    assert!(ledger.project_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_version_is_a_conflict() {
    let (_tmp, ledger) = open_ledger("disabled").await;
    let store = ledger.document_store();

    let draft = user_draft("user accounts");
    store
        .save(&draft.build(Uuid::new_v4(), 1, now_millis()))
        .await
        .unwrap();
    let err = store
        .save(&draft.build(Uuid::new_v4(), 1, now_millis()))
        .await
        .unwrap_err();

    match err {
        LedgerError::Conflict { key, version } => {
            assert_eq!(key, "Ttutta/Auth/User");
            assert_eq!(version, 1);
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(store.max_version(&user_key()).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_soft_delete_hides_every_version() {
    let (_tmp, ledger) = open_ledger("hash").await;
    ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    ledger
        .create_or_update_document(&user_draft("registered user accounts"))
        .await
        .unwrap();

    assert_eq!(ledger.soft_delete_document(&user_key()).await.unwrap(), 2);
    assert_eq!(ledger.soft_delete_document(&user_key()).await.unwrap(), 0);

    assert!(ledger.read_spec(&user_key(), None).await.unwrap().is_none());
    assert!(ledger.read_spec(&user_key(), Some(1)).await.unwrap().is_none());
    assert!(ledger.document_history(&user_key()).await.unwrap().is_empty());
    assert!(ledger.latest_documents("Ttutta").await.unwrap().is_empty());

    let result = ledger.semantic_search("user accounts", 10, -1.0).await.unwrap();
    assert_eq!(result.total_count, 0);

    // re-creating continues after the deleted versions
    let again = ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    assert_eq!(again.version, 3);
}

#[tokio::test]
async fn test_search_ranks_both_families() {
    let (_tmp, ledger) = open_ledger("hash").await;
    ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    ledger.create_or_update_document(&order_draft()).await.unwrap();
    ledger
        .create_or_update_convention(&naming_draft("use snake_case for variables"))
        .await
        .unwrap();

    let result = ledger
        .semantic_search("user authentication policy", 5, 0.3)
        .await
        .unwrap();
    assert_eq!(result.total_count, result.matches.len());
    assert_eq!(result.matches[0].document_type, AggregateKind::DomainDocument);
    assert_eq!(result.matches[0].content["domain"], "User");
    assert!(result.matches.iter().all(|m| m.similarity > 0.3));
    assert!(result.matches.iter().all(|m| m.content["domain"] != "Order"));

    let everything = ledger.semantic_search("user", 10, -1.0).await.unwrap();
    assert_eq!(everything.total_count, 3);
    assert!(everything
        .matches
        .windows(2)
        .all(|w| w[0].similarity >= w[1].similarity));
    assert!(everything
        .matches
        .iter()
        .any(|m| m.document_type == AggregateKind::ProjectConvention));

    let top_one = ledger.semantic_search("user", 1, -1.0).await.unwrap();
    assert_eq!(top_one.matches.len(), 1);

    let err = ledger.semantic_search("", 5, 0.3).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn test_search_without_provider_fails() {
    let (_tmp, ledger) = open_ledger("disabled").await;
    ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    let err = ledger.semantic_search("user", 5, 0.3).await.unwrap_err();
    assert!(matches!(err, LedgerError::Infrastructure(_)));
}

#[tokio::test]
async fn test_impact_lists_latest_dependents() {
    let (_tmp, ledger) = open_ledger("disabled").await;
    ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();

    let report = ledger.analyze_impact(&user_key()).await.unwrap();
    assert!(report.is_empty());
    assert!(report.describe().contains("no dependents found"));

    ledger.create_or_update_document(&order_draft()).await.unwrap();
    let report = ledger.analyze_impact(&user_key()).await.unwrap();
    assert_eq!(report.dependents.len(), 1);
    let dep = &report.dependents[0];
    assert_eq!(dep.source, DocumentKey::new("Ttutta", "Shop", "Order"));
    assert_eq!(dep.source_version, 1);
    assert_eq!(dep.relation_type, "DEPENDENCY");
    assert!(report.describe().contains("user removal orphans orders"));

    // a newer Order version without the edge is no longer a dependent
    let mut standalone = order_draft();
    standalone.dependencies.clear();
    ledger.create_or_update_document(&standalone).await.unwrap();
    let report = ledger.analyze_impact(&user_key()).await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_conventions_by_project_and_category() {
    let (_tmp, ledger) = open_ledger("hash").await;
    ledger
        .create_or_update_convention(&naming_draft("use snake_case for variables"))
        .await
        .unwrap();
    ledger
        .create_or_update_convention(&naming_draft("use snake_case for all bindings"))
        .await
        .unwrap();
    ledger
        .create_or_update_convention(&ConventionDraft {
            project: "Ttutta".to_string(),
            category: "API".to_string(),
            title: "REST naming".to_string(),
            content: "plural nouns for collections".to_string(),
            example_correct: None,
            example_incorrect: None,
        })
        .await
        .unwrap();

    let all = ledger.read_conventions("Ttutta", None).await.unwrap();
    assert_eq!(all.len(), 2);

    let naming = ledger.read_conventions("Ttutta", Some("NAMING")).await.unwrap();
    assert_eq!(naming.len(), 1);
    assert_eq!(naming[0].version, 2);
    assert_eq!(naming[0].content, "use snake_case for all bindings");

    let key = ConventionKey::new("Ttutta", "NAMING", "Variable naming");
    let v1 = ledger.read_convention(&key, Some(1)).await.unwrap().unwrap();
    assert_eq!(v1.example_incorrect.as_deref(), Some("let userId = 1;"));

    assert!(ledger
        .read_conventions("Ttutta", Some("TESTING"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_project_names_span_both_families() {
    let (_tmp, ledger) = open_ledger("disabled").await;
    ledger
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    let mut other = naming_draft("use snake_case");
    other.project = "Billing".to_string();
    ledger.create_or_update_convention(&other).await.unwrap();

    let names: Vec<String> = ledger.project_names().await.unwrap().into_iter().collect();
    assert_eq!(names, vec!["Billing".to_string(), "Ttutta".to_string()]);
}

#[tokio::test]
async fn test_backfill_indexes_rows_written_without_provider() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ledger.sqlite");

    let plain = app::open(&Config::minimal(&path)).await.unwrap();
    plain
        .create_or_update_document(&user_draft("user accounts"))
        .await
        .unwrap();
    plain
        .create_or_update_convention(&naming_draft("use snake_case for variables"))
        .await
        .unwrap();
    app::close(plain).await;

    let mut config = Config::minimal(&path);
    config.embedding.provider = "hash".to_string();
    config.embedding.dims = Some(384);
    let ledger = app::open(&config).await.unwrap();

    assert_eq!(ledger.semantic_search("user", 10, -1.0).await.unwrap().total_count, 0);

    let report = ledger.reindex_pending(None).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 0);
    assert!(ledger.document_store().find_unembedded(None).await.unwrap().is_empty());
    assert_eq!(ledger.semantic_search("user", 10, -1.0).await.unwrap().total_count, 2);

    let rebuilt = ledger.rebuild_index().await.unwrap();
    assert_eq!(rebuilt.indexed, 2);
}

#[tokio::test]
async fn test_concurrent_writers_get_distinct_versions() {
    let (_tmp, ledger) = open_ledger("disabled").await;
    let ledger = Arc::new(ledger);

    let mut handles = Vec::new();
    for i in 0..2 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger
                .create_or_update_document(&user_draft(&format!("writer {}", i)))
                .await
        }));
    }

    let mut versions = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(doc) => versions.push(doc.version),
            Err(LedgerError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert!(!versions.is_empty());
    versions.sort();
    versions.dedup();

    let history = ledger.document_history(&user_key()).await.unwrap();
    let mut stored: Vec<i64> = history.iter().map(|d| d.version).collect();
    stored.reverse();
    assert_eq!(stored, (1..=stored.len() as i64).collect::<Vec<_>>());
    assert_eq!(stored.len(), versions.len());
}

#[tokio::test]
async fn test_find_dependents_ignores_deleted_sources() {
    let (_tmp, ledger) = open_ledger("disabled").await;
    ledger.create_or_update_document(&order_draft()).await.unwrap();
    ledger
        .soft_delete_document(&DocumentKey::new("Ttutta", "Shop", "Order"))
        .await
        .unwrap();
    let dependents = ledger
        .document_store()
        .find_dependents(&user_key())
        .await
        .unwrap();
    assert!(dependents.is_empty());
}
