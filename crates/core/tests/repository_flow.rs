//! End-to-end save/load/list/remove flows over in-memory backends.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use blockvault_api::error::VaultError;
use blockvault_api::metadata::{MetadataStore, OwnerRef, SubmissionFilter};
use blockvault_api::models::SaveType;
use blockvault_core::adapter::PlatformAdapter;
use blockvault_core::config::VaultConfig;
use blockvault_core::metadata::MemoryMetadataStore;
use blockvault_core::repository::{ProjectVault, SaveRequest};
use blockvault_core::storage::MemoryObjectStore;

struct Fixture {
    vault: ProjectVault,
    objects: Arc<MemoryObjectStore>,
    metadata: Arc<MemoryMetadataStore>,
}

async fn fixture(root: &std::path::Path) -> Fixture {
    let objects = Arc::new(MemoryObjectStore::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    metadata
        .register_owner(
            "u1",
            OwnerRef {
                owner_id: 1,
                center_id: Some(7),
            },
        )
        .await;
    metadata
        .register_owner(
            "u2",
            OwnerRef {
                owner_id: 2,
                center_id: None,
            },
        )
        .await;

    let vault = ProjectVault::builder(VaultConfig {
        session_root: root.to_path_buf(),
        ..VaultConfig::default()
    })
    .with_object_store(objects.clone())
    .with_metadata_store(metadata.clone())
    .with_adapter(PlatformAdapter::entry_like("demo"))
    .with_adapter(PlatformAdapter::scratch_like("scratch"))
    .build()
    .unwrap();

    Fixture {
        vault,
        objects,
        metadata,
    }
}

fn demo_request(owner: &str) -> SaveRequest {
    SaveRequest::new(
        "demo",
        owner,
        "My Project",
        SaveType::Draft,
        json!({ "objects": [{ "id": "a" }], "scenes": [{ "id": "s1" }] }),
    )
}

#[tokio::test]
async fn draft_save_produces_namespaced_key_and_analysis() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let outcome = fx.vault.save(demo_request("u1")).await.unwrap();

    let re = regex::Regex::new(r"^users/u1/demo/draft/My_Project_\d+\.ent$").unwrap();
    assert!(
        re.is_match(&outcome.storage_key),
        "unexpected key: {}",
        outcome.storage_key
    );
    assert_eq!(
        outcome.storage_url,
        format!("https://storage.local/{}", outcome.storage_key)
    );
    assert_eq!(outcome.analysis.objects, 1);
    assert_eq!(outcome.analysis.scenes, 1);
    assert_eq!(outcome.analysis.blocks, 0);
    assert_eq!(outcome.analysis.complexity, 1);
    assert!(outcome.size_kb >= 1);
    assert!(fx.objects.contains(&outcome.storage_key).await);
    assert_eq!(
        fx.objects.content_type_of(&outcome.storage_key).await,
        Some("application/x-entryjs".to_string())
    );
}

#[tokio::test]
async fn owner_loads_back_what_was_saved() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let saved = fx.vault.save(demo_request("u1")).await.unwrap();
    let loaded = fx.vault.load(saved.record_id, "u1", None).await.unwrap();

    let objects = loaded.bundle.manifest["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["id"], "a");
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
    assert!(loaded.session.is_some());
    assert_eq!(loaded.record.id, saved.record_id);
    assert_eq!(loaded.record.save_type, SaveType::Draft);
}

#[tokio::test]
async fn records_are_invisible_to_other_owners() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let saved = fx.vault.save(demo_request("u1")).await.unwrap();

    assert!(matches!(
        fx.vault.load(saved.record_id, "u2", None).await,
        Err(VaultError::NotFound(_))
    ));
    assert!(matches!(
        fx.vault.remove(saved.record_id, "u2").await,
        Err(VaultError::NotFound(_))
    ));

    // The record is untouched for its actual owner
    let loaded = fx.vault.load(saved.record_id, "u1", None).await.unwrap();
    assert_eq!(loaded.record.id, saved.record_id);
}

#[tokio::test]
async fn repeated_saves_never_share_a_key() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let mut keys = HashSet::new();
    for _ in 0..5 {
        let outcome = fx.vault.save(demo_request("u1")).await.unwrap();
        keys.insert(outcome.storage_key);
    }
    assert_eq!(keys.len(), 5);
    assert_eq!(fx.objects.len().await, 5);
}

#[tokio::test]
async fn listing_is_newest_first_and_filterable() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let first = fx.vault.save(demo_request("u1")).await.unwrap();
    let second = fx
        .vault
        .save(
            SaveRequest::new(
                "demo",
                "u1",
                "Second",
                SaveType::Final,
                json!({ "objects": [] }),
            ),
        )
        .await
        .unwrap();
    let third = fx
        .vault
        .save(
            SaveRequest::new(
                "scratch",
                "u1",
                "Third",
                SaveType::Final,
                json!({ "targets": [] }),
            ),
        )
        .await
        .unwrap();

    let all = fx.vault.list("u1", &SubmissionFilter::default()).await.unwrap();
    assert_eq!(
        all.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![third.record_id, second.record_id, first.record_id]
    );

    let demo_only = fx
        .vault
        .list(
            "u1",
            &SubmissionFilter {
                platform: Some("demo".to_string()),
                ..SubmissionFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(demo_only.len(), 2);

    let finals = fx
        .vault
        .list(
            "u1",
            &SubmissionFilter {
                save_type: Some(SaveType::Final),
                ..SubmissionFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(finals.len(), 2);

    let capped = fx
        .vault
        .list(
            "u1",
            &SubmissionFilter {
                limit: Some(1),
                ..SubmissionFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].id, third.record_id);

    let empty = fx.vault.list("u2", &SubmissionFilter::default()).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn remove_deletes_record_and_stored_object() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let saved = fx.vault.save(demo_request("u1")).await.unwrap();
    assert_eq!(fx.objects.len().await, 1);

    fx.vault.remove(saved.record_id, "u1").await.unwrap();
    assert!(fx.objects.is_empty().await);
    assert!(
        fx.vault
            .list("u1", &SubmissionFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert!(matches!(
        fx.vault.remove(saved.record_id, "u1").await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn remove_tolerates_a_missing_stored_object() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let saved = fx.vault.save(demo_request("u1")).await.unwrap();
    // Simulate an operator deleting the object out from under the record
    fx.vault.gateway().delete(&saved.storage_key).await.unwrap();

    fx.vault.remove(saved.record_id, "u1").await.unwrap();
    assert!(
        fx.vault
            .list("u1", &SubmissionFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn operations_leave_an_activity_trail() {
    let tmp = tempfile::tempdir().unwrap();
    let fx = fixture(tmp.path()).await;

    let saved = fx.vault.save(demo_request("u1")).await.unwrap();
    fx.vault.load(saved.record_id, "u1", None).await.unwrap();
    fx.vault.remove(saved.record_id, "u1").await.unwrap();

    let actions: Vec<String> = fx
        .metadata
        .activities()
        .await
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(actions, vec!["save", "load", "delete"]);
}
