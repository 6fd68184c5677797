//! Integration tests for the SQLite carve store, exercised against both
//! block backends.

use bytes::Bytes;
use carver_core::{CarveListOptions, CarveMetadata, ListOptions, generate_session_id};
use carver_metadata::{BlockBackend, CarveStore, MetadataError, SqliteCarveStore};
use carver_storage::MemoryBackend;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Build one store per block backend, each with its own database file.
async fn stores(dir: &tempfile::TempDir) -> Vec<(&'static str, SqliteCarveStore)> {
    let db_store = SqliteCarveStore::new(dir.path().join("db.sqlite"), BlockBackend::Database)
        .await
        .expect("Failed to open database-backed store");
    let obj_store = SqliteCarveStore::new(
        dir.path().join("obj.sqlite"),
        BlockBackend::Objects(Arc::new(MemoryBackend::new())),
    )
    .await
    .expect("Failed to open object-backed store");
    vec![("database", db_store), ("objects", obj_store)]
}

fn sample_carve(seed: u32, block_count: i64, block_size: i64, carve_size: i64) -> CarveMetadata {
    CarveMetadata {
        id: 0,
        created_at: OffsetDateTime::now_utc(),
        host_id: 1,
        name: format!("host1-20260825-req{seed}"),
        block_count,
        block_size,
        carve_size,
        carve_id: format!("carve-{seed}"),
        request_id: format!("req{seed}"),
        session_id: generate_session_id(),
        expired: false,
        max_block: -1,
    }
}

fn list_all(expired: bool) -> CarveListOptions {
    CarveListOptions {
        list_options: ListOptions::default(),
        expired,
    }
}

/// Backdate a carve so the cleanup sweep treats it as stale.
async fn backdate(store: &SqliteCarveStore, carve_id: i64, hours: i64) {
    sqlx::query("UPDATE carves SET created_at = ? WHERE id = ?")
        .bind(OffsetDateTime::now_utc() - time::Duration::hours(hours))
        .bind(carve_id)
        .execute(store.pool())
        .await
        .expect("Backdate failed");
}

#[tokio::test]
async fn test_new_carve_starts_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let created = store
            .new_carve(&sample_carve(1, 10, 1024, 10240))
            .await
            .expect("Create carve failed");

        assert!(created.id > 0, "{backend}: row id assigned");
        assert_eq!(created.max_block, -1, "{backend}");
        assert!(!created.expired, "{backend}");
        assert!(!created.blocks_complete(), "{backend}");

        let by_id = store.carve(created.id).await.expect("Lookup by id failed");
        assert_eq!(by_id.carve_id, created.carve_id, "{backend}");

        let by_session = store
            .carve_by_session_id(&created.session_id)
            .await
            .expect("Lookup by session failed");
        assert_eq!(by_session.id, created.id, "{backend}");

        let by_name = store
            .carve_by_name(&created.name)
            .await
            .expect("Lookup by name failed");
        assert_eq!(by_name.id, created.id, "{backend}");
    }
}

#[tokio::test]
async fn test_duplicate_identifiers_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let first = sample_carve(1, 2, 16, 32);
        store.new_carve(&first).await.expect("Create carve failed");

        let mut dup = sample_carve(2, 2, 16, 32);
        dup.carve_id = first.carve_id.clone();
        let err = store.new_carve(&dup).await.unwrap_err();
        assert!(
            matches!(err, MetadataError::AlreadyExists(_)),
            "{backend}: got {err}"
        );
    }
}

#[tokio::test]
async fn test_block_upload_to_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let carve = store
            .new_carve(&sample_carve(1, 3, 4, 10))
            .await
            .expect("Create carve failed");

        for block_id in 0..3i64 {
            let len = if block_id == 2 { 2 } else { 4 };
            store
                .new_block(&carve, block_id, Bytes::from(vec![block_id as u8; len]))
                .await
                .expect("Store block failed");

            let current = store.carve(carve.id).await.expect("Refetch failed");
            assert_eq!(current.max_block, block_id, "{backend}");
        }

        let done = store.carve(carve.id).await.expect("Refetch failed");
        assert!(done.blocks_complete(), "{backend}");

        for block_id in 0..3i64 {
            let len = if block_id == 2 { 2 } else { 4 };
            let data = store
                .get_block(&carve, block_id)
                .await
                .expect("Fetch block failed");
            assert_eq!(data, Bytes::from(vec![block_id as u8; len]), "{backend}");
        }
    }
}

#[tokio::test]
async fn test_max_block_tracks_highest_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let carve = store
            .new_carve(&sample_carve(1, 5, 8, 40))
            .await
            .expect("Create carve failed");

        // Out-of-order arrival: only the highest stored index matters.
        store
            .new_block(&carve, 3, Bytes::from_static(b"33333333"))
            .await
            .expect("Store block failed");
        store
            .new_block(&carve, 1, Bytes::from_static(b"11111111"))
            .await
            .expect("Store block failed");

        let current = store.carve(carve.id).await.expect("Refetch failed");
        assert_eq!(current.max_block, 3, "{backend}");
        assert!(!current.blocks_complete(), "{backend}");
    }
}

#[tokio::test]
async fn test_duplicate_block_keeps_first_payload() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let carve = store
            .new_carve(&sample_carve(1, 2, 5, 10))
            .await
            .expect("Create carve failed");

        store
            .new_block(&carve, 0, Bytes::from_static(b"first"))
            .await
            .expect("Store block failed");

        let err = store
            .new_block(&carve, 0, Bytes::from_static(b"again"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, MetadataError::AlreadyExists(_)),
            "{backend}: got {err}"
        );

        let data = store.get_block(&carve, 0).await.expect("Fetch block failed");
        assert_eq!(data, Bytes::from_static(b"first"), "{backend}");
    }
}

#[tokio::test]
async fn test_out_of_range_block_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let carve = store
            .new_carve(&sample_carve(1, 3, 4, 12))
            .await
            .expect("Create carve failed");

        for bad in [-1i64, 3, 100] {
            let err = store
                .new_block(&carve, bad, Bytes::from_static(b"data"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, MetadataError::InvalidArgument(_)),
                "{backend}: block {bad} got {err}"
            );
        }

        // Nothing was persisted by the rejected writes.
        let current = store.carve(carve.id).await.expect("Refetch failed");
        assert_eq!(current.max_block, -1, "{backend}");
    }
}

#[tokio::test]
async fn test_missing_block_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let carve = store
            .new_carve(&sample_carve(1, 3, 4, 12))
            .await
            .expect("Create carve failed");

        let err = store.get_block(&carve, 1).await.unwrap_err();
        assert!(
            matches!(err, MetadataError::NotFound(_)),
            "{backend}: got {err}"
        );
    }
}

#[tokio::test]
async fn test_cleanup_expires_stale_carves_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let stale = store
            .new_carve(&sample_carve(1, 2, 4, 8))
            .await
            .expect("Create carve failed");
        store
            .new_block(&stale, 0, Bytes::from_static(b"aaaa"))
            .await
            .expect("Store block failed");
        backdate(&store, stale.id, 25).await;

        let fresh = store
            .new_carve(&sample_carve(2, 2, 4, 8))
            .await
            .expect("Create carve failed");
        store
            .new_block(&fresh, 0, Bytes::from_static(b"bbbb"))
            .await
            .expect("Store block failed");
        backdate(&store, fresh.id, 1).await;

        let stats = store
            .cleanup_carves(OffsetDateTime::now_utc(), Duration::from_secs(24 * 3600))
            .await
            .expect("Cleanup failed");
        assert_eq!(stats.expired, 1, "{backend}");
        assert!(stats.errors.is_empty(), "{backend}");

        // Metadata survives for audit; block data does not.
        let swept = store.carve(stale.id).await.expect("Refetch failed");
        assert!(swept.expired, "{backend}");
        assert_eq!(swept.max_block, -1, "{backend}");
        let err = store.get_block(&swept, 0).await.unwrap_err();
        assert!(
            matches!(err, MetadataError::NotFound(_)),
            "{backend}: got {err}"
        );

        // The fresh carve is untouched.
        let kept = store.carve(fresh.id).await.expect("Refetch failed");
        assert!(!kept.expired, "{backend}");
        let data = store.get_block(&kept, 0).await.expect("Fetch block failed");
        assert_eq!(data, Bytes::from_static(b"bbbb"), "{backend}");

        // Uploads to the expired carve are refused.
        let err = store
            .new_block(&swept, 1, Bytes::from_static(b"cccc"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, MetadataError::Expired(_)),
            "{backend}: got {err}"
        );

        // A second sweep finds nothing left to do.
        let stats = store
            .cleanup_carves(OffsetDateTime::now_utc(), Duration::from_secs(24 * 3600))
            .await
            .expect("Cleanup failed");
        assert_eq!(stats.expired, 0, "{backend}");
    }
}

#[tokio::test]
async fn test_cleanup_reclaims_every_block_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let memory = Arc::new(MemoryBackend::new());
    let backends: Vec<(&str, SqliteCarveStore)> = vec![
        (
            "database",
            SqliteCarveStore::new(dir.path().join("db.sqlite"), BlockBackend::Database)
                .await
                .expect("Failed to open database-backed store"),
        ),
        (
            "objects",
            SqliteCarveStore::new(
                dir.path().join("obj.sqlite"),
                BlockBackend::Objects(memory.clone()),
            )
            .await
            .expect("Failed to open object-backed store"),
        ),
    ];

    for (backend, store) in backends {
        let carve = store
            .new_carve(&sample_carve(1, 3, 4, 12))
            .await
            .expect("Create carve failed");
        for block_id in 0..3i64 {
            store
                .new_block(&carve, block_id, Bytes::from(vec![0u8; 4]))
                .await
                .expect("Store block failed");
        }
        backdate(&store, carve.id, 25).await;

        let stats = store
            .cleanup_carves(OffsetDateTime::now_utc(), Duration::from_secs(24 * 3600))
            .await
            .expect("Cleanup failed");
        assert_eq!(stats.expired, 1, "{backend}");

        // The expired flag and the row deletion commit together, so no
        // block row can outlive the sweep that expired its carve.
        let orphans: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM carve_blocks WHERE carve_id = ?")
                .bind(carve.id)
                .fetch_one(store.pool())
                .await
                .expect("Orphan count failed");
        assert_eq!(orphans, 0, "{backend}");
    }

    // Object payloads are reclaimed too.
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_list_filters_expired_and_paginates() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        for seed in 1..=5u32 {
            store
                .new_carve(&sample_carve(seed, 2, 4, 8))
                .await
                .expect("Create carve failed");
        }
        let mut third = store.carve_by_name("host1-20260825-req3").await.expect("Lookup failed");
        third.expired = true;
        store.update_carve(&third).await.expect("Update failed");

        let active = store.list_carves(&list_all(false)).await.expect("List failed");
        assert_eq!(active.len(), 4, "{backend}");
        assert!(active.iter().all(|c| !c.expired), "{backend}");

        let all = store.list_carves(&list_all(true)).await.expect("List failed");
        assert_eq!(all.len(), 5, "{backend}");

        let page = store
            .list_carves(&CarveListOptions {
                list_options: ListOptions { page: 1, per_page: 2 },
                expired: true,
            })
            .await
            .expect("List failed");
        assert_eq!(page.len(), 2, "{backend}");
        assert_eq!(page[0].name, "host1-20260825-req3", "{backend}");
    }
}

#[tokio::test]
async fn test_update_missing_carve_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (backend, store) in stores(&dir).await {
        let mut ghost = sample_carve(9, 2, 4, 8);
        ghost.id = 999;
        let err = store.update_carve(&ghost).await.unwrap_err();
        assert!(
            matches!(err, MetadataError::NotFound(_)),
            "{backend}: got {err}"
        );
    }
}
