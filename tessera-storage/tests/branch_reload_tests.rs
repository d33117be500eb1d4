//! Branch reloads seen through the request path.
//!
//! A store built over a loaded branch cache answers from the branch table
//! until the next load swaps it; a failed load leaves the old table serving.

use std::sync::Arc;

use tessera_storage::{
    BranchCache, BranchCacheLoader, CacheState, DirectorySnapshotSource, InMemoryRowStore,
    ReadContext, Store,
};
use tessera_test_utils::assertions::parse_response;
use tessera_test_utils::fixtures::{encoded, snapshot_dir, snapshot_lines, triples, write_snapshot};
use tessera_test_utils::{TesseraConfig, TriplesRequest};

const POINTER: &str = "latest_branch_cache_version.txt";

fn name_cell(name: &str) -> String {
    encoded(&triples("geoId/06", &[("name", name)]))
}

fn request() -> TriplesRequest {
    TriplesRequest {
        ids: vec!["geoId/06".to_string()],
        ..Default::default()
    }
}

async fn name_of(store: &Store) -> String {
    let payload = store
        .get_triples(&ReadContext::background(), &request())
        .await
        .expect("read should succeed");
    parse_response(&payload)["geoId/06"][0]["objectId"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_reload_swaps_what_requests_see() {
    let base_cell = name_cell("base");
    let v1 = snapshot_lines(&[("d/7/geoId/06", name_cell("v1").as_str())]);
    let dir = snapshot_dir(POINTER, "v1", &[("part-00000", v1.as_str())]);

    let cache = Arc::new(BranchCache::new());
    let source = Arc::new(DirectorySnapshotSource::new(dir.path(), POINTER));
    let config = TesseraConfig::default().with_snapshot_root(dir.path());
    let loader = BranchCacheLoader::from_config(Arc::clone(&cache), source, &config);
    let store = Store::new(
        Arc::new(InMemoryRowStore::from_rows([("d/7/geoId/06", base_cell)])),
        Some(Arc::clone(&cache)),
        config,
    );

    let report = loader.initialize().await.expect("initial load should succeed");
    assert_eq!(report.entries, 1);
    assert_eq!(name_of(&store).await, "v1");

    let v2 = snapshot_lines(&[("d/7/geoId/06", name_cell("v2").as_str())]);
    write_snapshot(dir.path(), POINTER, "v2", &[("part-00000", v2.as_str())]);
    loader.load("v2").await.expect("reload should succeed");
    assert_eq!(name_of(&store).await, "v2");
    assert!(matches!(
        cache.state(),
        CacheState::Ready { version: Some(ref v), .. } if v == "v2"
    ));
}

#[tokio::test]
async fn test_failed_load_keeps_serving_previous_table() {
    let v1 = snapshot_lines(&[("d/7/geoId/06", name_cell("v1").as_str())]);
    let dir = snapshot_dir(POINTER, "v1", &[("part-00000", v1.as_str())]);
    let cache = Arc::new(BranchCache::new());
    let source = Arc::new(DirectorySnapshotSource::new(dir.path(), POINTER));
    let loader = BranchCacheLoader::new(Arc::clone(&cache), source);
    let store = Store::new(
        Arc::new(InMemoryRowStore::new()),
        Some(Arc::clone(&cache)),
        TesseraConfig::default(),
    );

    loader.initialize().await.expect("initial load should succeed");
    assert!(loader.load("missing-version").await.is_err());
    assert_eq!(name_of(&store).await, "v1");
}

#[tokio::test]
async fn test_oversized_lines_are_skipped() {
    let big = "x".repeat(512);
    let object = format!(
        "{}d/7/geoId/07,{}\n",
        snapshot_lines(&[("d/7/geoId/06", name_cell("kept").as_str())]),
        big
    );
    let dir = snapshot_dir(POINTER, "v1", &[("part-00000", object.as_str())]);
    let cache = Arc::new(BranchCache::new());
    let source = Arc::new(DirectorySnapshotSource::new(dir.path(), POINTER));
    let loader = BranchCacheLoader::new(Arc::clone(&cache), source).with_line_buffer(64, 400);

    let report = loader.initialize().await.expect("load should succeed");
    assert_eq!(report.oversized_lines, 1);
    assert!(cache.read("d/7/geoId/07").is_none());
    assert!(cache.read("d/7/geoId/06").is_some());
}
