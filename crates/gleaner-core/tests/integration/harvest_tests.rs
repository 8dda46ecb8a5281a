use std::collections::HashSet;

use gleaner_core::{
    CheckpointWriter, CuratedCollection, FlushPolicy, HarvestRecord, StrategyKind,
    TracingHarvestReporter,
};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{Call, SimulatedCatalog, fast_config, harvester};

fn keys(records: &[HarvestRecord]) -> Vec<String> {
    records.iter().map(|r| r.primary_key.clone()).collect()
}

fn load(path: &std::path::Path) -> Vec<HarvestRecord> {
    CheckpointWriter::new(path).load().unwrap().records
}

#[tokio::test]
async fn overlapping_terms_never_duplicate_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("songs.csv");
    let catalog = SimulatedCatalog::new()
        .with_results("genre:a", &["k1", "k2", "k3", "k4"])
        .with_results("genre:b", &["k3", "k4", "k5"])
        .with_results("genre:c", &["k1", "k5", "k6"]);
    let reporter = TracingHarvestReporter;

    let summary = harvester(&catalog, &path, fast_config(1_000), &["a", "b", "c"])
        .run(CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert_eq!(summary.total_records, 6);

    // Harvesting the same upstream again adds nothing.
    let again = harvester(&catalog, &path, fast_config(1_000), &["a", "b", "c"])
        .run(CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert_eq!(again.new_records, 0);

    let records = load(&path);
    let unique: HashSet<String> = keys(&records).into_iter().collect();
    assert_eq!(unique.len(), records.len());
    let positions: Vec<u64> = records.iter().map(|r| r.position).collect();
    assert_eq!(positions, (1..=6).collect::<Vec<u64>>());
}

#[tokio::test]
async fn resumed_run_extends_previous_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("songs.csv");
    let catalog = SimulatedCatalog::endless();
    let reporter = TracingHarvestReporter;

    harvester(&catalog, &path, fast_config(25), &["a", "b"])
        .run(CancellationToken::new(), &reporter)
        .await
        .unwrap();
    let first = load(&path);
    assert_eq!(first.len(), 25);

    let summary = harvester(&catalog, &path, fast_config(60), &["a", "b"])
        .run(CancellationToken::new(), &reporter)
        .await
        .unwrap();
    assert_eq!(summary.resumed_records, 25);

    let second = load(&path);
    assert!(second.len() >= first.len());
    assert_eq!(&second[..first.len()], &first[..]);
    let later: HashSet<String> = keys(&second).into_iter().collect();
    assert!(keys(&first).iter().all(|k| later.contains(k)));
}

#[tokio::test]
async fn requests_stay_below_offset_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SimulatedCatalog::endless();

    let summary = harvester(
        &catalog,
        &dir.path().join("songs.csv"),
        fast_config(10_000).with_max_offset(45),
        &["a", "b"],
    )
    .run(CancellationToken::new(), &TracingHarvestReporter)
    .await
    .unwrap();

    let offsets = catalog.search_offsets();
    assert!(offsets.iter().all(|(_, offset)| *offset < 45));
    // 0, 10, 20, 30, 40 for each term.
    assert_eq!(offsets.len(), 10);
    assert_eq!(summary.total_records, 100);
}

#[tokio::test]
async fn term_with_fully_seen_page_is_abandoned() {
    let dir = tempfile::tempdir().unwrap();
    let mut seen_twice: Vec<String> = (0..10).map(|i| format!("x-{i}")).collect();
    seen_twice.extend((0..10).map(|i| format!("x-{i}")));
    seen_twice.extend((10..20).map(|i| format!("x-{i}")));
    let refs: Vec<&str> = seen_twice.iter().map(String::as_str).collect();
    let catalog = SimulatedCatalog::new().with_results("genre:a", &refs);

    let summary = harvester(
        &catalog,
        &dir.path().join("songs.csv"),
        fast_config(1_000),
        &["a"],
    )
    .run(CancellationToken::new(), &TracingHarvestReporter)
    .await
    .unwrap();

    assert_eq!(
        catalog.search_offsets(),
        vec![("genre:a".to_string(), 0), ("genre:a".to_string(), 10)]
    );
    assert_eq!(summary.total_records, 10);
}

#[tokio::test]
async fn forbidden_strategy_is_aborted_and_next_one_runs() {
    let dir = tempfile::tempdir().unwrap();
    let tags = ["a", "b", "c", "d", "e", "f", "g"];
    let mut catalog = SimulatedCatalog::new().with_collection("mix", "m", 5);
    for tag in tags {
        catalog = catalog.forbid(&format!("genre:{tag}"));
    }

    let summary = harvester(
        &catalog,
        &dir.path().join("songs.csv"),
        fast_config(1_000).with_forbidden_threshold(3),
        &tags,
    )
    .with_collections(vec![CuratedCollection::new("mix", "Mixed Bag")])
    .run(CancellationToken::new(), &TracingHarvestReporter)
    .await
    .unwrap();

    assert_eq!(summary.aborted_strategies, vec![StrategyKind::Search]);
    // Aborted on the third forbidden term; later terms never sent.
    assert_eq!(catalog.search_offsets().len(), 3);
    assert_eq!(summary.per_strategy[&StrategyKind::CuratedCollections], 5);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn interrupted_run_leaves_consistent_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("songs.csv");
    let catalog = SimulatedCatalog::endless();
    let cancel = CancellationToken::new();
    catalog.cancel_after(7, cancel.clone());

    let summary = harvester(&catalog, &path, fast_config(1_000), &["a", "b", "c"])
        .run(cancel, &TracingHarvestReporter)
        .await
        .unwrap();
    assert!(summary.cancelled);

    let records = load(&path);
    assert_eq!(records.len(), summary.total_records);
    let unique: HashSet<String> = keys(&records).into_iter().collect();
    assert_eq!(unique.len(), records.len());
    assert!(!CheckpointWriter::new(&path).temp_path().exists());

    // A crash mid-flush: staged but never committed.
    let writer = CheckpointWriter::new(&path);
    let checkpoint = writer.load().unwrap();
    let mut truncated = checkpoint.records.clone();
    truncated.truncate(1);
    let staged = writer.stage(&truncated, &checkpoint.keys).unwrap();
    drop(staged);
    assert_eq!(load(&path), records);
}

#[tokio::test]
async fn harvest_stops_exactly_at_target() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SimulatedCatalog::endless();

    let summary = harvester(
        &catalog,
        &dir.path().join("songs.csv"),
        fast_config(137),
        &["a", "b", "c"],
    )
    .with_batch_ids(vec!["never-1".into(), "never-2".into()])
    .run(CancellationToken::new(), &TracingHarvestReporter)
    .await
    .unwrap();

    assert_eq!(summary.total_records, 137);
    assert!(summary.target_reached());
    assert!(
        !catalog
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Batch { .. }))
    );
}

#[tokio::test]
async fn batch_lookup_fills_gap_after_search() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SimulatedCatalog::new().with_results("genre:a", &["t1", "t2"]);

    let summary = harvester(
        &catalog,
        &dir.path().join("songs.csv"),
        fast_config(1_000),
        &["a"],
    )
    .with_batch_ids(vec!["t2".into(), "t3".into(), "t4".into()])
    .run(CancellationToken::new(), &TracingHarvestReporter)
    .await
    .unwrap();

    assert_eq!(summary.total_records, 4);
    assert_eq!(summary.per_strategy[&StrategyKind::DirectBatch], 2);
    assert!(catalog.calls().contains(&Call::Batch {
        ids: vec!["t3".into(), "t4".into()]
    }));
}

#[tokio::test]
async fn forbidden_count_resets_after_successful_term() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SimulatedCatalog::new()
        .forbid("genre:a")
        .with_results("genre:b", &["b1", "b2"])
        .forbid("genre:c")
        .with_results("genre:d", &["d1"])
        .forbid("genre:e");

    let summary = harvester(
        &catalog,
        &dir.path().join("songs.csv"),
        fast_config(1_000).with_forbidden_threshold(2),
        &["a", "b", "c", "d", "e"],
    )
    .run(CancellationToken::new(), &TracingHarvestReporter)
    .await
    .unwrap();

    assert!(summary.aborted_strategies.is_empty());
    let queried: Vec<String> = catalog
        .search_offsets()
        .into_iter()
        .filter(|(_, offset)| *offset == 0)
        .map(|(query, _)| query)
        .collect();
    assert_eq!(
        queried,
        ["genre:a", "genre:b", "genre:c", "genre:d", "genre:e"]
    );
    assert_eq!(summary.total_records, 3);
}

#[tokio::test]
async fn term_cadence_flushes_without_record_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("songs.csv");
    let catalog = SimulatedCatalog::new()
        .with_results("genre:a", &["a1"])
        .with_results("genre:b", &["b1"])
        .with_results("genre:c", &["c1"])
        .with_results("genre:d", &["d1"])
        .with_results("genre:e", &["e1"])
        .with_results("genre:f", &["f1"]);

    let config = fast_config(1_000).with_flush(FlushPolicy {
        every_records: 0,
        every_terms: 2,
    });
    let summary = harvester(&catalog, &path, config, &["a", "b", "c", "d", "e", "f"])
        .run(CancellationToken::new(), &TracingHarvestReporter)
        .await
        .unwrap();

    // Every second term, then the final save.
    assert_eq!(summary.checkpoints_written, 4);
    assert_eq!(load(&path).len(), 6);
}
