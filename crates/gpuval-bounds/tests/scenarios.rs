// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end ingestion scenarios against the public engine API.

use std::sync::Arc;

use gpuval_app_core::config::ConfigService;
use gpuval_app_core::prefs::{BoundsPrefs, BOUNDS_PREFS_KEY};
use gpuval_bounds::{
    publish, AggregateKey, BatchOutcome, BoundsEngine, InMemoryShaderDirectory, IngestError,
    PendingLocationMap, ShaderLocation,
};
use gpuval_dry_tests::{
    events_of, message, recording_dispatcher, texture_write_key, unchunked_batch,
    BoundsBatchBuilder, InMemoryConfigStore, RecordingResolver, RecordingSink, SinkEvent,
    BOUNDS_KIND,
};
use gpuval_message_proto::{Coordinate, DetailChunk, ResourceToken, SchemaType, ShaderGuid, WireError};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn location(shader_uid: u64) -> ShaderLocation {
    ShaderLocation {
        shader_uid,
        file_uid: 2,
        line: 10,
        column: 5,
    }
}

#[test]
fn two_occurrences_make_one_record() {
    init_tracing();
    let (dispatcher, sink) = recording_dispatcher();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
    let k1 = texture_write_key(1);

    let bytes = BoundsBatchBuilder::new().texture_write(1).texture_write(1).build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();

    let record = engine.table().get(k1).unwrap();
    assert_eq!(record.count(), 2);
    assert_eq!(record.description(), "Texture write out of bounds");
    assert_eq!(engine.table().len(), 1);
    assert_eq!(
        events_of(&sink),
        vec![SinkEvent::Insert(k1), SinkEvent::Delta(k1, 2)]
    );
}

#[test]
fn later_batch_adds_count_and_detail() {
    let (dispatcher, sink) = recording_dispatcher();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
    let k2 = texture_write_key(2);

    let a = BoundsBatchBuilder::new().texture_write(2).build();
    engine.process_batch(&a, BOUNDS_KIND).unwrap();
    assert_eq!(engine.table().get(k2).unwrap().count(), 1);

    let b = BoundsBatchBuilder::new()
        .texture_write_at(2, 7, (3, 4, 5))
        .build();
    engine.process_batch(&b, BOUNDS_KIND).unwrap();

    let record = engine.table().get(k2).unwrap();
    assert_eq!(record.count(), 2);
    let detail = record.detail().unwrap();
    assert_eq!(
        detail.instances(ResourceToken(7)),
        vec!["Out of bounds at 3, 4, 5".to_owned()]
    );
    assert_eq!(
        events_of(&sink),
        vec![
            SinkEvent::Insert(k2),
            SinkEvent::Delta(k2, 1),
            SinkEvent::Delta(k2, 1)
        ]
    );
}

#[test]
fn queued_deltas_rebuild_counts_without_double_counting() {
    let (dispatcher, queue) = publish::queue();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
    let k1 = texture_write_key(1);

    let bytes = BoundsBatchBuilder::new().texture_write(1).texture_write(1).build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();

    // Nothing delivered yet, but the shared count already reflects both flushes.
    let mut sink = RecordingSink::new();
    assert_eq!(queue.run_pending(&mut sink, 1), 1);
    assert_eq!(sink.shown_count(k1), Some(0));
    assert_eq!(sink.refs()[0].upgrade().unwrap().count(), 4);

    assert_eq!(queue.run_pending(&mut sink, 1), 1);
    assert_eq!(sink.shown_count(k1), Some(2));
    assert_eq!(queue.run_pending(&mut sink, usize::MAX), 1);
    assert_eq!(sink.shown_count(k1), Some(4));
    assert_eq!(sink.delta_total(k1), 4);
    assert_eq!(engine.table().get(k1).unwrap().count(), 4);
}

#[test]
fn unchunked_batch_changes_nothing() {
    let (dispatcher, sink) = recording_dispatcher();
    let resolver = Arc::new(RecordingResolver::new());
    let mut engine =
        BoundsEngine::new(BoundsPrefs::default(), dispatcher).with_resolver(resolver.clone());

    for ty in [SchemaType::Static, SchemaType::Dynamic] {
        let report = engine
            .process_batch(&unchunked_batch(ty), BOUNDS_KIND)
            .unwrap();
        assert_eq!(report.outcome, BatchOutcome::Skipped);
    }

    assert!(engine.table().is_empty());
    assert!(engine.details().is_empty());
    assert!(events_of(&sink).is_empty());
    assert!(resolver.is_empty());
    assert_eq!(engine.stats().batches_skipped, 2);
}

#[test]
fn orphan_detail_is_dropped_and_processing_continues() {
    let (dispatcher, _sink) = recording_dispatcher();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
    let k9 = AggregateKey(9);

    let orphan = DetailChunk {
        token: ResourceToken(7),
        coordinate: Coordinate::new(1, 2, 3),
    };
    assert!(engine.ingest_detail(k9, orphan).is_none());
    assert!(engine.table().get(k9).is_none());
    assert!(engine.details().get(k9).is_none());

    let bytes = BoundsBatchBuilder::new().texture_write(3).build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    assert_eq!(engine.table().len(), 1);
    assert_eq!(engine.stats().orphan_details_dropped, 1);
}

#[test]
fn repeated_detail_is_stored_once() {
    let (dispatcher, _sink) = recording_dispatcher();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
    let k2 = texture_write_key(2);

    let bytes = BoundsBatchBuilder::new()
        .texture_write_at(2, 7, (1, 1, 1))
        .texture_write_at(2, 7, (1, 1, 1))
        .build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();

    let detail = engine.details().get(k2).unwrap();
    assert_eq!(detail.instances(ResourceToken(7)).len(), 1);
    assert_eq!(engine.table().get(k2).unwrap().count(), 4);
}

#[test]
fn access_classes_aggregate_separately() {
    let (dispatcher, sink) = recording_dispatcher();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);

    let bytes = BoundsBatchBuilder::new()
        .record(message(5, true, true))
        .record(message(5, true, false))
        .record(message(5, false, true))
        .record(message(5, false, false))
        .record(message(5, false, false))
        .build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();

    let descriptions: Vec<_> = engine
        .table()
        .snapshot()
        .into_iter()
        .map(|s| (s.description, s.count))
        .collect();
    assert_eq!(descriptions.len(), 4);
    assert!(descriptions.contains(&("Buffer read out of bounds".to_owned(), 2)));
    assert!(descriptions.contains(&("Texture write out of bounds".to_owned(), 1)));

    let events = events_of(&sink);
    assert_eq!(events.iter().filter(|e| matches!(e, SinkEvent::Insert(_))).count(), 4);
}

#[test]
fn malformed_batch_after_good_one_keeps_previous_state() {
    init_tracing();
    let (dispatcher, sink) = recording_dispatcher();
    let mut engine = BoundsEngine::new(BoundsPrefs::default(), dispatcher);
    let k = texture_write_key(1);

    let good = BoundsBatchBuilder::new().texture_write(1).build();
    engine.process_batch(&good, BOUNDS_KIND).unwrap();
    let before = events_of(&sink);

    let mut bad = BoundsBatchBuilder::new()
        .texture_write(1)
        .texture_write_at(4, 1, (0, 0, 0))
        .build();
    bad.pop();
    let err = engine.process_batch(&bad, BOUNDS_KIND).unwrap_err();
    assert!(matches!(err, IngestError::Decode(WireError::IncompleteRecord { index: 1, .. })));

    assert_eq!(engine.table().len(), 1);
    assert_eq!(engine.table().get(k).unwrap().count(), 1);
    assert_eq!(events_of(&sink), before);
}

#[test]
fn each_created_record_is_enqueued_once() {
    let (dispatcher, _sink) = recording_dispatcher();
    let resolver = Arc::new(RecordingResolver::new());
    let mut engine =
        BoundsEngine::new(BoundsPrefs::default(), dispatcher).with_resolver(resolver.clone());

    let bytes = BoundsBatchBuilder::new()
        .texture_write(1)
        .texture_write(1)
        .texture_write(2)
        .build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();

    let guids: Vec<_> = resolver.enqueued().into_iter().map(|(_, g)| g).collect();
    assert_eq!(guids, vec![ShaderGuid(1), ShaderGuid(2)]);

    assert_eq!(resolver.resolve_all(|g| location(u64::from(g.0) + 100)), 2);
    assert_eq!(resolver.resolve_all(|_| location(0)), 0);
    let record = engine.table().get(texture_write_key(2)).unwrap();
    assert_eq!(record.location(), Some(location(102)));
}

#[test]
fn resolution_disabled_by_prefs() {
    let (dispatcher, _sink) = recording_dispatcher();
    let resolver = Arc::new(RecordingResolver::new());
    let prefs = BoundsPrefs {
        resolve_locations: false,
        ..BoundsPrefs::default()
    };
    let mut engine = BoundsEngine::new(prefs, dispatcher).with_resolver(resolver.clone());
    let bytes = BoundsBatchBuilder::new().texture_write(1).build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    assert!(resolver.is_empty());
}

#[test]
fn mapping_arrives_after_ingestion() {
    init_tracing();
    let (dispatcher, _sink) = recording_dispatcher();
    let directory = Arc::new(InMemoryShaderDirectory::new());
    let pending = Arc::new(PendingLocationMap::with_directory(directory.clone()));
    let mut engine =
        BoundsEngine::new(BoundsPrefs::default(), dispatcher).with_resolver(pending.clone());

    let bytes = BoundsBatchBuilder::new().texture_write(8).texture_write(9).build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    assert_eq!(pending.pending_len(), 2);

    let mapper = {
        let pending = Arc::clone(&pending);
        std::thread::spawn(move || pending.register_mapping(ShaderGuid(8), location(80)))
    };
    assert_eq!(mapper.join().unwrap(), 1);

    let k8 = texture_write_key(8);
    assert_eq!(engine.table().get(k8).unwrap().location(), Some(location(80)));
    assert!(engine.table().get(texture_write_key(9)).unwrap().location().is_none());

    let shader = directory.get(80).unwrap();
    assert_eq!(shader.uid(), 80);
    let attached: Vec<_> = shader.records().iter().map(|r| r.key()).collect();
    assert_eq!(attached, vec![k8]);

    // Later batches of a resolved key do not re-enqueue.
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    assert_eq!(pending.pending_len(), 1);
}

#[test]
fn engine_reads_saved_prefs() {
    let prefs = BoundsPrefs {
        collect_details: false,
        ..BoundsPrefs::default()
    };
    let store = InMemoryConfigStore::with_json(BOUNDS_PREFS_KEY, &prefs).unwrap();
    let service = ConfigService::new(store);
    let (dispatcher, _sink) = recording_dispatcher();
    let mut engine = BoundsEngine::from_config(&service, dispatcher).unwrap();
    assert_eq!(engine.prefs(), &prefs);

    let bytes = BoundsBatchBuilder::new().texture_write_at(1, 7, (1, 2, 3)).build();
    engine.process_batch(&bytes, BOUNDS_KIND).unwrap();
    assert!(engine.details().is_empty());
}

#[test]
fn missing_prefs_use_defaults() {
    let service = ConfigService::new(InMemoryConfigStore::new());
    let (dispatcher, _sink) = recording_dispatcher();
    let engine = BoundsEngine::from_config(&service, dispatcher).unwrap();
    assert_eq!(engine.prefs(), &BoundsPrefs::default());
}
