// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Batch ingestion: decode, gate, aggregate, index details, publish.

use std::sync::Arc;

use gpuval_app_core::config::{ConfigError, ConfigService, ConfigStore};
use gpuval_app_core::prefs::{BoundsPrefs, BOUNDS_PREFS_KEY};
use gpuval_message_proto::{
    ChunkedMessage, ChunkedView, DetailChunk, MessageId, MessageStream, ResourceBoundsChunk,
    ResourceIndexOutOfBounds, WireError,
};
use rustc_hash::FxHashMap;
use tracing::{debug, instrument, trace, warn};

use crate::detail::{format_instance, DetailIndex, InstanceInsert};
use crate::key::{describe, AggregateKey};
use crate::publish::{Dispatcher, PublicationOp};
use crate::record::RecordRef;
use crate::resolver::LocationResolver;
use crate::table::AggregateTable;
use crate::IngestError;

/// What happened to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Records were aggregated.
    Processed,
    /// The stream does not carry chunked resource bounds records; nothing changed.
    Skipped,
}

/// Per-batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Outcome.
    pub outcome: BatchOutcome,
    /// Raw records aggregated.
    pub records: usize,
    /// Records created by this batch.
    pub created: usize,
    /// Keys whose count changed.
    pub keys_updated: usize,
    /// New unique detail instances.
    pub details_added: usize,
}

impl BatchReport {
    fn empty(outcome: BatchOutcome) -> Self {
        Self {
            outcome,
            records: 0,
            created: 0,
            keys_updated: 0,
            details_added: 0,
        }
    }
}

/// Session totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Batches aggregated.
    pub batches_processed: u64,
    /// Batches rejected by the schema gate.
    pub batches_skipped: u64,
    /// Raw records aggregated.
    pub records_seen: u64,
    /// Aggregate records created.
    pub records_created: u64,
    /// Unique detail instances stored.
    pub detail_instances_added: u64,
    /// Detail chunks dropped because their key had no record.
    pub orphan_details_dropped: u64,
    /// Detail instances dropped by the per-resource cap.
    pub instances_capped: u64,
}

/// Resource bounds aggregation engine.
///
/// Owns the aggregate table and the detail index. `&mut self` on the
/// ingestion entry points makes it the single writer; readers share records
/// through the `Arc`s the table hands out.
pub struct BoundsEngine {
    prefs: BoundsPrefs,
    table: AggregateTable,
    details: DetailIndex,
    resolver: Option<Arc<dyn LocationResolver>>,
    dispatcher: Box<dyn Dispatcher>,
    stats: IngestStats,
}

impl BoundsEngine {
    /// Engine publishing through `dispatcher`, with no resolver.
    pub fn new<D>(prefs: BoundsPrefs, dispatcher: D) -> Self
    where
        D: Dispatcher + 'static,
    {
        let details = DetailIndex::with_instance_cap(prefs.max_instances_per_resource);
        Self {
            prefs,
            table: AggregateTable::new(),
            details,
            resolver: None,
            dispatcher: Box::new(dispatcher),
            stats: IngestStats::default(),
        }
    }

    /// Engine configured from the saved [`BoundsPrefs`] (defaults when none are saved).
    pub fn from_config<S, D>(config: &ConfigService<S>, dispatcher: D) -> Result<Self, ConfigError>
    where
        S: ConfigStore,
        D: Dispatcher + 'static,
    {
        let prefs = config.load_or_default::<BoundsPrefs>(BOUNDS_PREFS_KEY)?;
        Ok(Self::new(prefs, dispatcher))
    }

    /// Route new records to `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<dyn LocationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Active preferences.
    pub fn prefs(&self) -> &BoundsPrefs {
        &self.prefs
    }

    /// Aggregate table.
    pub fn table(&self) -> &AggregateTable {
        &self.table
    }

    /// Detail index.
    pub fn details(&self) -> &DetailIndex {
        &self.details
    }

    /// Session totals.
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Ingest one wire batch for message kind `kind`.
    ///
    /// A batch that is not chunked for `kind`, or whose kind is not resource
    /// bounds, is skipped without touching any state. Malformed batches fail
    /// before anything is mutated.
    #[instrument(skip_all, fields(kind = kind, bytes = bytes.len()))]
    pub fn process_batch(&mut self, bytes: &[u8], kind: MessageId) -> Result<BatchReport, IngestError> {
        let stream = MessageStream::decode(bytes).inspect_err(|err| warn!(%err, "bad stream header"))?;
        self.process_stream(&stream, kind)
    }

    /// Ingest an already framed stream. See [`process_batch`](Self::process_batch).
    pub fn process_stream(&mut self, stream: &MessageStream<'_>, kind: MessageId) -> Result<BatchReport, IngestError> {
        if kind != ResourceIndexOutOfBounds::ID || !stream.schema().is_chunked(kind) {
            self.stats.batches_skipped += 1;
            debug!(schema = ?stream.schema(), "batch skipped by schema gate");
            return Ok(BatchReport::empty(BatchOutcome::Skipped));
        }

        let staged = self
            .stage(stream)
            .inspect_err(|err| warn!(%err, "batch rejected"))?;

        let mut report = BatchReport::empty(BatchOutcome::Processed);
        let mut pending: FxHashMap<AggregateKey, u64> =
            self.table.keys().map(|key| (key, 0)).collect();

        for (message, detail) in staged {
            let key = AggregateKey::derive(&message);
            let (record, created) = self.table.lookup_or_create(key, || describe(&message));
            *pending.entry(key).or_insert(0) += 1;
            report.records += 1;

            if created {
                report.created += 1;
                if self.prefs.resolve_locations {
                    if let Some(resolver) = &self.resolver {
                        resolver.enqueue(RecordRef::new(&record), message.shader_guid);
                    }
                }
                self.dispatcher
                    .dispatch(PublicationOp::Insert(RecordRef::new(&record)));
            }

            if let Some(detail) = detail {
                if self.ingest_detail(key, detail) == Some(InstanceInsert::Inserted) {
                    report.details_added += 1;
                }
            }
        }

        let mut deltas: Vec<(AggregateKey, u64)> =
            pending.into_iter().filter(|(_, delta)| *delta > 0).collect();
        deltas.sort_unstable_by_key(|(key, _)| *key);
        for (key, delta) in deltas {
            if let Some((record, total)) = self.table.increment(key, delta) {
                self.dispatcher.dispatch(PublicationOp::CountDelta {
                    record: RecordRef::new(record),
                    delta,
                    total,
                });
                report.keys_updated += 1;
            }
        }

        self.stats.batches_processed += 1;
        self.stats.records_seen += report.records as u64;
        self.stats.records_created += report.created as u64;
        debug!(
            records = report.records,
            created = report.created,
            keys_updated = report.keys_updated,
            details_added = report.details_added,
            "batch processed"
        );
        Ok(report)
    }

    /// Add one detail instance for `key`.
    ///
    /// Returns `None` and changes nothing when `key` has no aggregate record.
    pub fn ingest_detail(&mut self, key: AggregateKey, detail: DetailChunk) -> Option<InstanceInsert> {
        let Some(resource) = self.details.find_or_add_resource(&self.table, key, detail.token) else {
            self.stats.orphan_details_dropped += 1;
            trace!(%key, token = detail.token.0, "orphan detail dropped");
            return None;
        };
        let outcome = self
            .details
            .add_unique_instance(&resource, format_instance(detail.coordinate));
        match outcome {
            InstanceInsert::Inserted => self.stats.detail_instances_added += 1,
            InstanceInsert::CapReached => self.stats.instances_capped += 1,
            InstanceInsert::Duplicate => {}
        }
        Some(outcome)
    }

    /// Decode every record (and every detail chunk that will be used) up front.
    fn stage(
        &self,
        stream: &MessageStream<'_>,
    ) -> Result<Vec<(ResourceIndexOutOfBounds, Option<DetailChunk>)>, WireError> {
        let records = ChunkedView::<ResourceIndexOutOfBounds>::new(stream)?.validate()?;
        records
            .iter()
            .map(|record| -> Result<_, WireError> {
                let detail = if self.prefs.collect_details && record.has_chunk(ResourceBoundsChunk::Detail) {
                    Some(record.detail_chunk()?)
                } else {
                    None
                };
                Ok((record.message(), detail))
            })
            .collect()
    }
}
