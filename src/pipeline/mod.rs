//! idxmngr Insert Pipeline
//!
//! Encodes and inserts one batch of records into one index:
//!
//! ```text
//! for each record:
//!   deadline? → txId? → predicate? → encode key → IndexWriter::insert
//! commit
//! ```
//!
//! Batches are best-effort. A record that fails validation, the predicate
//! or key encoding is reported and the batch continues. A storage failure
//! or an expired deadline stops the batch; the records inserted before it
//! stay committed and are reported.

pub mod predicate;
pub mod types;

pub use predicate::{InclusionPredicate, PredicateError};
pub use types::{fields_from_value, InsertRecord, InsertSummary, RecordOutcome, RecordStatus};

use crate::catalog::IndexDefinition;
use crate::keys::KeyEncoder;
use crate::store::{IndexStore, InsertOutcome, StoreError};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

/// Reasons reported for skipped records
pub const SKIP_FILTERED: &str = "filtered";
pub const SKIP_DUPLICATE: &str = "duplicate";

/// A batch that stopped early. `summary` holds what was committed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Batch deadline exceeded after {} committed records", .summary.inserted)]
    Timeout { summary: InsertSummary },

    #[error("Storage failure after {} committed records: {source}", .summary.inserted)]
    Storage {
        summary: InsertSummary,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn summary(&self) -> &InsertSummary {
        match self {
            PipelineError::Timeout { summary } | PipelineError::Storage { summary, .. } => summary,
        }
    }
}

/// Settings for one batch against one index
pub struct InsertPipeline<'a> {
    encoder: &'a KeyEncoder,
    definition: &'a IndexDefinition,
    schema: Option<&'a str>,
    predicate: Option<&'a InclusionPredicate>,
    deadline: Option<Instant>,
}

impl<'a> InsertPipeline<'a> {
    pub fn new(encoder: &'a KeyEncoder, definition: &'a IndexDefinition) -> Self {
        Self {
            encoder,
            definition,
            schema: None,
            predicate: None,
            deadline: None,
        }
    }

    /// Schema requested by the caller; overrides the definition's
    pub fn schema(mut self, schema: Option<&'a str>) -> Self {
        self.schema = schema;
        self
    }

    pub fn predicate(mut self, predicate: Option<&'a InclusionPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run the batch against `store`
    pub async fn run(
        &self,
        store: &IndexStore,
        records: &[InsertRecord],
    ) -> Result<InsertSummary, PipelineError> {
        let started = Instant::now();
        let mut summary = InsertSummary::default();

        // The deadline also bounds the wait behind another batch's writer
        let acquired = match self.deadline {
            Some(deadline) => match timeout_at(deadline, store.writer()).await {
                Ok(acquired) => acquired,
                Err(_) => {
                    summary.duration_ms = started.elapsed().as_millis() as u64;
                    tracing::warn!(
                        index_id = %self.definition.index_id,
                        waited_ms = summary.duration_ms,
                        "Insert batch deadline exceeded waiting for the writer"
                    );
                    return Err(PipelineError::Timeout { summary });
                }
            },
            None => store.writer().await,
        };
        let mut writer = match acquired {
            Ok(writer) => writer,
            Err(source) => return Err(PipelineError::Storage { summary, source }),
        };

        for (i, record) in records.iter().enumerate() {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                summary.duration_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(
                    index_id = %self.definition.index_id,
                    committed = summary.inserted,
                    remaining = records.len() - i,
                    "Insert batch deadline exceeded"
                );
                return match writer.commit() {
                    Ok(()) => Err(PipelineError::Timeout { summary }),
                    Err(source) => Err(PipelineError::Storage { summary, source }),
                };
            }

            let key = match self.prepare(record) {
                Ok(Some(key)) => key,
                Ok(None) => {
                    summary.record_skipped(i, &record.tx_id, None, SKIP_FILTERED);
                    continue;
                }
                Err(reason) => {
                    tracing::debug!(
                        index_id = %self.definition.index_id,
                        tx_id = %record.tx_id,
                        %reason,
                        "Record rejected"
                    );
                    summary.record_failed(i, &record.tx_id, reason);
                    continue;
                }
            };

            match writer.insert(&key, &record.tx_id).await {
                Ok(InsertOutcome::Inserted) => {
                    summary.record_inserted(i, &record.tx_id, key, record.block_number)
                }
                Ok(InsertOutcome::Duplicate) => {
                    summary.record_skipped(i, &record.tx_id, Some(key), SKIP_DUPLICATE)
                }
                Err(e @ StoreError::KeyTooLarge { .. }) => {
                    summary.record_failed(i, &record.tx_id, e.to_string())
                }
                Err(source) => {
                    summary.duration_ms = started.elapsed().as_millis() as u64;
                    return Err(PipelineError::Storage { summary, source });
                }
            }
        }

        if let Err(source) = writer.commit() {
            summary.duration_ms = started.elapsed().as_millis() as u64;
            return Err(PipelineError::Storage { summary, source });
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            index_id = %self.definition.index_id,
            network = %self.definition.network,
            %summary,
            "Insert batch committed"
        );
        Ok(summary)
    }

    /// Key for a record: `Ok(None)` when the predicate filters it out,
    /// `Err(reason)` when it cannot be indexed
    fn prepare(&self, record: &InsertRecord) -> Result<Option<String>, String> {
        if record.tx_id.trim().is_empty() {
            return Err("empty txId".to_string());
        }

        if let Some(predicate) = self.predicate {
            if !predicate.evaluate(&record.data).map_err(|e| e.to_string())? {
                return Ok(None);
            }
        }

        self.encoder
            .resolve_and_encode(
                self.schema,
                self.definition.schema.as_deref(),
                &self.definition.key_column,
                &record.data,
                self.definition.key_size,
            )
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ComparisonOp, KeyQuery, SyncMode};
    use std::time::Duration;
    use tempfile::tempdir;

    fn definition() -> IndexDefinition {
        IndexDefinition::new("001", "speeding", "IndexableData", 64, "hardhat")
            .with_schema("speeding")
    }

    fn speeding_record(tx: &str, speed: &str) -> InsertRecord {
        InsertRecord::new(tx)
            .with_field("speeding", speed)
            .with_field("obuId", "OBU-1")
            .with_field("collectionDt", "20240101")
    }

    fn store(dir: &tempfile::TempDir) -> IndexStore {
        IndexStore::create(dir.path().join("speeding.bf"), 64, SyncMode::Batched).unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_valid_records() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let encoder = KeyEncoder::with_defaults();
        let def = definition();

        let mut records: Vec<InsertRecord> = (0..9)
            .map(|i| speeding_record(&format!("tx{}", i), &format!("{}", 50 + i)))
            .collect();
        // Overflows the 3-digit speed segment
        records.insert(4, speeding_record("bad", "1000"));

        let summary = InsertPipeline::new(&encoder, &def)
            .run(&store, &records)
            .await
            .unwrap();

        assert_eq!(summary.inserted, 9);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.outcomes[4].status, RecordStatus::Failed);
        assert_eq!(summary.outcomes[4].tx_id, "bad");

        for i in 0..9 {
            let key = format!("spd::{:03}::OBU-1::20240101", 50 + i);
            let txs = store.search(&KeyQuery::Eq(key)).await.unwrap();
            assert_eq!(txs, vec![format!("tx{}", i)]);
        }
    }

    #[tokio::test]
    async fn test_predicate_skips_records() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let encoder = KeyEncoder::with_defaults();
        let def = definition();
        let predicate = InclusionPredicate::new("speeding", ComparisonOp::GtEq, 60.0);

        let records = vec![
            speeding_record("slow", "55"),
            speeding_record("fast", "80"),
            InsertRecord::new("nofield").with_field("obuId", "x"),
        ];

        let summary = InsertPipeline::new(&encoder, &def)
            .predicate(Some(&predicate))
            .run(&store, &records)
            .await
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcomes[0].reason.as_deref(), Some(SKIP_FILTERED));
        assert_eq!(summary.outcomes[2].status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_duplicates_and_empty_tx_id() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let encoder = KeyEncoder::with_defaults();
        let def = definition();

        let records = vec![
            speeding_record("tx1", "70").with_block_number(10),
            speeding_record("tx1", "70").with_block_number(11),
            speeding_record("", "70"),
        ];

        let summary = InsertPipeline::new(&encoder, &def)
            .run(&store, &records)
            .await
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcomes[1].reason.as_deref(), Some(SKIP_DUPLICATE));
        assert_eq!(summary.max_block_number, Some(10));
    }

    #[tokio::test]
    async fn test_schema_override_and_raw_key() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let encoder = KeyEncoder::with_defaults();
        let def = IndexDefinition::new("002", "purpose", "purpose", 32, "hardhat");

        let records = vec![InsertRecord::new("tx").with_field("purpose", "Research")];
        let summary = InsertPipeline::new(&encoder, &def)
            .run(&store, &records)
            .await
            .unwrap();
        assert_eq!(summary.outcomes[0].key.as_deref(), Some("Research"));

        let records = vec![InsertRecord::new("tx2").with_field("purpose", "Audit")];
        let summary = InsertPipeline::new(&encoder, &def)
            .schema(Some("purpose"))
            .run(&store, &records)
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);

        let records = vec![InsertRecord::new("tx3").with_field("purpose", "Audit")];
        let summary = InsertPipeline::new(&encoder, &def)
            .schema(Some("unknown"))
            .run(&store, &records)
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_reports_committed() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let encoder = KeyEncoder::with_defaults();
        let def = definition();

        let records = vec![speeding_record("tx1", "70")];
        let deadline = Instant::now() - Duration::from_millis(1);

        let err = InsertPipeline::new(&encoder, &def)
            .deadline(Some(deadline))
            .run(&store, &records)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert_eq!(err.summary().inserted, 0);
        assert!(store
            .search(&KeyQuery::GtEq("spd::".into()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_deadline_bounds_wait_for_writer() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let encoder = KeyEncoder::with_defaults();
        let def = definition();

        // Another batch holds the writer for the whole test
        let _held = store.writer().await.unwrap();

        let records = vec![speeding_record("tx1", "70")];
        let deadline = Instant::now() + Duration::from_millis(50);

        let err = InsertPipeline::new(&encoder, &def)
            .deadline(Some(deadline))
            .run(&store, &records)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert_eq!(err.summary().inserted, 0);
        assert_eq!(err.summary().total(), 0);
    }
}
