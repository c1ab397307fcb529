//! Dual index writer.
//!
//! ```text
//!   clear_owner:    sparse.delete_owner ─┐
//!                   dense.delete_owner  ─┴─ both done ─▶ writes may start
//!
//!   write_batches:  batch 1 ─▶ batch 2 ─▶ … ─▶ batch N    (one stream per file × index)
//! ```
//!
//! The two clears run concurrently; batches within one stream run strictly
//! in order. There is no cross-batch transaction, so the first failed batch
//! stops its stream and the outcome records how many records were written
//! before it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use profile_rag_core::index::VectorIndex;
use profile_rag_core::models::IndexRecord;
use profile_rag_core::RagError;

use crate::context::ServiceContext;
use crate::guard::guarded;

/// Result of writing one record stream to one index.
#[derive(Debug)]
pub struct WriteOutcome {
    pub written: usize,
    pub error: Option<RagError>,
}

/// Remove the owner's records from both indexes, concurrently.
///
/// Returns the first failure (sparse before dense) after both complete.
pub async fn clear_owner(
    ctx: &ServiceContext,
    owner_id: &str,
    cancel: &CancellationToken,
) -> Result<(), RagError> {
    let timeout = ctx.settings.index_timeout;
    let (sparse, dense) = tokio::join!(
        guarded(
            "clear sparse index",
            timeout,
            cancel,
            ctx.sparse.delete_owner(owner_id)
        ),
        guarded(
            "clear dense index",
            timeout,
            cancel,
            ctx.dense.delete_owner(owner_id)
        ),
    );
    sparse?;
    dense?;
    tracing::info!(owner = owner_id, "cleared owner from both indexes");
    Ok(())
}

/// Upsert `records` in sequential batches of `batch_size`.
pub async fn write_batches(
    index: &dyn VectorIndex,
    records: &[IndexRecord],
    batch_size: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> WriteOutcome {
    let mut written = 0;
    let stage = format!("upsert {}", index.kind());

    for (i, batch) in records.chunks(batch_size.max(1)).enumerate() {
        let batch_no = i + 1;
        match guarded(&stage, timeout, cancel, index.upsert(batch)).await {
            Ok(()) => {
                written += batch.len();
                tracing::debug!(index = index.name(), batch = batch_no, written, "batch written");
            }
            Err(e @ RagError::Cancelled(_)) => {
                return WriteOutcome {
                    written,
                    error: Some(e),
                };
            }
            Err(e) => {
                let message = match &e {
                    RagError::Upstream { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(
                    index = index.name(),
                    batch = batch_no,
                    written,
                    error = %message,
                    "batch write failed, stopping stream"
                );
                return WriteOutcome {
                    written,
                    error: Some(RagError::PartialWrite {
                        index: index.kind(),
                        written,
                        failed_batch: batch_no,
                        message,
                    }),
                };
            }
        }
    }

    WriteOutcome {
        written,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use profile_rag_core::models::{IndexKind, LineRange, RecordFields, SearchHit};
    use std::sync::Mutex;

    /// Records batch sizes; fails on the configured call number.
    struct FlakyIndex {
        fail_on_call: Option<usize>,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        fn kind(&self) -> IndexKind {
            IndexKind::Dense
        }
        fn name(&self) -> &str {
            "flaky"
        }
        async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(records.len());
            if Some(calls.len()) == self.fail_on_call {
                return Err(anyhow!("HTTP 503"));
            }
            Ok(())
        }
        async fn delete_owner(&self, _owner_id: &str) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _q: &str, _k: usize, _o: &str) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn records(n: usize) -> Vec<IndexRecord> {
        (0..n)
            .map(|i| IndexRecord {
                id: format!("o-chunk-{}", i),
                fields: RecordFields {
                    text: "t".to_string(),
                    raw_text: "t".to_string(),
                    sequence_index: i,
                    line_range: LineRange { from: 1, to: 1 },
                    heading: None,
                    file_name: "f.md".to_string(),
                    owner_id: "o".to_string(),
                    email: "o@x".to_string(),
                    document_summary: None,
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_sequential() {
        let index = FlakyIndex {
            fail_on_call: None,
            calls: Mutex::new(Vec::new()),
        };
        let out = write_batches(&index, &records(250), 100, Duration::from_secs(5), &CancellationToken::new()).await;
        assert_eq!(out.written, 250);
        assert!(out.error.is_none());
        assert_eq!(*index.calls.lock().unwrap(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_failed_batch_stops_stream() {
        let index = FlakyIndex {
            fail_on_call: Some(2),
            calls: Mutex::new(Vec::new()),
        };
        let out = write_batches(&index, &records(250), 100, Duration::from_secs(5), &CancellationToken::new()).await;
        assert_eq!(out.written, 100);
        assert_eq!(index.calls.lock().unwrap().len(), 2);
        match out.error {
            Some(RagError::PartialWrite {
                index,
                written,
                failed_batch,
                message,
            }) => {
                assert_eq!(index, IndexKind::Dense);
                assert_eq!(written, 100);
                assert_eq!(failed_batch, 2);
                assert!(message.contains("HTTP 503"));
            }
            other => panic!("expected partial write, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_writes_nothing() {
        let index = FlakyIndex {
            fail_on_call: Some(1),
            calls: Mutex::new(Vec::new()),
        };
        let out = write_batches(&index, &[], 100, Duration::from_secs(5), &CancellationToken::new()).await;
        assert_eq!(out.written, 0);
        assert!(out.error.is_none());
        assert!(index.calls.lock().unwrap().is_empty());
    }
}
