//! Timeout and cancellation wrapper for remote calls.
//!
//! Every index, rerank, and completion call in the pipeline goes through
//! [`guarded`]: it races the call against the caller's
//! [`CancellationToken`] and a per-provider timeout, and converts the
//! provider's `anyhow` error into a [`RagError`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use profile_rag_core::RagError;

/// Run `fut` under a timeout, aborting early if `cancel` fires.
///
/// | Outcome | Result |
/// |---------|--------|
/// | completes with `Ok` | `Ok(value)` |
/// | completes with `Err` | [`RagError::Upstream`] with the error chain |
/// | exceeds `timeout` | [`RagError::Upstream`] with a "timed out" message |
/// | `cancel` fires first | [`RagError::Cancelled`] |
pub async fn guarded<T, F>(
    stage: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, RagError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled(stage.to_string())),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RagError::upstream(stage, &e)),
            Err(_) => Err(RagError::Upstream {
                stage: stage.to_string(),
                message: format!("timed out after {:?}", timeout),
            }),
        },
    }
}
