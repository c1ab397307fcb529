//! Document summarizer.
//!
//! Produces a short synopsis of a whole document with one completion
//! call. The synopsis is prefixed to every dense chunk of that document.
//!
//! A failed or empty completion never yields a malformed summary. What
//! happens instead is set by `summary.on_failure`:
//!
//! - `degrade` (default): log a warning and ingest with heading-only context.
//! - `abort`: fail the file.
//!
//! Cancellation always fails the file, whatever the policy.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use profile_rag_core::RagError;

use crate::completion::{Completer, CompletionOptions};
use crate::config::{SummaryConfig, SummaryFailurePolicy};
use crate::guard::guarded;

pub struct Summarizer {
    completer: Arc<dyn Completer>,
    options: CompletionOptions,
    system_prompt: String,
    max_input_chars: usize,
    policy: SummaryFailurePolicy,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(completer: Arc<dyn Completer>, config: &SummaryConfig) -> Self {
        Self {
            completer,
            options: CompletionOptions::from_config(config),
            system_prompt: config.system_prompt.clone(),
            max_input_chars: config.max_input_chars.max(1),
            policy: config.on_failure,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn policy(&self) -> SummaryFailurePolicy {
        self.policy
    }

    /// Request a summary, failing on provider errors and empty output.
    pub async fn summarize(&self, text: &str, cancel: &CancellationToken) -> Result<String, RagError> {
        let input = truncate_chars(text, self.max_input_chars);
        let summary = guarded(
            "summary",
            self.timeout,
            cancel,
            self.completer.complete(&self.system_prompt, input, &self.options),
        )
        .await?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(RagError::Upstream {
                stage: "summary".to_string(),
                message: "completion returned no text".to_string(),
            });
        }
        Ok(summary.to_string())
    }

    /// Summary to apply to a document, after the failure policy.
    ///
    /// Returns `Ok(None)` for empty documents and for degraded failures.
    pub async fn summary_for(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, RagError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        match self.summarize(text, cancel).await {
            Ok(summary) => Ok(Some(summary)),
            Err(e @ RagError::Cancelled(_)) => Err(e),
            Err(e) => match self.policy {
                SummaryFailurePolicy::Degrade => {
                    tracing::warn!(error = %e, "summary unavailable, using heading-only context");
                    Ok(None)
                }
                SummaryFailurePolicy::Abort => Err(e),
            },
        }
    }
}

/// Longest prefix of `text` with at most `max` chars.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("HTTP 500".to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Completer for Scripted {
        async fn complete(&self, _system: &str, user: &str, _options: &CompletionOptions) -> Result<String> {
            self.seen.lock().unwrap().push(user.to_string());
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn config(policy: SummaryFailurePolicy) -> SummaryConfig {
        SummaryConfig {
            provider: "openai".to_string(),
            on_failure: policy,
            max_input_chars: 10,
            ..SummaryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_summary_is_trimmed_and_input_truncated() {
        let completer = Scripted::ok("  Backend engineer.\n");
        let s = Summarizer::new(completer.clone(), &config(SummaryFailurePolicy::Degrade));
        let out = s
            .summary_for("ééééééééééééééé long", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("Backend engineer."));
        assert_eq!(completer.seen.lock().unwrap()[0].chars().count(), 10);
    }

    #[tokio::test]
    async fn test_degrade_policy_returns_none() {
        let s = Summarizer::new(Scripted::failing(), &config(SummaryFailurePolicy::Degrade));
        let out = s.summary_for("text", &CancellationToken::new()).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_abort_policy_fails() {
        let s = Summarizer::new(Scripted::failing(), &config(SummaryFailurePolicy::Abort));
        let err = s.summary_for("text", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), "upstream_error");
    }

    #[tokio::test]
    async fn test_empty_completion_is_failure() {
        let s = Summarizer::new(Scripted::ok("   "), &config(SummaryFailurePolicy::Abort));
        assert!(s.summary_for("text", &CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_document_not_summarized() {
        let completer = Scripted::ok("unused");
        let s = Summarizer::new(completer.clone(), &config(SummaryFailurePolicy::Abort));
        assert!(s.summary_for(" \n ", &CancellationToken::new()).await.unwrap().is_none());
        assert!(completer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_ignores_degrade_policy() {
        let token = CancellationToken::new();
        token.cancel();
        let s = Summarizer::new(Scripted::ok("x"), &config(SummaryFailurePolicy::Degrade));
        let err = s.summary_for("text", &token).await.unwrap_err();
        assert_eq!(err.code(), "cancelled");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
