//! LLM Gateway — the single point through which every other component talks
//! to a model. Owns retries, backoff, and turning raw completion text into a
//! validated JSON value. No other component retries the LLM itself.

use crate::provider::{LlmError, LlmProvider};
use crate::types::{LlmMessage, LlmRequest};
use hyptree_core::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exponential backoff schedule, in milliseconds, applied between retries.
/// Defaults mirror spec §4.3: 1s, 2s, 4s, 8s.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delays_ms: vec![1_000, 2_000, 4_000, 8_000],
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.delays_ms.len().saturating_sub(1));
        Duration::from_millis(self.delays_ms.get(idx).copied().unwrap_or(8_000))
    }
}

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    retry_policy: RetryPolicy,
    call_timeout: Duration,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry_policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Per-call timeout (spec §5: "LG calls have per-call timeouts, default
    /// 30s"). Applies to a single attempt, not the whole retry sequence.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Send `prompt` (optionally preceded by `system`) to the provider and
    /// parse the response as JSON into `T`, retrying on network errors,
    /// rate limits, and schema-validation failures. `QuotaExceeded` never
    /// retries — it propagates on the first attempt.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        system: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let mut last_err: Option<String> = None;
        let mut server_delay: Option<Duration> = None;

        for attempt in 0..self.retry_policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(Error::pipeline("llm gateway call cancelled"));
            }

            let request = LlmRequest {
                messages: vec![LlmMessage::user(prompt)],
                system: system.map(|s| s.to_string()),
                ..LlmRequest::default()
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::pipeline("llm gateway call cancelled")),
                timed = tokio::time::timeout(self.call_timeout, self.provider.complete(request)) => {
                    match timed {
                        Ok(result) => result,
                        Err(_) => Err(LlmError::RequestFailed(format!(
                            "call exceeded {:?} timeout", self.call_timeout
                        ))),
                    }
                }
            };

            match outcome {
                Ok(response) => match extract_json::<T>(&response.text) {
                    Ok(value) => return Ok(value),
                    Err(msg) => {
                        warn!("schema validation failed on attempt {attempt}: {msg}");
                        last_err = Some(msg);
                    }
                },
                Err(LlmError::QuotaExceeded(msg)) => {
                    return Err(Error::QuotaExceeded(msg));
                }
                Err(LlmError::RateLimited { retry_after_ms }) => {
                    debug!("llm call rate-limited on attempt {attempt}, server suggests {retry_after_ms}ms");
                    server_delay = Some(Duration::from_millis(retry_after_ms));
                    last_err = Some(format!("rate limited: retry after {retry_after_ms}ms"));
                }
                Err(err) if !err.is_retryable() => {
                    return Err(Error::LlmUnavailable(err.to_string()));
                }
                Err(err) => {
                    debug!("llm call failed on attempt {attempt}: {err}");
                    last_err = Some(err.to_string());
                }
            }

            if attempt + 1 < self.retry_policy.max_attempts {
                // A server-suggested backoff is a floor on the fixed schedule,
                // never shorter than what it asked for.
                let delay = server_delay
                    .take()
                    .map(|suggested| suggested.max(self.retry_policy.delay_for(attempt)))
                    .unwrap_or_else(|| self.retry_policy.delay_for(attempt));
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::pipeline("llm gateway call cancelled")),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(Error::LlmUnavailable(last_err.unwrap_or_else(|| "exhausted retries".to_string())))
    }
}

/// Strip leading/trailing prose and code fences, then parse the remaining
/// JSON payload. Tolerates ```json fences and plain ``` fences.
fn extract_json<T: DeserializeOwned>(text: &str) -> std::result::Result<T, String> {
    let candidate = strip_fences(text.trim());
    let slice = narrow_to_braces(candidate).unwrap_or(candidate);
    serde_json::from_str(slice).map_err(|e| format!("{e}: {slice}"))
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        return rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    if let Some(rest) = text.strip_prefix("```") {
        return rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    text
}

/// Narrow to the outermost `{...}` or `[...]` span, tolerating leading or
/// trailing prose the model added despite instructions.
fn narrow_to_braces(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{LlmProvider, LlmResult};
    use crate::types::{LlmRequest, LlmResponse, Usage};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        ok: bool,
    }

    struct ScriptedProvider {
        responses: Vec<LlmResult<String>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: LlmRequest) -> LlmResult<LlmResponse> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match &self.responses[idx] {
                Ok(text) => Ok(LlmResponse {
                    text: text.clone(),
                    usage: Usage::default(),
                    stop_reason: Some("end_turn".to_string()),
                }),
                Err(e) => Err(match e {
                    LlmError::RequestFailed(m) => LlmError::RequestFailed(m.clone()),
                    LlmError::QuotaExceeded(m) => LlmError::QuotaExceeded(m.clone()),
                    LlmError::AuthFailed(m) => LlmError::AuthFailed(m.clone()),
                    LlmError::RateLimited { retry_after_ms } => {
                        LlmError::RateLimited { retry_after_ms: *retry_after_ms }
                    }
                    _ => LlmError::RequestFailed("scripted error".to_string()),
                }),
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, delays_ms: vec![1, 1, 1] }
    }

    #[tokio::test]
    async fn succeeds_on_clean_json() {
        let provider = ScriptedProvider {
            responses: vec![Ok(r#"{"ok": true}"#.to_string())],
            calls: AtomicU32::new(0),
        };
        let gw = LlmGateway::new(Arc::new(provider)).with_retry_policy(fast_policy());
        let result: Payload = gw.complete_json(None, "prompt", &CancellationToken::new()).await.unwrap();
        assert_eq!(result, Payload { ok: true });
    }

    #[tokio::test]
    async fn strips_fences_and_prose() {
        let provider = ScriptedProvider {
            responses: vec![Ok("Sure, here you go:\n```json\n{\"ok\": true}\n```\nHope that helps!".to_string())],
            calls: AtomicU32::new(0),
        };
        let gw = LlmGateway::new(Arc::new(provider)).with_retry_policy(fast_policy());
        let result: Payload = gw.complete_json(None, "prompt", &CancellationToken::new()).await.unwrap();
        assert_eq!(result, Payload { ok: true });
    }

    #[tokio::test]
    async fn retries_on_malformed_json_then_succeeds() {
        let provider = ScriptedProvider {
            responses: vec![Ok("not json at all".to_string()), Ok(r#"{"ok": true}"#.to_string())],
            calls: AtomicU32::new(0),
        };
        let gw = LlmGateway::new(Arc::new(provider)).with_retry_policy(fast_policy());
        let result: Payload = gw.complete_json(None, "prompt", &CancellationToken::new()).await.unwrap();
        assert_eq!(result, Payload { ok: true });
    }

    #[tokio::test]
    async fn quota_exceeded_does_not_retry() {
        let provider = Arc::new(ScriptedProvider {
            responses: vec![Err(LlmError::QuotaExceeded("no credits".to_string()))],
            calls: AtomicU32::new(0),
        });
        let gw = LlmGateway::new(provider.clone()).with_retry_policy(fast_policy());
        let result: Result<Payload> = gw.complete_json(None, "prompt", &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::QuotaExceeded(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_backoff_floors_at_server_suggested_delay() {
        let provider = ScriptedProvider {
            responses: vec![
                Err(LlmError::RateLimited { retry_after_ms: 50 }),
                Ok(r#"{"ok": true}"#.to_string()),
            ],
            calls: AtomicU32::new(0),
        };
        // Fixed schedule would only wait 1ms; the rate-limit response must
        // still cost at least the server-suggested 50ms (spec §4.3).
        let gw = LlmGateway::new(Arc::new(provider)).with_retry_policy(fast_policy());
        let started = std::time::Instant::now();
        let result: Payload = gw.complete_json(None, "prompt", &CancellationToken::new()).await.unwrap();
        assert_eq!(result, Payload { ok: true });
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_llm_unavailable() {
        let provider = ScriptedProvider {
            responses: vec![
                Ok("garbage".to_string()),
                Ok("garbage".to_string()),
                Ok("garbage".to_string()),
            ],
            calls: AtomicU32::new(0),
        };
        let gw = LlmGateway::new(Arc::new(provider)).with_retry_policy(fast_policy());
        let result: Result<Payload> = gw.complete_json(None, "prompt", &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::LlmUnavailable(_))));
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let provider = ScriptedProvider {
            responses: vec![Ok(r#"{"ok": true}"#.to_string())],
            calls: AtomicU32::new(0),
        };
        let gw = LlmGateway::new(Arc::new(provider)).with_retry_policy(fast_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<Payload> = gw.complete_json(None, "prompt", &cancel).await;
        assert!(result.is_err());
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _request: LlmRequest) -> LlmResult<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("timeout should fire first")
        }
    }

    #[tokio::test]
    async fn per_call_timeout_is_treated_as_a_retryable_failure() {
        let gw = LlmGateway::new(Arc::new(SlowProvider))
            .with_retry_policy(RetryPolicy { max_attempts: 1, delays_ms: vec![1] })
            .with_call_timeout(Duration::from_millis(20));
        let result: Result<Payload> = gw.complete_json(None, "prompt", &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::LlmUnavailable(_))));
    }

    #[test]
    fn narrow_to_braces_finds_outer_object() {
        let text = "prose {\"a\": 1} trailing";
        assert_eq!(narrow_to_braces(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn narrow_to_braces_handles_arrays() {
        let text = "[1, 2, 3]";
        assert_eq!(narrow_to_braces(text), Some("[1, 2, 3]"));
    }
}
