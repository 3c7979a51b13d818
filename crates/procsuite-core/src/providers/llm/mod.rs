//! LLM client seam: the trait, typed transport errors, and the runtime
//! wrapper that owns the process-wide concurrency cap, per-call timeout,
//! retry policy, and response cache.
//!
//! Every call goes through [`LlmRuntime`]: the semaphore permit is a
//! scoped guard so cancellation can never leak a slot, and retries honor
//! `Retry-After` with exponential backoff plus jitter.

pub mod openai;
pub mod stub;

use crate::errors::PipelineError;
use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, timeout, Duration};

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub cached: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited (status {status})")]
    RateLimited {
        status: u16,
        retry_after_s: Option<u64>,
    },
    #[error("server error (status {status})")]
    Server { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    fn retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Server { .. })
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-text completion.
    async fn complete(&self, prompt: &str, system: Option<&str>)
        -> Result<LlmResponse, LlmError>;

    /// JSON-mode completion: the provider is instructed to emit a single
    /// JSON document.
    async fn complete_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, LlmError>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 8_000;

pub struct LlmRuntime {
    client: Arc<dyn LlmClient>,
    semaphore: Arc<Semaphore>,
    cache: Mutex<HashMap<String, LlmResponse>>,
    default_timeout: Duration,
    latency_ms: std::sync::atomic::AtomicU64,
}

impl LlmRuntime {
    pub fn new(client: Arc<dyn LlmClient>, concurrency: usize, timeout_s: u64) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            cache: Mutex::new(HashMap::new()),
            default_timeout: Duration::from_secs(timeout_s),
            latency_ms: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    /// Wall-clock spent inside provider calls since construction.
    pub fn total_latency_ms(&self) -> u64 {
        self.latency_ms.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// JSON-mode call with the runtime's default timeout.
    pub async fn call_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, PipelineError> {
        self.call_json_with_timeout(prompt, system, self.default_timeout)
            .await
    }

    /// JSON-mode call with an explicit read deadline (the registry
    /// extraction task runs with a longer one than judge calls).
    pub async fn call_json_with_timeout(
        &self,
        prompt: &str,
        system: Option<&str>,
        deadline: Duration,
    ) -> Result<LlmResponse, PipelineError> {
        let key = self.cache_key(prompt, system);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            let mut response = hit.clone();
            response.cached = true;
            return Ok(response);
        }

        // Scoped acquisition: dropping the permit on any exit path,
        // including cancellation, frees the slot.
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::config("LLM semaphore closed"))?;

        let mut last_error: Option<LlmError> = None;
        for attempt in 0..MAX_RETRIES {
            let started = std::time::Instant::now();
            let call = self.client.complete_json(prompt, system);
            let outcome = match timeout(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.record_latency(started);
                    return Err(PipelineError::extractor_timeout(
                        "llm",
                        deadline.as_secs(),
                    ));
                }
            };
            self.record_latency(started);
            match outcome {
                Ok(response) => {
                    self.cache.lock().await.insert(key.clone(), response.clone());
                    return Ok(response);
                }
                Err(e) if e.retryable() && attempt + 1 < MAX_RETRIES => {
                    let wait = backoff_delay(attempt, &e);
                    tracing::debug!(
                        "LLM call retry {}/{} after {:?}: {}",
                        attempt + 1,
                        MAX_RETRIES,
                        wait,
                        e
                    );
                    sleep(wait).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        Err(match last_error {
            Some(LlmError::RateLimited {
                status,
                retry_after_s,
            }) => PipelineError::rate_limited(status, retry_after_s, "retries exhausted"),
            Some(other) => PipelineError::invalid_extractor_output("llm", other.to_string()),
            None => PipelineError::invalid_extractor_output("llm", "no attempts made"),
        })
    }

    fn record_latency(&self, started: std::time::Instant) {
        self.latency_ms.fetch_add(
            started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
            std::sync::atomic::Ordering::Relaxed,
        );
    }

    fn cache_key(&self, prompt: &str, system: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.client.provider_name().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.client.model_name().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(prompt.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(system.unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn backoff_delay(attempt: u32, error: &LlmError) -> Duration {
    if let LlmError::RateLimited {
        retry_after_s: Some(seconds),
        ..
    } = error
    {
        return Duration::from_secs(*seconds);
    }
    let exp = BACKOFF_BASE_MS.saturating_mul(1 << attempt).min(BACKOFF_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=exp / 2);
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
mod tests {
    use super::stub::StubLlm;
    use super::*;

    #[tokio::test]
    async fn cache_hits_skip_the_client() {
        let runtime = LlmRuntime::new(Arc::new(StubLlm::empty()), 2, 5);
        let first = runtime.call_json("prompt", None).await.unwrap();
        assert!(!first.cached);
        let second = runtime.call_json("prompt", None).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.text, second.text);
    }

    #[tokio::test]
    async fn semaphore_bounds_concurrency() {
        let runtime = Arc::new(LlmRuntime::new(Arc::new(StubLlm::empty()), 1, 5));
        // Two concurrent calls must both finish under a single permit.
        let a = runtime.clone();
        let b = runtime.clone();
        let (ra, rb) = tokio::join!(a.call_json("x", None), b.call_json("y", None));
        assert!(ra.is_ok());
        assert!(rb.is_ok());
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let delay = backoff_delay(
            0,
            &LlmError::RateLimited {
                status: 429,
                retry_after_s: Some(7),
            },
        );
        assert_eq!(delay, Duration::from_secs(7));
    }
}
