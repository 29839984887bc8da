//! Embedding provider capability and the bounded-retry wrapper around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, ProviderError, Result};

/// Attempts made before a transient failure becomes terminal.
pub const DEFAULT_RETRIES: u32 = 5;

/// Pause between attempts after a transient failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Extra wait on top of a warming-up provider's own estimate.
pub const DEFAULT_WARMUP_MARGIN: Duration = Duration::from_secs(1);

/// Anything that can turn a text into an embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate an embedding for `text`.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// How hard [`RetryingEmbedder`] tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total provider calls allowed for transient failures, at least 1.
    pub attempts: u32,
    /// Fixed pause after each transient failure.
    pub delay: Duration,
    /// Added to the provider's estimate when it reports warming up.
    pub warmup_margin: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, warmup_margin: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            warmup_margin,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_WARMUP_MARGIN)
    }
}

/// Wraps an [`EmbeddingProvider`] with a fixed retry budget.
///
/// Transient failures are retried after `policy.delay` until `policy.attempts`
/// calls have failed, then reported as [`Error::EmbeddingUnavailable`].
/// Any other provider failure is returned at once as [`Error::Provider`].
///
/// The first "warming up" signal of a call gets a grace retry: the embedder
/// waits the provider's estimate plus `policy.warmup_margin` and calls again
/// without spending an attempt. Later warm-up signals count as ordinary
/// transient failures, so every call terminates.
#[derive(Clone)]
pub struct RetryingEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut failures = 0u32;
        let mut warmup_granted = false;

        loop {
            let err = match self.provider.embed(text).await {
                Ok(vector) => {
                    debug!(provider = self.provider.name(), failures, "embedding generated");
                    return Ok(vector);
                }
                Err(err) => err,
            };

            match err {
                ProviderError::WarmingUp { estimated } if !warmup_granted => {
                    warmup_granted = true;
                    let wait = estimated + self.policy.warmup_margin;
                    info!(provider = self.provider.name(), ?wait, "provider is warming up, waiting");
                    tokio::time::sleep(wait).await;
                }
                err if err.is_transient() => {
                    failures += 1;
                    if failures >= self.policy.attempts {
                        warn!(
                            provider = self.provider.name(),
                            attempts = failures,
                            error = %err,
                            "embedding retries exhausted"
                        );
                        return Err(Error::EmbeddingUnavailable {
                            attempts: failures,
                            reason: err.to_string(),
                        });
                    }
                    warn!(
                        provider = self.provider.name(),
                        attempt = failures,
                        error = %err,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                err => return Err(Error::Provider(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Replays a fixed script of answers, then keeps repeating `fallback`.
    struct Scripted {
        script: Mutex<VecDeque<std::result::Result<Vec<f32>, ProviderError>>>,
        fallback: std::result::Result<Vec<f32>, ProviderError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(
            script: Vec<std::result::Result<Vec<f32>, ProviderError>>,
            fallback: std::result::Result<Vec<f32>, ProviderError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn transient() -> std::result::Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Transient("connection reset".into()))
    }

    fn warming(secs: u64) -> std::result::Result<Vec<f32>, ProviderError> {
        Err(ProviderError::WarmingUp {
            estimated: Duration::from_secs(secs),
        })
    }

    fn embedder(provider: Arc<Scripted>) -> RetryingEmbedder {
        RetryingEmbedder::new(provider, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success() {
        let provider = Scripted::new(vec![], Ok(vec![1.0, 2.0]));
        let result = embedder(provider.clone()).embed("hi").await.unwrap();

        assert_eq!(result, vec![1.0, 2.0]);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        for n in 1..DEFAULT_RETRIES as usize {
            let provider = Scripted::new(vec![transient(); n], Ok(vec![0.5]));
            let start = Instant::now();

            let result = embedder(provider.clone()).embed("hi").await.unwrap();

            assert_eq!(result, vec![0.5]);
            assert_eq!(provider.calls(), n + 1);
            assert_eq!(start.elapsed(), DEFAULT_RETRY_DELAY * n as u32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_budget() {
        let provider = Scripted::new(vec![], transient());

        match embedder(provider.clone()).embed("hi").await {
            Err(Error::EmbeddingUnavailable { attempts, reason }) => {
                assert_eq!(attempts, DEFAULT_RETRIES);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected EmbeddingUnavailable, got {:?}", other),
        }
        assert_eq!(provider.calls(), DEFAULT_RETRIES as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_attempt() {
        let provider = Scripted::new(vec![], transient());
        let start = Instant::now();

        let _ = embedder(provider).embed("hi").await;

        assert_eq!(start.elapsed(), DEFAULT_RETRY_DELAY * (DEFAULT_RETRIES - 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_response_is_not_retried() {
        let provider = Scripted::new(
            vec![Err(ProviderError::UnexpectedResponse("status 401".into()))],
            Ok(vec![1.0]),
        );

        match embedder(provider.clone()).embed("hi").await {
            Err(Error::Provider(ProviderError::UnexpectedResponse(msg))) => assert_eq!(msg, "status 401"),
            other => panic!("expected Provider error, got {:?}", other),
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_waits_estimate_plus_margin() {
        let provider = Scripted::new(vec![warming(20)], Ok(vec![1.0]));
        let start = Instant::now();

        embedder(provider.clone()).embed("hi").await.unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(20) + DEFAULT_WARMUP_MARGIN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_does_not_spend_an_attempt() {
        // One warm-up, then the provider keeps failing transiently
        let provider = Scripted::new(vec![warming(1)], transient());

        let result = embedder(provider.clone()).embed("hi").await;

        assert!(matches!(result, Err(Error::EmbeddingUnavailable { attempts: 5, .. })));
        assert_eq!(provider.calls(), DEFAULT_RETRIES as usize + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_warmup_is_bounded() {
        let provider = Scripted::new(vec![], warming(30));
        let start = Instant::now();

        let result = embedder(provider.clone()).embed("hi").await;

        assert!(matches!(result, Err(Error::EmbeddingUnavailable { .. })));
        assert_eq!(provider.calls(), DEFAULT_RETRIES as usize + 1);
        // Only the first warm-up uses the provider's estimate
        assert_eq!(
            start.elapsed(),
            Duration::from_secs(30) + DEFAULT_WARMUP_MARGIN + DEFAULT_RETRY_DELAY * (DEFAULT_RETRIES - 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_is_clamped() {
        let provider = Scripted::new(vec![], transient());
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.attempts, 1);

        let result = RetryingEmbedder::new(provider.clone(), policy).embed("hi").await;
        assert!(matches!(result, Err(Error::EmbeddingUnavailable { attempts: 1, .. })));
        assert_eq!(provider.calls(), 1);
    }
}
