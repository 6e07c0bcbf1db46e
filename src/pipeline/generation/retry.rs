use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry2::{Retry, RetryError};

use super::{Generation, GenerationClient, GenerationError, SamplingParams};

/// Bounded exponential backoff for generation calls.
///
/// Before attempt `n + 1` the caller waits `backoff_base * 2^n`, so with a
/// one second base the waits are 2s, 4s, 8s...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Upper bound for a single provider call. Exceeding it counts as a
    /// `Timeout` and is retried like one.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delays between attempts: `base * 2^1 .. base * 2^(max_attempts - 1)`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.backoff_base;
        (1..self.max_attempts.max(1)).map(move |n| base.saturating_mul(2u32.saturating_pow(n)))
    }
}

/// Call the client, retrying retryable failures per `policy`.
///
/// A `Configuration` error is returned after the first attempt. Once the
/// attempt budget is spent the last error is wrapped in `Unavailable`.
pub async fn generate_with_retry(
    client: &dyn GenerationClient,
    prompt: &str,
    params: &SamplingParams,
    policy: &RetryPolicy,
) -> Result<Generation, GenerationError> {
    let attempts = AtomicU32::new(0);
    let attempt_timeout = policy.attempt_timeout;

    let result = Retry::spawn(policy.delays(), || async {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let outcome = match tokio::time::timeout(attempt_timeout, client.generate(prompt, params)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GenerationError::Timeout(format!(
                "no response within {}s",
                attempt_timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(generation) => Ok(generation),
            Err(e) if e.is_retryable() => {
                tracing::warn!(attempt, error = %e, "Generation attempt failed, will retry");
                Err(RetryError::Transient {
                    err: e,
                    retry_after: None,
                })
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Generation failed permanently");
                Err(RetryError::Permanent(e))
            }
        }
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    match result {
        Ok(generation) => {
            if attempts > 1 {
                tracing::info!(attempts, "Generation succeeded after retry");
            }
            Ok(generation)
        }
        Err(e) if e.is_retryable() => Err(GenerationError::exhausted(attempts, &e)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::generation::TokenUsage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails with the queued errors in order, then succeeds.
    struct ScriptedClient {
        failures: Mutex<Vec<GenerationError>>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedClient {
        fn new(mut failures: Vec<GenerationError>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(
            &self,
            prompt: &str,
            _params: &SamplingParams,
        ) -> Result<Generation, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                if call == 0 {
                    tokio::time::sleep(delay).await;
                }
            }
            let next = self.failures.lock().unwrap().pop();
            match next {
                Some(err) => Err(err),
                None => Ok(Generation {
                    text: format!("echo: {prompt}"),
                    usage: TokenUsage::default(),
                }),
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn delays_are_exponential_from_two_units() {
        let delays: Vec<_> = policy(4).delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
        );
        assert_eq!(policy(1).delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_retryable_failures() {
        let client = ScriptedClient::new(vec![
            GenerationError::RateLimited("quota".into()),
            GenerationError::Unavailable("503".into()),
        ]);
        let start = Instant::now();

        let generation = generate_with_retry(&client, "hola", &SamplingParams::default(), &policy(3))
            .await
            .unwrap();

        assert_eq!(generation.text, "echo: hola");
        assert_eq!(client.calls(), 3);
        // 2^1 + 2^2 seconds of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(6100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_error_is_not_retried() {
        let client = ScriptedClient::new(vec![GenerationError::Configuration("no key".into())]);

        let err = generate_with_retry(&client, "hola", &SamplingParams::default(), &policy(5))
            .await
            .unwrap_err();

        assert_eq!(err, GenerationError::Configuration("no key".into()));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_unavailable() {
        let client = ScriptedClient::new(vec![
            GenerationError::Unknown("a".into()),
            GenerationError::Unknown("b".into()),
            GenerationError::RateLimited("last".into()),
        ]);

        let err = generate_with_retry(&client, "hola", &SamplingParams::default(), &policy(3))
            .await
            .unwrap_err();

        assert_eq!(client.calls(), 3);
        match err {
            GenerationError::Unavailable(msg) => assert!(msg.contains("last"), "{msg}"),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out_and_is_retried() {
        let mut client = ScriptedClient::new(vec![]);
        client.delay = Some(Duration::from_secs(60));

        let generation = generate_with_retry(&client, "hola", &SamplingParams::default(), &policy(2))
            .await
            .unwrap();

        assert_eq!(generation.text, "echo: hola");
        assert_eq!(client.calls(), 2);
    }
}
