use std::future::Future;
use std::time::Duration;

use hf_core::config::BridgeConfig;
use tracing::warn;

use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// CallPolicy
// ---------------------------------------------------------------------------

/// Deadline and bounded-retry wrapper for command-bridge calls.
///
/// The raw bridge has no timeout: a hung backend call would otherwise
/// leave a session stuck in `Initializing` forever. Every call therefore
/// runs under an explicit deadline, and control commands retry with
/// exponential backoff. An elapsed deadline surfaces as
/// [`BridgeError::Timeout`], distinct from a backend rejection.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Maximum duration for a single attempt.
    pub deadline: Duration,
    /// Total attempts before the last error is returned.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
}

impl CallPolicy {
    /// Policy for control commands (open, start-stream, resize, close).
    pub fn control(cfg: &BridgeConfig) -> Self {
        Self {
            deadline: Duration::from_millis(cfg.call_deadline_ms),
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        }
    }

    /// Policy for send-input: deadline only, never retried. A replayed
    /// keystroke is not idempotent.
    pub fn input(cfg: &BridgeConfig) -> Self {
        Self {
            max_attempts: 1,
            ..Self::control(cfg)
        }
    }

    /// Run `op` under this policy. `op` is invoked once per attempt.
    pub async fn call<T, F, Fut>(&self, command: &'static str, mut op: F) -> Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.deadline, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => BridgeError::Timeout {
                    command,
                    elapsed: self.deadline,
                },
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }

            let delay = self
                .backoff_base
                .saturating_mul(1u32 << (attempt - 1).min(8));
            warn!(
                command,
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "bridge call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::control(&BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> CallPolicy {
        CallPolicy {
            deadline: Duration::from_millis(50),
            max_attempts,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .call("open-session", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BridgeError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .call("open-session", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BridgeError::rejected("open-session", "transient"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let result: Result<(), _> = fast_policy(2)
            .call("resize", || async {
                Err(BridgeError::rejected("resize", "nope"))
            })
            .await;
        assert!(matches!(result, Err(BridgeError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_hung_call_times_out() {
        let result: Result<(), _> = fast_policy(1)
            .call("open-session", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;
        match result {
            Err(BridgeError::Timeout { command, elapsed }) => {
                assert_eq!(command, "open-session");
                assert_eq!(elapsed, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_input_policy_single_attempt() {
        let cfg = BridgeConfig::default();
        assert_eq!(CallPolicy::input(&cfg).max_attempts, 1);
        assert!(CallPolicy::control(&cfg).max_attempts > 1);
    }
}
