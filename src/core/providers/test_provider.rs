//! Counting stub `ProviderClient` used by this crate's own tests
//!
//! Uses hand-rolled fakes
//! rather than full mock frameworks for async trait objects: `mockall`
//! covers simple cases, but the retry/fallback and single-flight tests need
//! a stateful call counter and a scriptable sequence of outcomes, which is
//! easiest to express directly.

use super::{CallMode, ErrorKind, ProviderCallError, ProviderClient, ProviderRequest, ProviderResponse, Usage};
use crate::core::router::deployment::Deployment;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A scripted outcome for one call to [`TestProviderClient`].
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Success {
        completion_tokens: u64,
        total_tokens: u64,
        latency: Duration,
    },
    Fail(ErrorKind),
}

/// A `ProviderClient` whose behavior is a fixed script, with a call counter
/// for single-flight assertions. Calls past the end of the script repeat
/// the last scripted outcome.
#[derive(Debug)]
pub struct TestProviderClient {
    script: Mutex<Vec<ScriptedOutcome>>,
    calls: AtomicUsize,
}

impl TestProviderClient {
    /// A provider that always succeeds quickly with `completion_tokens`.
    pub fn always_succeeds(completion_tokens: u64) -> Self {
        Self::scripted(vec![ScriptedOutcome::Success {
            completion_tokens,
            total_tokens: completion_tokens + 10,
            latency: Duration::from_millis(10),
        }])
    }

    /// A provider that always fails with `kind`.
    pub fn always_fails(kind: ErrorKind) -> Self {
        Self::scripted(vec![ScriptedOutcome::Fail(kind)])
    }

    /// A provider driven by an explicit outcome sequence.
    pub fn scripted(script: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `invoke` calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().expect("script mutex poisoned");
        script
            .get(idx)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(ScriptedOutcome::Success {
                completion_tokens: 10,
                total_tokens: 20,
                latency: Duration::from_millis(10),
            })
    }
}

#[async_trait]
impl ProviderClient for TestProviderClient {
    async fn invoke(
        &self,
        _deployment: &Deployment,
        _request: &ProviderRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, ProviderCallError> {
        match self.next_outcome() {
            ScriptedOutcome::Success {
                completion_tokens,
                total_tokens,
                latency,
            } => {
                tokio::time::sleep(latency).await;
                Ok(ProviderResponse {
                    body: json!({"choices": [{"message": {"content": "ok"}}]}),
                    usage: Usage {
                        prompt_tokens: total_tokens.saturating_sub(completion_tokens),
                        completion_tokens,
                        total_tokens,
                    },
                    completion_start: None,
                })
            }
            ScriptedOutcome::Fail(kind) => Err(ProviderCallError {
                message: format!("scripted failure: {kind:?}"),
                kind,
                provider: None,
                status_code: None,
            }),
        }
    }

    async fn probe(
        &self,
        _deployment: &Deployment,
        _mode: CallMode,
        _deadline: Instant,
    ) -> Result<Duration, ProviderCallError> {
        Ok(Duration::from_millis(5))
    }
}
