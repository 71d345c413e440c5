//! External verification client: invokes an institution's verification
//! endpoint with a per-institution timeout and exponential-backoff retry.
//!
//! A network failure, timeout, or non-2xx answer is a normal, typed
//! `CallOutcome`; `call` never errors. Only `call_with_retry` surfaces a
//! terminal `ClientError` once every attempt is spent. Lifecycle events go
//! to an injected observer, never a process-wide bus; they are advisory and
//! carry no correctness weight.

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, warn};

use super::institutions::{ApiEndpointConfig, VerificationPayload};
use crate::config::VerificationConfig;

/// Uniform result of one endpoint invocation.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub raw_response: Option<String>,
    pub status_code: Option<u16>,
    pub elapsed: Duration,
}

impl CallOutcome {
    pub fn succeeded(
        data: Option<Value>,
        raw_response: Option<String>,
        status_code: u16,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            data,
            error: None,
            raw_response,
            status_code: Some(status_code),
            elapsed,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        raw_response: Option<String>,
        status_code: Option<u16>,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            raw_response,
            status_code,
            elapsed,
        }
    }
}

/// Advisory lifecycle events emitted around endpoint calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Started { endpoint: String },
    Completed { status_code: u16, elapsed: Duration },
    Failed { error: String },
    RetryScheduled { attempt: u32, delay: Duration },
}

/// Observer seam for the client's lifecycle events.
pub trait ClientObserver: Send + Sync {
    fn on_event(&self, event: &ClientEvent);
}

/// Default observer: structured log lines through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ClientObserver for TracingObserver {
    fn on_event(&self, event: &ClientEvent) {
        match event {
            ClientEvent::Started { endpoint } => {
                info!(%endpoint, "institution verification call started");
            }
            ClientEvent::Completed {
                status_code,
                elapsed,
            } => {
                info!(status_code, elapsed_ms = elapsed.as_millis() as u64, "institution verification call completed");
            }
            ClientEvent::Failed { error } => {
                warn!(%error, "institution verification call failed");
            }
            ClientEvent::RetryScheduled { attempt, delay } => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying institution verification call");
            }
        }
    }
}

/// One wire-level dispatch to an institution endpoint. The production
/// implementation speaks HTTP through reqwest; tests script outcomes.
pub trait VerificationTransport: Send + Sync {
    fn dispatch(
        &self,
        config: &ApiEndpointConfig,
        payload: &VerificationPayload,
        timeout: Duration,
    ) -> impl Future<Output = CallOutcome> + Send;
}

impl<T> VerificationTransport for std::sync::Arc<T>
where
    T: VerificationTransport,
{
    fn dispatch(
        &self,
        config: &ApiEndpointConfig,
        payload: &VerificationPayload,
        timeout: Duration,
    ) -> impl Future<Output = CallOutcome> + Send {
        self.as_ref().dispatch(config, payload, timeout)
    }
}

/// Retry schedule: up to `max_attempts` attempts, sleeping
/// `backoff_unit * 2^attempt` between them (attempt starting at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &VerificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_unit: config.backoff_unit(),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt)
    }
}

/// Terminal failure raised once the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("institution verification failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client wrapping a transport with timeout resolution, retry, and
/// observability.
pub struct ExternalVerificationClient<T> {
    transport: T,
    policy: RetryPolicy,
    default_timeout: Duration,
    observer: Box<dyn ClientObserver>,
}

impl<T> ExternalVerificationClient<T>
where
    T: VerificationTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            default_timeout: DEFAULT_TIMEOUT,
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn ClientObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Timeout the given endpoint resolves to.
    pub fn timeout_for(&self, config: &ApiEndpointConfig) -> Duration {
        config.timeout.unwrap_or(self.default_timeout)
    }

    /// One invocation. Failure is a value, never an `Err`.
    pub async fn call(
        &self,
        config: &ApiEndpointConfig,
        payload: &VerificationPayload,
    ) -> CallOutcome {
        self.observer.on_event(&ClientEvent::Started {
            endpoint: config.endpoint_url.clone(),
        });

        let timeout = self.timeout_for(config);
        let outcome = self.transport.dispatch(config, payload, timeout).await;

        if outcome.success {
            self.observer.on_event(&ClientEvent::Completed {
                status_code: outcome.status_code.unwrap_or(0),
                elapsed: outcome.elapsed,
            });
        } else {
            self.observer.on_event(&ClientEvent::Failed {
                error: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "institution call failed".to_string()),
            });
        }

        outcome
    }

    /// Retries failed outcomes until one succeeds or the attempt budget is
    /// spent, then raises a terminal error wrapping the last underlying
    /// failure.
    pub async fn call_with_retry(
        &self,
        config: &ApiEndpointConfig,
        payload: &VerificationPayload,
    ) -> Result<CallOutcome, ClientError> {
        let mut last_error = String::from("no attempt was made");

        for attempt in 1..=self.policy.max_attempts {
            let outcome = self.call(config, payload).await;
            if outcome.success {
                return Ok(outcome);
            }

            last_error = outcome
                .error
                .unwrap_or_else(|| "institution call failed".to_string());

            if attempt < self.policy.max_attempts {
                let delay = self.policy.delay_for(attempt);
                self.observer
                    .on_event(&ClientEvent::RetryScheduled { attempt, delay });
                tokio::time::sleep(delay).await;
            }
        }

        Err(ClientError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

/// Production transport speaking JSON over HTTP via reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpVerificationTransport {
    http: reqwest::Client,
}

impl HttpVerificationTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl VerificationTransport for HttpVerificationTransport {
    fn dispatch(
        &self,
        config: &ApiEndpointConfig,
        payload: &VerificationPayload,
        timeout: Duration,
    ) -> impl Future<Output = CallOutcome> + Send {
        let mut request = self
            .http
            .post(&config.endpoint_url)
            .timeout(timeout)
            .json(payload);
        for (name, value) in &config.auth_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        async move {
            let started = Instant::now();
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    return CallOutcome::failed(
                        err.to_string(),
                        None,
                        err.status().map(|status| status.as_u16()),
                        started.elapsed(),
                    );
                }
            };

            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    return CallOutcome::failed(
                        format!("failed to read response body: {err}"),
                        None,
                        Some(status.as_u16()),
                        started.elapsed(),
                    );
                }
            };

            let elapsed = started.elapsed();
            let data = serde_json::from_str::<Value>(&body).ok();

            if status.is_success() {
                CallOutcome::succeeded(data, Some(body), status.as_u16(), elapsed)
            } else {
                CallOutcome::failed(
                    format!("institution endpoint answered {status}"),
                    Some(body),
                    Some(status.as_u16()),
                    elapsed,
                )
            }
        }
    }
}
