//! LLM API interaction with exponential backoff retry logic.
//!
//! This module provides the interface the analyzer and blogger use to talk
//! to an OpenAI-compatible chat-completions API. Transient failures are
//! retried with exponential backoff and jitter.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait defining async LLM interaction
//! - [`OpenAiChat`]: `reqwest` client for `POST <base_url>/chat/completions`
//! - [`RetryAsk`]: decorator that adds retry logic to any `AskAsync` implementation
//! - [`RetryPolicy`]: the injected backoff parameters
//!
//! # Retry Strategy
//!
//! Only failures classified as transient by [`LlmError::is_retryable`] are
//! retried: timeouts, connection errors, HTTP 429 and HTTP 5xx. Everything
//! else is returned on the first attempt.

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Failure of one LLM call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("model returned an empty answer")]
    Empty,
}

impl LlmError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..=599).contains(status)
            }
            LlmError::Malformed(_) | LlmError::Empty => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            LlmError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

/// Trait for async LLM interaction.
///
/// Implementors send a system instruction plus user input to an LLM and
/// return its text answer. This abstraction allows for different LLM
/// backends, decorators like [`RetryAsk`], and fakes in tests.
pub trait AskAsync {
    /// Send `input` to the LLM under `instructions`.
    ///
    /// # Arguments
    ///
    /// * `instructions` - The system prompt
    /// * `input` - The user message
    ///
    /// # Returns
    ///
    /// The LLM's answer, or an error if the request failed.
    async fn ask(&self, instructions: &str, input: &str) -> Result<String, LlmError>;
}

/// Backoff parameters for [`RetryAsk`].
///
/// The delay before retry `n` (1-based) is:
/// ```text
/// delay = min(base_delay * 2^(n-1), max_delay) + random(0..=jitter)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub base_delay: StdDuration,
    pub max_delay: StdDuration,
    pub jitter: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: StdDuration::from_secs(1),
            max_delay: StdDuration::from_secs(30),
            jitter: StdDuration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: StdDuration::ZERO,
            max_delay: StdDuration::ZERO,
            jitter: StdDuration::ZERO,
        }
    }

    /// Backoff before retry `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: usize) -> StdDuration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered_delay_for(&self, attempt: usize) -> StdDuration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        self.delay_for(attempt) + StdDuration::from_millis(jitter)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// Transient errors are retried up to `policy.max_retries` times; a fatal
/// error or the last transient one is returned to the caller.
#[derive(Clone)]
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = OpenAiChat::new(&config.llm, api_key)?;
    /// let retry_client = RetryAsk::new(client, RetryPolicy::default());
    /// ```
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.policy.max_retries)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, instructions: &str, input: &str) -> Result<String, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(instructions, input).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() {
                        error!(
                            attempt,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            error = %e,
                            "ask() failed with a non-retryable error"
                        );
                        return Err(e);
                    }

                    if attempt > self.policy.max_retries {
                        error!(
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.jittered_delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// The API key is handed in by the caller; the client never reads the
/// environment.
#[derive(Clone)]
pub struct OpenAiChat {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl AskAsync for OpenAiChat {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, instructions: &str, input: &str) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(
                elapsed_ms = dt.as_millis(),
                status = status.as_u16(),
                body = %truncate_for_log(&text, 300),
                "API call failed"
            );
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 300),
            });
        }

        let answer = extract_answer(&text)?;
        debug!(elapsed_ms = dt.as_millis(), chars = answer.len(), "API call succeeded");
        Ok(answer)
    }
}

/// Pull the first choice's content out of a chat-completions response body.
fn extract_answer(body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Malformed(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given error `failures` times, then answers.
    struct FlakyAsk {
        calls: Arc<AtomicUsize>,
        failures: usize,
        make_error: fn() -> LlmError,
    }

    impl AskAsync for FlakyAsk {
        async fn ask(&self, _instructions: &str, input: &str) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.make_error)())
            } else {
                Ok(format!("answer to {input}"))
            }
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::none()
        }
    }

    fn flaky(failures: usize, make_error: fn() -> LlmError) -> (FlakyAsk, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            FlakyAsk {
                calls: Arc::clone(&calls),
                failures,
                make_error,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let (inner, calls) = flaky(2, || LlmError::Status {
            status: 429,
            body: "slow down".to_string(),
        });
        let api = RetryAsk::new(inner, fast_policy(3));
        assert_eq!(api.ask("sys", "q").await.unwrap(), "answer to q");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (inner, calls) = flaky(10, || LlmError::Timeout);
        let api = RetryAsk::new(inner, fast_policy(2));
        assert!(matches!(api.ask("sys", "q").await, Err(LlmError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let (inner, calls) = flaky(10, || LlmError::Status {
            status: 401,
            body: "bad key".to_string(),
        });
        let api = RetryAsk::new(inner, fast_policy(5));
        assert!(matches!(
            api.ask("sys", "q").await,
            Err(LlmError::Status { status: 401, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retry_policy_makes_one_attempt() {
        let (inner, calls) = flaky(1, || LlmError::Transport("reset".to_string()));
        let api = RetryAsk::new(inner, RetryPolicy::none());
        assert!(api.ask("sys", "q").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Transport("x".into()).is_retryable());
        for status in [429, 500, 502, 503] {
            assert!(LlmError::Status { status, body: String::new() }.is_retryable());
        }
        for status in [400, 401, 403, 404] {
            assert!(!LlmError::Status { status, body: String::new() }.is_retryable());
        }
        assert!(!LlmError::Empty.is_retryable());
        assert!(!LlmError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), StdDuration::from_secs(1));
        assert_eq!(policy.delay_for(2), StdDuration::from_secs(2));
        assert_eq!(policy.delay_for(5), StdDuration::from_secs(16));
        assert_eq!(policy.delay_for(6), StdDuration::from_secs(30));
        assert_eq!(policy.delay_for(200), StdDuration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.jittered_delay_for(1);
            assert!(d >= StdDuration::from_secs(1));
            assert!(d <= StdDuration::from_millis(1250));
        }
    }

    #[test]
    fn test_extract_answer() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Hello  "}}]}"#;
        assert_eq!(extract_answer(body).unwrap(), "Hello");

        assert!(matches!(extract_answer(r#"{"choices":[]}"#), Err(LlmError::Empty)));
        assert!(matches!(
            extract_answer(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(LlmError::Empty)
        ));
        assert!(matches!(extract_answer("<html>"), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn test_client_debug_hides_key() {
        let client = OpenAiChat::new(&LlmConfig::default(), "sk-secret".to_string()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
