//! Language-model API access with rate-limit backoff.
//!
//! # Architecture
//!
//! - [`ChatBackend`]: one chat completion, no retries
//! - [`OpenAiClient`]: Chat Completions over `reqwest`
//! - [`RetryChat`]: wraps any backend and retries rate-limit signals with
//!   exponential backoff
//!
//! # Retry Strategy
//!
//! Only [`ApiError::RateLimited`] is retried. `max_retries` is the total
//! number of attempts; before attempt `n + 1` the caller waits
//! `base_delay * 2^n` (plus optional jitter), so the defaults give 1s then 2s.
//! Every other error fails on the spot.

use crate::config::AnalyzerSettings;
use crate::error::{AnalysisError, ApiError};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{error, info, instrument, warn};

/// One system/user exchange to send to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    /// `None` leaves the provider default in place.
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// A single chat completion round trip.
///
/// Implementors make exactly one attempt; retry policy lives in
/// [`RetryChat`].
pub trait ChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ApiError>;
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Map a non-success HTTP answer onto the error taxonomy.
pub fn classify_status(status: u16, body: &str) -> ApiError {
    match status {
        429 if body.contains("insufficient_quota") => ApiError::QuotaExceeded,
        429 => ApiError::RateLimited,
        401 | 403 => ApiError::Authentication,
        _ => ApiError::Status {
            status,
            body: truncate_for_log(body.trim(), 200),
        },
    }
}

/// OpenAI-compatible Chat Completions client.
///
/// A missing credential is only reported when a call is made.
pub struct OpenAiClient {
    http: Client,
    api_base: String,
    api_key: Option<String>,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_base", &self.api_base)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(
        api_base: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, api_base, api_key))
    }

    pub fn with_client(http: Client, api_base: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Build from settings, falling back to `OPENAI_API_KEY` when no key is
    /// configured.
    pub fn from_settings(settings: &AnalyzerSettings) -> Result<Self, reqwest::Error> {
        Self::new(
            &settings.api_base,
            resolve_api_key(settings.api_key.clone(), std::env::var(API_KEY_ENV).ok()),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Environment variable consulted when settings carry no key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// A non-blank configured key wins over the environment.
fn resolve_api_key(configured: Option<String>, from_env: Option<String>) -> Option<String> {
    configured
        .filter(|k| !k.trim().is_empty())
        .or_else(|| from_env.filter(|k| !k.trim().is_empty()))
}

impl ChatBackend for OpenAiClient {
    #[instrument(level = "debug", skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, ApiError> {
        let key = self.api_key.as_deref().ok_or(ApiError::MissingCredential)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.user,
        });
        let body = CompletionBody {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let t0 = Instant::now();
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let err = classify_status(status.as_u16(), &text);
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                error = %err,
                "API call failed"
            );
            return Err(err);
        }

        let parsed: CompletionResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ApiError::EmptyCompletion)
    }
}

/// Decorator adding rate-limit backoff to any [`ChatBackend`].
pub struct RetryChat<T> {
    inner: T,
    /// Total attempts while the backend keeps answering "rate limited".
    max_retries: usize,
    base_delay: Duration,
    /// Upper bound of random extra wait per retry.
    jitter: Duration,
}

impl<T> fmt::Debug for RetryChat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryChat")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl<T: ChatBackend> RetryChat<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries: max_retries.max(1),
            base_delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Wait before the attempt following zero-based `attempt`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31) as u32);
        let mut delay = self.base_delay.saturating_mul(factor);
        if !self.jitter.is_zero() {
            let max_ms = self.jitter.as_millis() as u64;
            delay += Duration::from_millis(rng().random_range(0..=max_ms));
        }
        delay
    }

    /// Send `request`, backing off on rate limits.
    ///
    /// Only [`ApiError::RateLimited`] is retried. Attempt `n` (from 0) is
    /// followed by a wait of [`backoff(n)`](Self::backoff) before the next
    /// one, and every retry decision is logged.
    ///
    /// # Arguments
    ///
    /// * `request` - The prompt and sampling parameters, sent unchanged on
    ///   every attempt
    ///
    /// # Returns
    ///
    /// * `Ok(text)` - The model's reply, verbatim
    /// * `Err(AnalysisError::RateLimitExhausted)` - Every attempt was rate limited
    /// * `Err(AnalysisError::Api)` - Any other failure, returned at once
    ///
    /// # Example
    ///
    /// ```ignore
    /// let api = RetryChat::new(OpenAiClient::from_settings(&settings)?, 3, Duration::from_secs(1));
    /// let reply = api.complete(&request).await?;
    /// ```
    #[instrument(level = "info", skip_all)]
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, AnalysisError> {
        let total_t0 = Instant::now();

        for attempt in 0..self.max_retries {
            match self.inner.complete(request).await {
                Ok(text) => {
                    if attempt > 0 {
                        info!(
                            attempts = attempt + 1,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            "Completion succeeded after retry"
                        );
                    }
                    return Ok(text);
                }
                Err(e) if e.is_rate_limit() && attempt + 1 < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        ?delay,
                        "Rate limit hit; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_rate_limit() => break,
                Err(e) => return Err(e.into()),
            }
        }

        error!(
            attempts = self.max_retries,
            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
            "Rate limit persisted; giving up"
        );
        Err(AnalysisError::RateLimitExhausted {
            attempts: self.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Replays a fixed sequence of outcomes.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, ApiError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, ApiError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ChatBackend for Scripted {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::EmptyCompletion))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4".to_string(),
            system: Some("sys".to_string()),
            user: "hello".to_string(),
            temperature: Some(0.7),
            max_tokens: 500,
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, "slow down"), ApiError::RateLimited));
        assert!(matches!(
            classify_status(429, r#"{"error":{"code":"insufficient_quota"}}"#),
            ApiError::QuotaExceeded
        ));
        assert!(matches!(classify_status(401, ""), ApiError::Authentication));
        assert!(matches!(classify_status(403, ""), ApiError::Authentication));
        assert!(matches!(
            classify_status(500, " oops "),
            ApiError::Status { status: 500, ref body } if body == "oops"
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryChat::new(Scripted::new(vec![]), 3, Duration::from_secs(1));
        assert_eq!(retry.backoff(0), Duration::from_secs(1));
        assert_eq!(retry.backoff(1), Duration::from_secs(2));
        assert_eq!(retry.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let retry = RetryChat::new(Scripted::new(vec![]), 3, Duration::from_secs(1))
            .with_jitter(Duration::from_millis(250));
        for _ in 0..20 {
            let d = retry.backoff(1);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limit_then_succeeds() {
        let backend = Scripted::new(vec![
            Err(ApiError::RateLimited),
            Err(ApiError::RateLimited),
            Ok("analysis".to_string()),
        ]);
        let retry = RetryChat::new(backend, 3, Duration::from_secs(1));

        let t0 = Instant::now();
        let out = retry.complete(&request()).await.unwrap();
        assert_eq!(out, "analysis");
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff.
        assert_eq!(t0.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion() {
        let backend = Scripted::new(vec![
            Err(ApiError::RateLimited),
            Err(ApiError::RateLimited),
            Err(ApiError::RateLimited),
            Ok("never".to_string()),
        ]);
        let retry = RetryChat::new(backend, 3, Duration::from_secs(1));
        let err = retry.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimitExhausted { attempts: 3 }));
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let backend = Scripted::new(vec![Err(ApiError::Authentication), Ok("never".to_string())]);
        let retry = RetryChat::new(backend, 3, Duration::from_secs(1));
        let t0 = Instant::now();
        let err = retry.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Api(ApiError::Authentication)));
        assert_eq!(retry.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let client = OpenAiClient::with_client(Client::new(), "http://127.0.0.1:9", None);
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingCredential));

        let blank = OpenAiClient::with_client(Client::new(), "http://127.0.0.1:9", Some("  ".into()));
        assert!(matches!(
            blank.complete(&request()).await.unwrap_err(),
            ApiError::MissingCredential
        ));
    }

    #[test]
    fn test_api_key_falls_back_to_environment() {
        let env = Some("sk-env".to_string());
        assert_eq!(resolve_api_key(Some("sk-file".into()), env.clone()).as_deref(), Some("sk-file"));
        assert_eq!(resolve_api_key(None, env.clone()).as_deref(), Some("sk-env"));
        assert_eq!(resolve_api_key(Some("  ".into()), env).as_deref(), Some("sk-env"));
        assert_eq!(resolve_api_key(None, Some(String::new())), None);
        assert_eq!(resolve_api_key(None, None), None);
    }

    #[test]
    fn test_from_settings_keeps_configured_key() {
        let settings = AnalyzerSettings {
            api_key: Some("sk-configured".to_string()),
            ..AnalyzerSettings::default()
        };
        assert!(OpenAiClient::from_settings(&settings).unwrap().has_key());
    }

    /// One-shot HTTP server that records the raw request it receives.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, Arc<Mutex<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            // Read headers, then as much body as Content-Length announces.
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(split) = text.find("\r\n\r\n") {
                    let len = text[..split]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + len {
                        break;
                    }
                }
            }
            *sink.lock().unwrap() = String::from_utf8_lossy(&raw).into_owned();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        (format!("http://{addr}/v1"), seen)
    }

    fn local_client(base: &str) -> OpenAiClient {
        let http = Client::builder().no_proxy().build().unwrap();
        OpenAiClient::with_client(http, base, Some("sk-test".to_string()))
    }

    #[tokio::test]
    async fn test_openai_round_trip() {
        let (base, seen) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"TECH INNOVATIONS: none"}}]}"#,
        )
        .await;
        let out = local_client(&base).complete(&request()).await.unwrap();
        assert_eq!(out, "TECH INNOVATIONS: none");

        let raw = seen.lock().unwrap().clone();
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(raw.contains(r#""role":"system""#));
        assert!(raw.contains(r#""max_tokens":500"#));
    }

    #[tokio::test]
    async fn test_openai_rate_limit_status() {
        let (base, _) = serve_once("429 Too Many Requests", r#"{"error":{"message":"slow"}}"#).await;
        let err = local_client(&base).complete(&request()).await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_openai_empty_choices() {
        let (base, _) = serve_once("200 OK", r#"{"choices":[]}"#).await;
        let err = local_client(&base).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::EmptyCompletion));
    }
}
