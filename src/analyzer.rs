//! Competitive-intelligence analysis of article text.
//!
//! [`Analyzer`] validates its inputs, normalizes and truncates the content,
//! picks one of two prompt templates and sends the result through
//! [`RetryChat`]. Successful answers are memoized in-process, keyed on the
//! exact `(content, label)` pair.
//!
//! The persistent result cache is not consulted here; see
//! [`IntelService::analyze_cached`](crate::service::IntelService::analyze_cached).

use crate::api::{ChatBackend, ChatRequest, RetryChat};
use crate::config::AnalyzerSettings;
use crate::error::AnalysisError;
use crate::models::ConnectionStatus;
use crate::utils::{normalize_whitespace, truncate_chars};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

pub const SYSTEM_PROMPT: &str = "You are a competitive intelligence analyst.";

/// Fixed prompt for [`Analyzer::test_connection`].
pub const CONNECTION_PROBE: &str = "Say 'AI connected!'";

/// Section headers requested for industry-wide analysis.
pub const INDUSTRY_SECTIONS: [&str; 5] = [
    "TECH INNOVATIONS",
    "MARKET IMPACT",
    "COMPANIES MENTIONED",
    "COMPETITIVE THREATS",
    "STRATEGIC IMPLICATIONS",
];

/// Section headers requested for a single competitor.
pub const COMPETITOR_SECTIONS: [&str; 5] = [
    "KEY INNOVATIONS",
    "MARKET POSITIONING",
    "COMPETITIVE ADVANTAGES",
    "AREAS OF CONCERN",
    "STRATEGIC IMPLICATIONS",
];

/// Which prompt a label selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Industry,
    Competitor,
}

impl Template {
    pub fn sections(self) -> &'static [&'static str; 5] {
        match self {
            Template::Industry => &INDUSTRY_SECTIONS,
            Template::Competitor => &COMPETITOR_SECTIONS,
        }
    }

    /// Full user prompt for `content` analyzed under `label`.
    pub fn render(self, label: &str, content: &str) -> String {
        let intro = match self {
            Template::Industry => {
                "Analyze this PropTech content for competitive intelligence, covering real estate \
                 technology, property management, construction technology, smart buildings and \
                 market trends."
                    .to_string()
            }
            Template::Competitor => {
                format!("Analyze this content about {label} for competitive intelligence.")
            }
        };
        let headers: String = self
            .sections()
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}:\n", i + 1))
            .collect();
        format!(
            "{intro}\n\nRespond using exactly these section headers, in this order:\n{headers}\nContent to analyze: {content}"
        )
    }
}

/// Bounded insertion-ordered memo of successful analyses.
#[derive(Debug)]
struct Memo {
    capacity: usize,
    entries: HashMap<(String, String), String>,
    order: VecDeque<(String, String)>,
}

impl Memo {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &(String, String)) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: (String, String), value: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Prompt construction plus a rate-limit-aware API call.
pub struct Analyzer<B> {
    api: RetryChat<B>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    industry_label: String,
    max_content_chars: usize,
    memo: Mutex<Memo>,
}

impl<B: ChatBackend> Analyzer<B> {
    pub fn new(backend: B, settings: &AnalyzerSettings) -> Self {
        let api = RetryChat::new(backend, settings.max_retries, settings.retry_delay())
            .with_jitter(Duration::from_millis(settings.jitter_ms));
        Self {
            api,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            industry_label: settings.industry_label.clone(),
            max_content_chars: settings.max_content_chars,
            memo: Mutex::new(Memo::new(settings.memo_capacity)),
        }
    }

    pub fn backend(&self) -> &B {
        self.api.inner()
    }

    /// Template chosen for `label`.
    pub fn template_for(&self, label: &str) -> Template {
        if label == self.industry_label {
            Template::Industry
        } else {
            Template::Competitor
        }
    }

    /// Whitespace-normalized content, cut to the configured length.
    pub fn preprocess(&self, content: &str) -> String {
        let normalized = normalize_whitespace(content);
        truncate_chars(&normalized, self.max_content_chars).to_string()
    }

    /// Analyze `content` under `label`, keeping failures typed.
    #[instrument(level = "info", skip(self, content), fields(content_len = content.len()))]
    pub async fn try_analyze(&self, content: &str, label: &str) -> Result<String, AnalysisError> {
        if content.trim().is_empty() {
            return Err(AnalysisError::Validation("Content must be a non-empty string"));
        }
        if label.trim().is_empty() {
            return Err(AnalysisError::Validation(
                "Competitor name must be a non-empty string",
            ));
        }

        let key = (content.to_string(), label.to_string());
        if let Some(hit) = self.memo.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            debug!("Memo hit");
            return Ok(hit);
        }

        let processed = self.preprocess(content);
        let template = self.template_for(label);
        let request = ChatRequest {
            model: self.model.clone(),
            system: Some(SYSTEM_PROMPT.to_string()),
            user: template.render(label, &processed),
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
        };

        match self.api.complete(&request).await {
            Ok(summary) => {
                info!(source = %label, ?template, chars = summary.len(), "Analysis complete");
                self.memo
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key, summary.clone());
                Ok(summary)
            }
            Err(e) => {
                error!(
                    source = %label,
                    content_chars = processed.chars().count(),
                    error = %e,
                    "Analysis failed"
                );
                Err(e)
            }
        }
    }

    /// Analyze `content` under `label`. Failures come back as an
    /// `"Analysis failed: …"` string.
    ///
    /// # Arguments
    ///
    /// * `content` - Article text; whitespace is collapsed and the result
    ///   cut to `max_content_chars` before prompting
    /// * `label` - Competitor name, or the industry label to select the
    ///   industry-wide template
    ///
    /// # Returns
    ///
    /// The model's sectioned reply, or a failure string. Never panics or
    /// errors, so one bad item cannot abort a batch.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let analyzer = Analyzer::new(OpenAiClient::from_settings(&settings)?, &settings);
    /// let summary = analyzer.analyze("Acme launches a rental app", "Acme").await;
    /// ```
    pub async fn analyze(&self, content: &str, label: &str) -> String {
        match self.try_analyze(content, label).await {
            Ok(summary) => summary,
            Err(e) => e.to_boundary_string(),
        }
    }

    /// Send a tiny fixed prompt to check credentials and connectivity.
    #[instrument(level = "info", skip(self))]
    pub async fn test_connection(&self) -> ConnectionStatus {
        let request = ChatRequest {
            model: self.model.clone(),
            system: None,
            user: CONNECTION_PROBE.to_string(),
            temperature: None,
            max_tokens: 10,
        };
        match self.api.complete(&request).await {
            Ok(response) => {
                info!("API connection successful");
                ConnectionStatus::Success { response }
            }
            Err(e) => {
                error!(error = %e, "API connection test failed");
                ConnectionStatus::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Forget every memoized analysis.
    pub fn clear_cache(&self) {
        self.memo.lock().unwrap_or_else(|e| e.into_inner()).clear();
        info!("Analysis cache cleared");
    }

    pub fn memo_len(&self) -> usize {
        self.memo.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Records every request and replays scripted outcomes, then echoes.
    #[derive(Default)]
    struct MockBackend {
        script: Mutex<VecDeque<Result<String, ApiError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockBackend {
        fn scripted(outcomes: Vec<Result<String, ApiError>>) -> Self {
            Self {
                script: Mutex::new(outcomes.into()),
                requests: Mutex::default(),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last(&self) -> ChatRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl ChatBackend for MockBackend {
        async fn complete(&self, request: &ChatRequest) -> Result<String, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("analysis #{}", self.calls())))
        }
    }

    fn analyzer(backend: MockBackend) -> Analyzer<MockBackend> {
        Analyzer::new(backend, &AnalyzerSettings::default())
    }

    #[tokio::test]
    async fn test_validation_makes_no_calls() {
        let a = analyzer(MockBackend::default());
        assert_eq!(
            a.analyze("", "Acme").await,
            "Analysis failed: Content must be a non-empty string"
        );
        assert_eq!(
            a.analyze("text", "").await,
            "Analysis failed: Competitor name must be a non-empty string"
        );
        assert_eq!(a.backend().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_then_success() {
        let a = analyzer(MockBackend::scripted(vec![
            Err(ApiError::RateLimited),
            Err(ApiError::RateLimited),
            Ok("SECTIONED ANSWER".to_string()),
        ]));
        let t0 = Instant::now();
        assert_eq!(a.analyze("Proptech news", "Acme").await, "SECTIONED ANSWER");
        assert_eq!(a.backend().calls(), 3);
        assert_eq!(t0.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_is_a_failure_string() {
        let a = analyzer(MockBackend::scripted(vec![
            Err(ApiError::RateLimited),
            Err(ApiError::RateLimited),
            Err(ApiError::RateLimited),
        ]));
        let out = a.analyze("Proptech news", "Acme").await;
        assert!(out.starts_with("Analysis failed: Rate limit exceeded"));
        assert_eq!(a.backend().calls(), 3);
        assert_eq!(a.memo_len(), 0);
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_fails_fast() {
        let a = analyzer(MockBackend::scripted(vec![Err(ApiError::QuotaExceeded)]));
        let out = a.analyze("Proptech news", "Acme").await;
        assert!(out.starts_with("Analysis failed: API quota exceeded"));
        assert_eq!(a.backend().calls(), 1);
    }

    #[tokio::test]
    async fn test_memoizes_successes_only() {
        let a = analyzer(MockBackend::scripted(vec![
            Err(ApiError::Transport("reset".into())),
        ]));
        assert!(a.analyze("content", "Acme").await.starts_with("Analysis failed"));
        let first = a.analyze("content", "Acme").await;
        let second = a.analyze("content", "Acme").await;
        assert_eq!(first, second);
        assert_eq!(a.backend().calls(), 2);

        // Different label is a different key.
        a.analyze("content", "Other").await;
        assert_eq!(a.backend().calls(), 3);

        a.clear_cache();
        assert_eq!(a.memo_len(), 0);
        a.analyze("content", "Acme").await;
        assert_eq!(a.backend().calls(), 4);
    }

    #[tokio::test]
    async fn test_memo_is_bounded() {
        let settings = AnalyzerSettings {
            memo_capacity: 2,
            ..AnalyzerSettings::default()
        };
        let a = Analyzer::new(MockBackend::default(), &settings);
        a.analyze("one", "L").await;
        a.analyze("two", "L").await;
        a.analyze("three", "L").await;
        assert_eq!(a.memo_len(), 2);
        // Oldest was evicted.
        a.analyze("one", "L").await;
        assert_eq!(a.backend().calls(), 4);
        a.analyze("three", "L").await;
        assert_eq!(a.backend().calls(), 4);
    }

    #[tokio::test]
    async fn test_prompt_shape_and_template_choice() {
        let a = analyzer(MockBackend::default());

        a.analyze("Smart   building\n\nnews", "PropTech Industry").await;
        let req = a.backend().last();
        assert_eq!(req.system.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(req.model, "gpt-4");
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.max_tokens, 500);
        for header in INDUSTRY_SECTIONS {
            assert!(req.user.contains(header), "{header}");
        }
        assert!(req.user.ends_with("Content to analyze: Smart building news"));

        a.analyze("Rival launches app", "Acme Corp").await;
        let req = a.backend().last();
        assert!(req.user.contains("Acme Corp"));
        for header in COMPETITOR_SECTIONS {
            assert!(req.user.contains(header), "{header}");
        }
        assert!(!req.user.contains("TECH INNOVATIONS"));
    }

    #[tokio::test]
    async fn test_content_is_truncated() {
        let a = analyzer(MockBackend::default());
        let long = "é".repeat(5000);
        a.analyze(&long, "Acme").await;
        let req = a.backend().last();
        let body = req.user.rsplit("Content to analyze: ").next().unwrap();
        assert_eq!(body.chars().count(), 2000);
    }

    #[tokio::test]
    async fn test_connection_check() {
        let a = analyzer(MockBackend::scripted(vec![Ok("AI connected!".to_string())]));
        let status = a.test_connection().await;
        assert_eq!(
            status,
            ConnectionStatus::Success {
                response: "AI connected!".to_string()
            }
        );
        let req = a.backend().last();
        assert_eq!(req.user, CONNECTION_PROBE);
        assert_eq!(req.max_tokens, 10);
        assert!(req.system.is_none());

        let failing = analyzer(MockBackend::scripted(vec![Err(ApiError::Authentication)]));
        match failing.test_connection().await {
            ConnectionStatus::Error { error } => assert!(error.contains("Authentication failed")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
