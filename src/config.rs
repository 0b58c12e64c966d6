//! Configuration for a pipeline run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The value is constructed once at process
//! start and passed by reference to every component that needs it; nothing
//! in the crate reads configuration from a global.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use crate::registry::FundRegistry;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Subject line of the daily report email.
pub const DEFAULT_SUBJECT: &str = "Valor diario de la unidad y rentabilidad fondos";

/// Default model for the OpenAI file reader.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Default model for the page-image reader.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-mini";

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use fundprice_ingest::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .sender("reports@fiduciary.example")
///     .extraction_delay_ms(2_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.within_days, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Deployment environment; selects the database identifier.
    pub environment: Environment,

    /// Explicit database identifier. Required for [`Environment::Production`].
    pub database_id: Option<String>,

    /// Only messages from this address are considered.
    pub sender: String,

    /// Required subject line. Default: [`DEFAULT_SUBJECT`].
    pub subject: String,

    /// Search window in days. Default: 2.
    ///
    /// The report for "today" may arrive late in the evening of the
    /// previous day in UTC terms, so the window spans two days.
    pub within_days: u32,

    /// Maximum number of messages requested from the source. Default: 10.
    pub max_results: u32,

    /// Pause between consecutive extraction calls in milliseconds. Default: 1000.
    pub extraction_delay_ms: u64,

    /// Retries of an extraction that ended in a service error. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Execution budget for one scheduled or HTTP-triggered run. Default: 540.
    pub run_timeout_secs: u64,

    /// Per-call timeout for the document-understanding backend. Default: 240.
    pub api_timeout_secs: u64,

    /// Which document-understanding backend to use. Default: [`ReaderKind::OpenAiFile`].
    pub reader: ReaderKind,

    /// Model identifier. If None, the backend default is used.
    pub model: Option<String>,

    /// LLM provider name for the page-image reader (e.g. "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider for the page-image reader.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// API key for the OpenAI file reader. None means "not configured".
    pub openai_api_key: Option<String>,

    /// Sampling temperature for extraction. Default: 0.0.
    pub temperature: f32,

    /// Maximum output tokens for one extraction. Default: 2048.
    pub max_tokens: usize,

    /// Maximum number of PDF pages rendered for the page-image reader. Default: 10.
    pub max_pages: usize,

    /// Funds the report is expected to contain.
    pub registry: FundRegistry,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            database_id: None,
            sender: String::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            within_days: 2,
            max_results: 10,
            extraction_delay_ms: 1000,
            max_retries: 0,
            retry_backoff_ms: 500,
            run_timeout_secs: 540,
            api_timeout_secs: 240,
            reader: ReaderKind::default(),
            model: None,
            provider_name: None,
            provider: None,
            openai_api_key: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_pages: 10,
            registry: FundRegistry::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("environment", &self.environment)
            .field("database_id", &self.database_id)
            .field("sender", &self.sender)
            .field("subject", &self.subject)
            .field("within_days", &self.within_days)
            .field("max_results", &self.max_results)
            .field("extraction_delay_ms", &self.extraction_delay_ms)
            .field("max_retries", &self.max_retries)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("reader", &self.reader)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("registry", &self.registry.len())
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The database identifier for this run's environment.
    pub fn resolved_database_id(&self) -> Result<String, PipelineError> {
        match (&self.database_id, self.environment) {
            (Some(id), _) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            (_, Environment::Qa) => Ok("mpfi-qa-firestore-db".to_string()),
            (_, Environment::Production) => Err(PipelineError::InvalidConfig(
                "production environment requires an explicit database id".into(),
            )),
        }
    }

    /// True when an OpenAI key is present and non-blank.
    pub fn has_openai_key(&self) -> bool {
        self.openai_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn environment(mut self, env: Environment) -> Self {
        self.config.environment = env;
        self
    }

    pub fn database_id(mut self, id: impl Into<String>) -> Self {
        self.config.database_id = Some(id.into());
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.config.sender = sender.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.subject = subject.into();
        self
    }

    pub fn within_days(mut self, days: u32) -> Self {
        self.config.within_days = days.max(1);
        self
    }

    pub fn max_results(mut self, n: u32) -> Self {
        self.config.max_results = n.clamp(1, 500);
        self
    }

    pub fn extraction_delay_ms(mut self, ms: u64) -> Self {
        self.config.extraction_delay_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn run_timeout_secs(mut self, secs: u64) -> Self {
        self.config.run_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn reader(mut self, kind: ReaderKind) -> Self {
        self.config.reader = kind;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn registry(mut self, registry: FundRegistry) -> Self {
        self.config.registry = registry;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.sender.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "a sender address is required".into(),
            ));
        }
        if c.subject.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "the subject filter must not be empty".into(),
            ));
        }
        if c.registry.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "the fund registry must contain at least one fund".into(),
            ));
        }
        if c.run_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "run timeout must be ≥ 1s".into(),
            ));
        }
        c.resolved_database_id()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Qa,
    Production,
}

impl FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qa" | "" => Ok(Environment::Qa),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown environment '{other}' (expected qa or production)"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Qa => f.write_str("qa"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Which document-understanding backend reads the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderKind {
    /// Upload the PDF itself to the OpenAI Responses API. (default)
    #[default]
    OpenAiFile,
    /// Rasterise pages and send them as images to any vision LLM provider.
    Vision,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PipelineConfigBuilder {
        PipelineConfig::builder().sender("reports@example.com")
    }

    #[test]
    fn defaults_match_the_daily_job() {
        let c = base().build().unwrap();
        assert_eq!(c.subject, DEFAULT_SUBJECT);
        assert_eq!(c.within_days, 2);
        assert_eq!(c.max_results, 10);
        assert_eq!(c.extraction_delay_ms, 1000);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.run_timeout_secs, 540);
        assert_eq!(c.reader, ReaderKind::OpenAiFile);
        assert_eq!(c.resolved_database_id().unwrap(), "mpfi-qa-firestore-db");
    }

    #[test]
    fn missing_sender_is_rejected() {
        let err = PipelineConfig::builder().build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn production_requires_database_id() {
        let err = base()
            .environment(Environment::Production)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("database id"));

        let ok = base()
            .environment(Environment::Production)
            .database_id("prices-prod")
            .build()
            .unwrap();
        assert_eq!(ok.resolved_database_id().unwrap(), "prices-prod");
    }

    #[test]
    fn setters_clamp() {
        let c = base()
            .within_days(0)
            .max_results(0)
            .temperature(5.0)
            .max_pages(0)
            .build()
            .unwrap();
        assert_eq!(c.within_days, 1);
        assert_eq!(c.max_results, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_pages, 1);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let c = base().openai_api_key("   ").build().unwrap();
        assert!(!c.has_openai_key());
        let c = base().openai_api_key("sk-test").build().unwrap();
        assert!(c.has_openai_key());
    }

    #[test]
    fn environment_parsing() {
        assert_eq!("QA".parse::<Environment>().unwrap(), Environment::Qa);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = base().openai_api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
