//! Configuration for the paper monitor.
//!
//! Settings come from a TOML file; credentials stay in the environment.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// arXiv Atom query endpoint.
    pub const ARXIV_API: &str = "http://export.arxiv.org/api/query";

    /// bioRxiv/medRxiv API root (serves both servers).
    pub const RXIV_API: &str = "https://api.biorxiv.org";

    /// Groq's OpenAI-compatible endpoint.
    pub const GROQ_API: &str = "https://api.groq.com/openai/v1";

    /// OpenAI endpoint (embeddings).
    pub const OPENAI_API: &str = "https://api.openai.com/v1";

    /// Request timeout (batch classification can be slow).
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Transient-failure retries for catalog requests.
    pub const MAX_RETRIES: u32 = 3;

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Environment variable holding the classifier API key.
    pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

    /// Environment variable holding the embedding API key.
    pub const EMBEDDING_API_KEY_ENV: &str = "EMBEDDING_API_KEY";
}

/// Source defaults.
pub mod defaults {
    use std::time::Duration;

    /// Fetch window when neither the source nor the run sets one.
    pub const FETCH_WINDOW_DAYS: i64 = 1;

    /// arXiv safeguard cap.
    pub const ARXIV_MAX_RESULTS: usize = 500;

    /// bioRxiv/medRxiv page size.
    pub const RXIV_PAGE_SIZE: usize = 100;

    /// Pause between bioRxiv/medRxiv pages.
    pub const RXIV_PAGE_DELAY: Duration = Duration::from_millis(500);

    /// Embedding model.
    pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

    /// Similarity threshold.
    pub const SIMILARITY_THRESHOLD: f32 = 0.65;

    /// Target text used when none is configured.
    pub const TARGET_TEXT: &str = "scientific research papers";

    /// Abstracts per embedding request.
    pub const EMBEDDING_BATCH_SIZE: usize = 32;

    /// Classifier model.
    pub const CLASSIFIER_MODEL: &str = "llama-3.1-8b-instant";

    /// Abstracts per classifier request.
    pub const CLASSIFIER_BATCH_SIZE: usize = 10;

    /// Pause between classifier chunks.
    pub const CLASSIFIER_BATCH_DELAY: Duration = Duration::from_secs(2);

    /// Pause after a rate-limited chunk.
    pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

    /// Minimum classifier confidence for a relevant verdict.
    pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

    /// Classifier prompt.
    pub const CLASSIFIER_PROMPT: &str = "Is this paper relevant?";
}

/// The catalogs the monitor can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    /// arXiv (query-window strategy)
    Arxiv,
    /// bioRxiv (cursor-pagination strategy)
    Biorxiv,
    /// medRxiv (cursor-pagination strategy)
    Medrxiv,
}

impl SourceName {
    /// Parse a configured source name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "arxiv" => Some(Self::Arxiv),
            "biorxiv" => Some(Self::Biorxiv),
            "medrxiv" => Some(Self::Medrxiv),
            _ => None,
        }
    }

    /// Tag stored on every paper the source produces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::Biorxiv => "biorxiv",
            Self::Medrxiv => "medrxiv",
        }
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which relevance strategy a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceMethod {
    /// Substring keyword match
    #[default]
    Keyword,
    /// Embedding similarity against target texts
    Embedding,
    /// Batch remote classifier
    Classifier,
    /// Every fetched paper is relevant
    None,
}

impl RelevanceMethod {
    /// Name reported in run statistics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Embedding => "embedding",
            Self::Classifier => "classifier",
            Self::None => "none",
        }
    }
}

/// What keyword mode does when a source has no keywords at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyKeywordPolicy {
    /// Papers from that source are all relevant
    PassAll,
    /// Papers from that source are all dropped
    #[default]
    RejectAll,
}

/// A string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// Single value
    One(String),
    /// List of values
    Many(Vec<String>),
}

impl OneOrMany {
    /// Flatten into a list.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run-wide settings.
    pub run: RunConfig,

    /// Per-catalog settings.
    pub sources: SourcesConfig,

    /// Relevance strategy settings.
    pub relevance: RelevanceConfig,

    /// HTTP client settings.
    pub http: HttpConfig,

    /// Classifier API key (from `GROQ_API_KEY`).
    #[serde(skip)]
    pub classifier_api_key: Option<String>,

    /// Embedding API key (from `EMBEDDING_API_KEY`).
    #[serde(skip)]
    pub embedding_api_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("run", &self.run)
            .field("sources", &self.sources)
            .field("relevance", &self.relevance)
            .field("http", &self.http)
            .field("has_classifier_key", &self.has_classifier_key())
            .field("has_embedding_key", &self.embedding_api_key.is_some())
            .finish()
    }
}

/// Run-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Fallback fetch window for sources that don't set one.
    pub global_fetch_window_days: Option<i64>,

    /// Sources to fetch from, in order.
    pub active_sources: Vec<String>,

    /// Relevance strategy.
    pub relevance_method: RelevanceMethod,

    /// Keyword-mode behaviour for sources without keywords.
    pub empty_keywords: EmptyKeywordPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            global_fetch_window_days: None,
            active_sources: vec!["arxiv".to_string()],
            relevance_method: RelevanceMethod::default(),
            empty_keywords: EmptyKeywordPolicy::default(),
        }
    }
}

/// Per-catalog settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// arXiv.
    pub arxiv: ArxivConfig,

    /// bioRxiv.
    pub biorxiv: RxivConfig,

    /// medRxiv.
    pub medrxiv: RxivConfig,
}

/// arXiv settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    /// Category tags (e.g. `cs.AI`).
    pub categories: Vec<String>,

    /// Records requested per run.
    pub max_total_results: usize,

    /// Source-specific fetch window.
    pub fetch_window_days: Option<i64>,

    /// Keywords for keyword mode.
    pub keywords: Vec<String>,

    /// Query endpoint.
    pub base_url: String,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            max_total_results: defaults::ARXIV_MAX_RESULTS,
            fetch_window_days: None,
            keywords: Vec::new(),
            base_url: api::ARXIV_API.to_string(),
        }
    }
}

/// bioRxiv/medRxiv settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RxivConfig {
    /// Server override (`biorxiv` or `medrxiv`).
    pub server: Option<String>,

    /// Category names (e.g. `Bioinformatics`); empty means all.
    pub categories: Vec<String>,

    /// Source-specific fetch window.
    pub fetch_window_days: Option<i64>,

    /// Overall cap on accepted papers.
    pub max_total_results: Option<usize>,

    /// Items the API serves per page.
    pub page_size: usize,

    /// Pause between pages, in milliseconds.
    pub page_delay_ms: u64,

    /// Keywords for keyword mode.
    pub keywords: Vec<String>,

    /// API root.
    pub base_url: String,
}

impl Default for RxivConfig {
    fn default() -> Self {
        Self {
            server: None,
            categories: Vec::new(),
            fetch_window_days: None,
            max_total_results: None,
            page_size: defaults::RXIV_PAGE_SIZE,
            page_delay_ms: defaults::RXIV_PAGE_DELAY.as_millis() as u64,
            keywords: Vec::new(),
            base_url: api::RXIV_API.to_string(),
        }
    }
}

/// Relevance strategy settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    /// Keyword strategy.
    pub keyword: KeywordConfig,

    /// Embedding strategy.
    pub embedding: EmbeddingConfig,

    /// Classifier strategy.
    pub classifier: ClassifierConfig,
}

/// Keyword strategy settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Keywords used for sources without their own list.
    pub keywords: Vec<String>,
}

/// Embedding strategy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model id.
    pub model: String,

    /// Minimum max-similarity for a relevant paper.
    pub similarity_threshold: f32,

    /// Texts describing what is relevant.
    pub target_texts: OneOrMany,

    /// Abstracts per embedding request.
    pub batch_size: usize,

    /// OpenAI-compatible API root.
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: defaults::EMBEDDING_MODEL.to_string(),
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            target_texts: OneOrMany::Many(vec![defaults::TARGET_TEXT.to_string()]),
            batch_size: defaults::EMBEDDING_BATCH_SIZE,
            base_url: api::OPENAI_API.to_string(),
        }
    }
}

/// Classifier strategy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Chat model id.
    pub model: String,

    /// Abstracts per request; non-positive falls back to the default.
    pub batch_size: i64,

    /// Pause between chunks; negative falls back to the default.
    pub batch_delay_seconds: f64,

    /// Pause after a rate-limited chunk.
    pub rate_limit_backoff_seconds: f64,

    /// Relevance question asked about every abstract.
    pub prompt: String,

    /// Minimum confidence for a relevant verdict.
    pub confidence_threshold: f64,

    /// OpenAI-compatible API root.
    pub base_url: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: defaults::CLASSIFIER_MODEL.to_string(),
            batch_size: defaults::CLASSIFIER_BATCH_SIZE as i64,
            batch_delay_seconds: defaults::CLASSIFIER_BATCH_DELAY.as_secs_f64(),
            rate_limit_backoff_seconds: defaults::RATE_LIMIT_BACKOFF.as_secs_f64(),
            prompt: defaults::CLASSIFIER_PROMPT.to_string(),
            confidence_threshold: defaults::CONFIDENCE_THRESHOLD,
            base_url: api::GROQ_API.to_string(),
        }
    }
}

impl ClassifierConfig {
    /// Batch size with the non-positive fallback applied.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size > 0 {
            self.batch_size as usize
        } else {
            tracing::warn!(
                batch_size = self.batch_size,
                "Non-positive classifier batch_size, using default"
            );
            defaults::CLASSIFIER_BATCH_SIZE
        }
    }

    /// Inter-chunk delay with the negative fallback applied.
    #[must_use]
    pub fn batch_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.batch_delay_seconds).unwrap_or_else(|_| {
            tracing::warn!(
                batch_delay_seconds = self.batch_delay_seconds,
                "Invalid classifier batch_delay_seconds, using default"
            );
            defaults::CLASSIFIER_BATCH_DELAY
        })
    }

    /// Rate-limit backoff, never shorter than the inter-chunk delay.
    #[must_use]
    pub fn rate_limit_backoff(&self) -> Duration {
        let backoff = Duration::try_from_secs_f64(self.rate_limit_backoff_seconds)
            .unwrap_or(defaults::RATE_LIMIT_BACKOFF);
        backoff.max(self.batch_delay())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Transient-failure retries for catalog requests.
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: api::REQUEST_TIMEOUT.as_secs(),
            connect_timeout_secs: api::CONNECT_TIMEOUT.as_secs(),
            max_retries: api::MAX_RETRIES,
        }
    }
}

impl HttpConfig {
    /// Request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file and credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config = Self::from_toml_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.classifier_api_key = std::env::var(api::GROQ_API_KEY_ENV).ok();
        config.embedding_api_key = std::env::var(api::EMBEDDING_API_KEY_ENV).ok();
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds no score can be compared against.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let similarity = self.relevance.embedding.similarity_threshold;
        if !(-1.0..=1.0).contains(&similarity) {
            return Err(ConfigError::invalid(
                "relevance.embedding.similarity_threshold",
                format!("{similarity} is outside [-1, 1]"),
            ));
        }
        let confidence = self.relevance.classifier.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConfigError::invalid(
                "relevance.classifier.confidence_threshold",
                format!("{confidence} is outside [0, 1]"),
            ));
        }
        Ok(())
    }

    /// Parse configuration from TOML text (no environment lookups).
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML for this schema.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Create a test configuration pointing every remote at one mock server.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        let mut config = Self::default();
        config.sources.arxiv.base_url = format!("{}/api/query", base_url);
        config.sources.biorxiv.base_url = base_url.to_string();
        config.sources.biorxiv.page_delay_ms = 0; // No delay in tests
        config.sources.medrxiv.base_url = base_url.to_string();
        config.sources.medrxiv.page_delay_ms = 0;
        config.relevance.embedding.base_url = format!("{}/v1", base_url);
        config.relevance.classifier.base_url = format!("{}/openai/v1", base_url);
        config.relevance.classifier.batch_delay_seconds = 0.0;
        config.relevance.classifier.rate_limit_backoff_seconds = 0.0;
        config.http = HttpConfig { request_timeout_secs: 5, connect_timeout_secs: 2, max_retries: 0 };
        config.classifier_api_key = Some("test-key".to_string());
        config.embedding_api_key = Some("test-key".to_string());
        config
    }

    /// Sources listed in `active_sources`, unknown names dropped with an error log.
    #[must_use]
    pub fn active_sources(&self) -> Vec<SourceName> {
        let mut names = Vec::new();
        for raw in &self.run.active_sources {
            match SourceName::parse(raw) {
                Some(name) if !names.contains(&name) => names.push(name),
                Some(_) => tracing::warn!(source = %raw, "Source listed twice, ignoring repeat"),
                None => tracing::error!(source = %raw, "Unknown paper source specified"),
            }
        }
        names
    }

    /// Fetch window for a source: source-specific > global > default.
    #[must_use]
    pub fn fetch_window_days(&self, source: SourceName) -> i64 {
        let specific = match source {
            SourceName::Arxiv => self.sources.arxiv.fetch_window_days,
            SourceName::Biorxiv => self.sources.biorxiv.fetch_window_days,
            SourceName::Medrxiv => self.sources.medrxiv.fetch_window_days,
        };
        resolve_fetch_window(source, specific, self.run.global_fetch_window_days)
    }

    /// Keywords applied to papers from `source` in keyword mode.
    #[must_use]
    pub fn keywords_for(&self, source: SourceName) -> &[String] {
        let specific = match source {
            SourceName::Arxiv => &self.sources.arxiv.keywords,
            SourceName::Biorxiv => &self.sources.biorxiv.keywords,
            SourceName::Medrxiv => &self.sources.medrxiv.keywords,
        };
        if specific.is_empty() { &self.relevance.keyword.keywords } else { specific }
    }

    /// Check if a classifier API key is configured.
    #[must_use]
    pub const fn has_classifier_key(&self) -> bool {
        self.classifier_api_key.is_some()
    }
}

fn resolve_fetch_window(source: SourceName, specific: Option<i64>, global: Option<i64>) -> i64 {
    if let Some(days) = specific {
        if days > 0 {
            return days;
        }
        tracing::warn!(%source, days, "Source fetch_window_days is not positive, checking global");
    }
    if let Some(days) = global {
        if days > 0 {
            return days;
        }
        tracing::warn!(%source, days, "Global fetch_window_days is not positive, using default");
    }
    defaults::FETCH_WINDOW_DAYS
}
