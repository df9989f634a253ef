//! Configuration types for metastudy

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Top-level configuration
///
/// Fields are organized into sub-configs:
/// - [`storage`](StorageConfig) - artifact directories and primary document type
/// - [`download`](DownloadConfig) - remote endpoints, pacing, retries
/// - [`labeling`](LabelingConfig) - pipeline size and concurrency ceiling
/// - [`llm`](LlmConfig) - classification backend selection and tuning
/// - [`persistence`](PersistenceConfig) - queue database location
///
/// Every field has a default, so `Config::default()` is a working setup for a
/// local Ollama instance and the public arXiv endpoints.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Artifact directories
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote acquisition settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Labeling pipeline settings
    #[serde(default)]
    pub labeling: LabelingConfig,

    /// Classification backend settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Queue database settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check settings that would otherwise fail deep inside a run
    pub fn validate(&self) -> Result<()> {
        if self.labeling.concurrency == 0 {
            return Err(config_error(
                "concurrency ceiling must be at least 1",
                "labeling.concurrency",
            ));
        }
        if self.storage.primary_extension.trim().is_empty() {
            return Err(config_error(
                "primary document extension must not be empty",
                "storage.primary_extension",
            ));
        }
        for (key, value) in [
            ("download.source_url_base", &self.download.source_url_base),
            ("download.rendered_url_base", &self.download.rendered_url_base),
        ] {
            url::Url::parse(value).map_err(|e| config_error(&format!("{value}: {e}"), key))?;
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// Artifact directories
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Fetched source archives, kept after extraction (default: "data/tarball")
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Canonical primary documents, one per item (default: "data/tex")
    #[serde(default = "default_document_dir")]
    pub document_dir: PathBuf,

    /// Rendered documents (default: "data/pdf")
    #[serde(default = "default_rendered_dir")]
    pub rendered_dir: PathBuf,

    /// Scratch space for archive extraction (default: "data/tmp")
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Extension of the primary source document, without dot (default: "tex")
    #[serde(default = "default_primary_extension")]
    pub primary_extension: String,
}

impl StorageConfig {
    /// Where the fetched source archive of `item_id` is kept
    pub fn source_archive_path(&self, item_id: &str) -> PathBuf {
        self.source_dir
            .join(format!("{}.tar.gz", crate::types::artifact_stem(item_id)))
    }

    /// Where the rendered document of `item_id` is kept
    pub fn rendered_path(&self, item_id: &str) -> PathBuf {
        self.rendered_dir
            .join(format!("{}.pdf", crate::types::artifact_stem(item_id)))
    }

    /// Marker naming the previous version a fallback acquired for `item_id`
    pub fn fallback_marker_path(&self, item_id: &str) -> PathBuf {
        self.source_dir
            .join(format!("{}.fallback", crate::types::artifact_stem(item_id)))
    }

    /// Canonical location of the primary document of `item_id`
    pub fn document_path(&self, item_id: &str) -> PathBuf {
        self.document_dir.join(format!(
            "{}.{}",
            crate::types::artifact_stem(item_id),
            self.primary_extension.trim_start_matches('.')
        ))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            document_dir: default_document_dir(),
            rendered_dir: default_rendered_dir(),
            scratch_dir: default_scratch_dir(),
            primary_extension: default_primary_extension(),
        }
    }
}

/// Remote acquisition settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Batch size when no explicit limit is passed to a run (default: 50)
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// URL prefix for source archives (default: "https://arxiv.org/e-print/")
    #[serde(default = "default_source_url_base")]
    pub source_url_base: String,

    /// URL prefix for rendered documents (default: "https://arxiv.org/pdf/")
    #[serde(default = "default_rendered_url_base")]
    pub rendered_url_base: String,

    /// Minimum spacing between remote requests (default: 3 seconds)
    ///
    /// arXiv's terms of use ask automated clients for one request every three seconds.
    #[serde(default = "default_request_interval", with = "duration_serde")]
    pub request_interval: Duration,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Rendered documents smaller than this are rejected (default: 1024 bytes)
    #[serde(default = "default_min_rendered_bytes")]
    pub min_rendered_bytes: u64,

    /// Retry policy for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            source_url_base: default_source_url_base(),
            rendered_url_base: default_rendered_url_base(),
            request_interval: default_request_interval(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            min_rendered_bytes: default_min_rendered_bytes(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Labeling pipeline settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabelingConfig {
    /// Maximum simultaneous classification calls (default: 2)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Jobs claimed per run when no explicit count is given (default: 10)
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_jobs: default_max_jobs(),
        }
    }
}

/// Which classification backend to construct
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Google Vertex AI (Gemini)
    Vertex,
}

/// Classification backend settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Selected provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Ollama settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Vertex AI settings
    #[serde(default)]
    pub vertex: VertexConfig,
}

/// Ollama backend settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server base URL (default: "http://localhost:11434")
    #[serde(default = "default_ollama_url")]
    pub api_base_url: String,

    /// Model name (default: "gemma3:12b-it-qat")
    #[serde(default = "default_ollama_model")]
    pub model_name: String,

    /// Sampling temperature (default: 0.1)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate (default: 32)
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    /// Output format constraint (default: "json")
    #[serde(default = "default_format")]
    pub format: Option<String>,

    /// Nucleus sampling (default: 0.9)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling (default: 40)
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Request timeout (default: 120 seconds)
    #[serde(default = "default_llm_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_ollama_url(),
            model_name: default_ollama_model(),
            temperature: default_temperature(),
            num_predict: default_num_predict(),
            format: default_format(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            timeout: default_llm_timeout(),
        }
    }
}

/// Vertex AI backend settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VertexConfig {
    /// Google Cloud project id
    #[serde(default)]
    pub project: String,

    /// Region (default: "europe-west4")
    #[serde(default = "default_vertex_location")]
    pub location: String,

    /// Model name (default: "gemini-2.5-flash")
    #[serde(default = "default_vertex_model")]
    pub model_name: String,

    /// API version path segment (default: "v1")
    #[serde(default = "default_vertex_api_version")]
    pub api_version: String,

    /// Endpoint override; derived from `location` when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// OAuth access token; read from `access_token_env` when unset
    #[serde(default)]
    pub access_token: Option<String>,

    /// Environment variable holding the access token (default: "VERTEX_ACCESS_TOKEN")
    #[serde(default = "default_vertex_token_env")]
    pub access_token_env: String,

    /// Sampling temperature (default: 0.1)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling (default: 0.9)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling (default: 40)
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Maximum output tokens (default: 1000)
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Request timeout (default: 120 seconds)
    #[serde(default = "default_llm_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: default_vertex_location(),
            model_name: default_vertex_model(),
            api_version: default_vertex_api_version(),
            endpoint: None,
            access_token: None,
            access_token_env: default_vertex_token_env(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
            timeout: default_llm_timeout(),
        }
    }
}

/// Queue database settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file (default: "metastudy.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("data/tarball")
}

fn default_document_dir() -> PathBuf {
    PathBuf::from("data/tex")
}

fn default_rendered_dir() -> PathBuf {
    PathBuf::from("data/pdf")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("data/tmp")
}

fn default_primary_extension() -> String {
    "tex".to_string()
}

fn default_max_items() -> usize {
    50
}

fn default_source_url_base() -> String {
    "https://arxiv.org/e-print/".to_string()
}

fn default_rendered_url_base() -> String {
    "https://arxiv.org/pdf/".to_string()
}

fn default_request_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("metastudy/", env!("CARGO_PKG_VERSION"), " (research paper analysis)").to_string()
}

fn default_min_rendered_bytes() -> u64 {
    1024
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    2
}

fn default_max_jobs() -> usize {
    10
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "gemma3:12b-it-qat".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_num_predict() -> u32 {
    32
}

fn default_format() -> Option<String> {
    Some("json".to_string())
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

fn default_llm_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_vertex_location() -> String {
    "europe-west4".to_string()
}

fn default_vertex_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_vertex_api_version() -> String {
    "v1".to_string()
}

fn default_vertex_token_env() -> String {
    "VERTEX_ACCESS_TOKEN".to_string()
}

fn default_max_output_tokens() -> u32 {
    1000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("metastudy.db")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.labeling.concurrency, 2);
        assert_eq!(config.labeling.max_jobs, 10);
        assert_eq!(config.download.max_items, 50);
        assert_eq!(config.download.request_interval, Duration::from_secs(3));
        assert_eq!(config.storage.primary_extension, "tex");
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.ollama.format.as_deref(), Some("json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.labeling.concurrency, 2);
        assert_eq!(config.storage.document_dir, PathBuf::from("data/tex"));
        assert_eq!(config.download.timeout, Duration::from_secs(60));
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let config: Config = serde_json::from_str(
            r#"{
                "labeling": { "concurrency": 8 },
                "llm": { "provider": "vertex", "vertex": { "project": "p1" } },
                "download": { "request_interval": 0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.labeling.concurrency, 8);
        assert_eq!(config.labeling.max_jobs, 10);
        assert_eq!(config.llm.provider, LlmProvider::Vertex);
        assert_eq!(config.llm.vertex.project, "p1");
        assert_eq!(config.llm.vertex.model_name, "gemini-2.5-flash");
        assert_eq!(config.download.request_interval, Duration::ZERO);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.labeling.concurrency = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("labeling.concurrency"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.download.rendered_url_base = "not a url".to_string();
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("download.rendered_url_base"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn artifact_paths_follow_storage_layout() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.source_archive_path("2401.01234v2"),
            PathBuf::from("data/tarball/2401.01234v2.tar.gz")
        );
        assert_eq!(
            storage.rendered_path("hep-th/9901001v1"),
            PathBuf::from("data/pdf/hep-th_9901001v1.pdf")
        );
        assert_eq!(
            storage.document_path("2401.01234v2"),
            PathBuf::from("data/tex/2401.01234v2.tex")
        );
        assert_eq!(
            storage.fallback_marker_path("hep-th/9901001v3"),
            PathBuf::from("data/tarball/hep-th_9901001v3.fallback")
        );
    }

    #[test]
    fn validate_rejects_empty_extension() {
        let mut config = Config::default();
        config.storage.primary_extension = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
