//! Test configuration pointing every remote at local mock servers

use metastudy::config::{
    DownloadConfig, LabelingConfig, LlmConfig, OllamaConfig, PersistenceConfig, RetryConfig,
    StorageConfig,
};
use metastudy::{Config, Metastudy};
use std::time::Duration;
use tempfile::TempDir;

/// Config rooted in `dir` with remotes at `remote_uri` and no request pacing
pub fn test_config(dir: &TempDir, remote_uri: &str) -> Config {
    let root = dir.path();
    Config {
        storage: StorageConfig {
            source_dir: root.join("tarball"),
            document_dir: root.join("tex"),
            rendered_dir: root.join("pdf"),
            scratch_dir: root.join("tmp"),
            primary_extension: "tex".to_string(),
        },
        download: DownloadConfig {
            source_url_base: format!("{remote_uri}/e-print/"),
            rendered_url_base: format!("{remote_uri}/pdf/"),
            request_interval: Duration::ZERO,
            timeout: Duration::from_secs(5),
            min_rendered_bytes: 64,
            retry: RetryConfig {
                max_attempts: 1,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 1.0,
                jitter: false,
            },
            ..DownloadConfig::default()
        },
        labeling: LabelingConfig {
            concurrency: 2,
            max_jobs: 10,
        },
        llm: LlmConfig {
            ollama: OllamaConfig {
                api_base_url: remote_uri.to_string(),
                model_name: "test-model".to_string(),
                timeout: Duration::from_secs(5),
                ..OllamaConfig::default()
            },
            ..LlmConfig::default()
        },
        persistence: PersistenceConfig {
            database_path: root.join("metastudy.db"),
        },
    }
}

/// Open a [`Metastudy`] over [`test_config`]
pub async fn test_metastudy(remote_uri: &str) -> (Metastudy, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = test_config(&dir, remote_uri);
    let metastudy = Metastudy::new(config).await.expect("open metastudy");
    (metastudy, dir)
}
