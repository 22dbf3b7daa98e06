//! TOML configuration for the `summ` binary and [`crate::harness`].
//!
//! ```toml
//! [db]
//! path = "./data/summ.sqlite"
//!
//! [providers]
//! device_class = "cuda"
//! summarizer = ["mixtral", { name = "gpt", devices = ["0:2"] }]
//! encoder = ["minilm"]
//! sentence_parser = ["punctuation"]
//!
//! [summarizers.mixtral]
//! style = "mixtral"
//! endpoint = "http://localhost:8080/v1"
//! model = "mixtral-8x7b-instruct"
//!
//! [summary]
//! retries = 2
//! endings = [".", "!", "?"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use summary_harness_core::models::Role;
use summary_harness_core::registry::{ProviderEntry, ProviderRegistry, DEFAULT_DEVICE_CLASS};
use summary_harness_core::sentences::DEFAULT_MAX_SENTENCE_LENGTH;

use crate::prompt::PromptStyle;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub summarizers: BTreeMap<String, SummarizerConfig>,
    #[serde(default)]
    pub encoders: BTreeMap<String, EncoderConfig>,
    #[serde(default)]
    pub sentence_parsers: BTreeMap<String, SentenceParserConfig>,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub vector: Option<VectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_device_class")]
    pub device_class: String,
    #[serde(default)]
    pub sentence_parser: Vec<ProviderEntry>,
    #[serde(default)]
    pub encoder: Vec<ProviderEntry>,
    #[serde(default)]
    pub summarizer: Vec<ProviderEntry>,
}

fn default_device_class() -> String {
    DEFAULT_DEVICE_CLASS.to_string()
}

impl ProvidersConfig {
    pub fn entries(&self, role: Role) -> &[ProviderEntry] {
        match role {
            Role::SentenceParser => &self.sentence_parser,
            Role::Encoder => &self.encoder,
            Role::Summarizer => &self.summarizer,
        }
    }

    pub fn registry(&self) -> Result<ProviderRegistry> {
        let entries: BTreeMap<Role, Vec<ProviderEntry>> = Role::ALL
            .iter()
            .map(|role| (*role, self.entries(*role).to_vec()))
            .collect();
        ProviderRegistry::from_entries(&self.device_class, &entries)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    #[default]
    Heuristic,
    Cl100k,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub style: PromptStyle,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_chunk_length")]
    pub chunk_length: usize,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_cost_per_token")]
    pub cost_per_token: f64,
    #[serde(default)]
    pub tokenizer: TokenizerKind,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

fn default_context_window() -> usize {
    32_768
}
fn default_chunk_length() -> usize {
    24_000
}
fn default_max_new_tokens() -> u32 {
    4_096
}
fn default_cost_per_token() -> f64 {
    0.000_000_3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SentenceParserConfig {
    #[serde(default = "default_max_sentence_length")]
    pub max_sentence_length: usize,
}

fn default_max_sentence_length() -> usize {
    DEFAULT_MAX_SENTENCE_LENGTH
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default)]
    pub max_chunks: usize,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_endings")]
    pub endings: Vec<String>,
    #[serde(default = "default_sentence_limit")]
    pub sentence_limit: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_section_length")]
    pub max_section_length: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    #[serde(default = "default_topic_weight")]
    pub topic_weight: f64,
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    #[serde(default = "default_failure_text")]
    pub failure_text: String,
    #[serde(default = "default_empty_text")]
    pub empty_text: String,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_cache")]
    pub cache: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_chunks: 0,
            retries: default_retries(),
            endings: default_endings(),
            sentence_limit: default_sentence_limit(),
            min_score: default_min_score(),
            workers: default_workers(),
            max_rounds: default_max_rounds(),
            max_section_length: default_max_section_length(),
            timeout_secs: default_call_timeout_secs(),
            window_tokens: default_window_tokens(),
            topic_weight: default_topic_weight(),
            sentinel: default_sentinel(),
            failure_text: default_failure_text(),
            empty_text: default_empty_text(),
            lock_timeout_secs: default_lock_timeout_secs(),
            cache: default_cache(),
        }
    }
}

fn default_retries() -> usize {
    2
}
fn default_endings() -> Vec<String> {
    vec![".".to_string(), "!".to_string(), "?".to_string()]
}
fn default_sentence_limit() -> usize {
    50
}
fn default_min_score() -> f32 {
    0.5
}
fn default_workers() -> usize {
    4
}
fn default_max_rounds() -> usize {
    8
}
fn default_max_section_length() -> usize {
    10_000
}
fn default_call_timeout_secs() -> u64 {
    600
}
fn default_window_tokens() -> usize {
    200
}
fn default_topic_weight() -> f64 {
    summary_harness_core::rank::DEFAULT_TOPIC_WEIGHT
}
fn default_sentinel() -> String {
    "NO_RELEVANT_INFORMATION".to_string()
}
fn default_failure_text() -> String {
    "Summary unavailable: the model did not produce a complete answer.".to_string()
}
fn default_empty_text() -> String {
    "No relevant information was found for this request.".to_string()
}
fn default_lock_timeout_secs() -> u64 {
    30
}
fn default_cache() -> bool {
    true
}

/// Qdrant collection holding one point per document sentence.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    pub url: String,
    pub collection: String,
    #[serde(default = "default_document_field")]
    pub document_field: String,
    #[serde(default = "default_sentence_field")]
    pub sentence_field: String,
    #[serde(default = "default_index_field")]
    pub index_field: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_document_field() -> String {
    "document_id".to_string()
}
fn default_sentence_field() -> String {
    "sentence".to_string()
}
fn default_index_field() -> String {
    "sentence_index".to_string()
}
fn default_title_field() -> String {
    "title".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate providers
    if config.providers.summarizer.is_empty() {
        bail!("providers.summarizer must list at least one provider");
    }
    config.providers.registry()?;

    for entry in &config.providers.summarizer {
        if !config.summarizers.contains_key(entry.name()) {
            bail!(
                "summarizer provider '{}' has no [summarizers.{}] definition",
                entry.name(),
                entry.name()
            );
        }
    }
    for entry in &config.providers.encoder {
        if !config.encoders.contains_key(entry.name()) {
            bail!(
                "encoder provider '{}' has no [encoders.{}] definition",
                entry.name(),
                entry.name()
            );
        }
    }

    for (name, summarizer) in &config.summarizers {
        if summarizer.chunk_length == 0 {
            bail!("summarizers.{}.chunk_length must be > 0", name);
        }
        if summarizer.chunk_length > summarizer.context_window {
            bail!(
                "summarizers.{}.chunk_length ({}) must not exceed context_window ({})",
                name,
                summarizer.chunk_length,
                summarizer.context_window
            );
        }
    }
    for (name, encoder) in &config.encoders {
        if encoder.batch_size == 0 {
            bail!("encoders.{}.batch_size must be > 0", name);
        }
    }

    // Validate summary
    let summary = &config.summary;
    if summary.workers == 0 {
        bail!("summary.workers must be >= 1");
    }
    if summary.max_rounds == 0 {
        bail!("summary.max_rounds must be >= 1");
    }
    if !(0.0..=1.0).contains(&summary.min_score) {
        bail!("summary.min_score must be in [0.0, 1.0]");
    }
    if summary.max_section_length == 0 {
        bail!("summary.max_section_length must be > 0");
    }
    if summary.sentinel.trim().is_empty() {
        bail!("summary.sentinel must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[db]
path = "./data/summ.sqlite"

[providers]
summarizer = ["local", { name = "remote", devices = [1, "3:2"] }]

[summarizers.local]
endpoint = "http://localhost:8080/v1"
model = "mixtral"

[summarizers.remote]
style = "chat_no_system"
endpoint = "http://remote/v1"
model = "gpt"
tokenizer = "cl100k"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.providers.device_class, "cuda");
        assert_eq!(config.summary.retries, 2);
        assert_eq!(config.summary.max_rounds, 8);
        assert!(config.summary.cache);
        assert!(config.vector.is_none());

        let remote = &config.summarizers["remote"];
        assert_eq!(remote.style, PromptStyle::ChatNoSystem);
        assert_eq!(remote.tokenizer, TokenizerKind::Cl100k);
        assert_eq!(config.summarizers["local"].style, PromptStyle::Chat);

        let registry = config.providers.registry().unwrap();
        let remote_spec = registry.find(Role::Summarizer, "remote").unwrap();
        assert_eq!(remote_spec.device_limits.len(), 2);
        assert_eq!(remote_spec.device_limits[1].index, 3);
    }

    #[test]
    fn test_missing_summarizer_definition() {
        let file = write_config(
            r#"
[db]
path = "x.sqlite"
[providers]
summarizer = ["ghost"]
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_rejects_chunk_length_over_window() {
        let file = write_config(&format!(
            "{}\n[summarizers.extra]\nendpoint = \"e\"\nmodel = \"m\"\ncontext_window = 100\nchunk_length = 200\n",
            MINIMAL
        ));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/summ.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.summarizers.len(), 2);
        assert_eq!(config.summarizers["mixtral"].style, PromptStyle::Mixtral);
        assert_eq!(config.vector.unwrap().collection, "sentences");
    }

    #[test]
    fn test_rejects_bad_min_score() {
        let file = write_config(&format!("{}\n[summary]\nmin_score = 1.5\n", MINIMAL));
        assert!(load_config(file.path()).is_err());
    }
}
