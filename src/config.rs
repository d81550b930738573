use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::backend::{BackendConfig, BackendType};
use crate::error::{RelingoError, Result};
use crate::language::LanguageCode;
use crate::transport::HttpMethod;

// Default values for service configuration
fn default_true() -> bool {
    true
}

fn default_max_cache_size() -> usize {
    1000
}

fn default_max_history_size() -> usize {
    100
}

fn default_batch_poll_interval_ms() -> u64 {
    200
}

fn default_data_dir() -> String {
    ".relingo/data".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Reuse previous results for identical requests
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Record successful translations in the history log
    #[serde(default = "default_true")]
    pub history_enabled: bool,
    /// Cache capacity; the oldest inserted entry is evicted first
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    /// History capacity; the oldest entry is dropped first
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Poll interval used while waiting for batch tasks
    #[serde(default = "default_batch_poll_interval_ms")]
    pub batch_poll_interval_ms: u64,
    /// Directory holding the settings, history and cache documents
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            history_enabled: true,
            max_cache_size: default_max_cache_size(),
            max_history_size: default_max_history_size(),
            batch_poll_interval_ms: default_batch_poll_interval_ms(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub custom: CustomApiConfig,
}

impl BackendsConfig {
    pub fn get(&self, backend_type: BackendType) -> BackendConfig {
        match backend_type {
            BackendType::OpenAi => BackendConfig::OpenAi(self.openai.clone()),
            BackendType::CustomApi => BackendConfig::CustomApi(self.custom.clone()),
        }
    }

    pub fn set(&mut self, config: BackendConfig) {
        match config {
            BackendConfig::OpenAi(openai) => self.openai = openai,
            BackendConfig::CustomApi(custom) => self.custom = custom,
        }
    }
}

/// Settings for the chat-completion backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub enabled: bool,
    pub api_key: String,
    /// Base URL of the API, without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    /// Sampling temperature, 0.0 - 2.0
    pub temperature: f32,
    /// Upper bound on generated tokens when the request does not set one
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            timeout_secs: 30,
            retry_count: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Settings for the generic HTTP backend.
///
/// Templates and header values may use the `{{text}}`, `{{from}}`, `{{to}}`
/// and `{{apiKey}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomApiConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub method: HttpMethod,
    pub api_key: String,
    /// Request field carrying the API key, if the API wants it in the payload
    pub api_key_field: Option<String>,
    pub text_field: String,
    pub from_field: String,
    pub to_field: String,
    /// JSON body template for POST requests; field mappings are used when absent
    pub request_template: Option<String>,
    /// Dotted path to the translated text, e.g. `choices.0.text`
    pub response_path: String,
    /// Dotted path that, when present in a response, marks it as an error
    pub error_field: Option<String>,
    /// Languages the endpoint accepts; empty means all known languages
    pub supported_languages: Vec<LanguageCode>,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl Default for CustomApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            method: HttpMethod::Post,
            api_key: String::new(),
            api_key_field: None,
            text_field: "text".to_string(),
            from_field: "source_lang".to_string(),
            to_field: "target_lang".to_string(),
            request_template: None,
            response_path: "translatedText".to_string(),
            error_field: Some("error".to_string()),
            supported_languages: Vec::new(),
            timeout_secs: 30,
            retry_count: 3,
            retry_delay_ms: 1000,
            headers: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelingoError::ConfigInvalid(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| RelingoError::ConfigInvalid(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RelingoError::ConfigInvalid(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| RelingoError::ConfigInvalid(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Fill an empty OpenAI key from `RELINGO_OPENAI_API_KEY` or `OPENAI_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        if !self.backends.openai.api_key.is_empty() {
            return;
        }
        let key = std::env::var("RELINGO_OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = key {
            self.backends.openai.api_key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [service]
            max_history_size = 5

            [backends.openai]
            api_key = "sk-test"
            model = "gpt-4o-mini"

            [backends.custom]
            enabled = true
            endpoint = "http://localhost:8080/translate"
            method = "GET"
            supported_languages = ["en", "zh-CN"]
            "#,
        )
        .unwrap();

        assert!(config.service.cache_enabled);
        assert_eq!(config.service.max_history_size, 5);
        assert_eq!(config.service.max_cache_size, 1000);
        assert_eq!(config.backends.openai.api_key, "sk-test");
        assert_eq!(config.backends.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.backends.custom.method, HttpMethod::Get);
        assert_eq!(
            config.backends.custom.supported_languages,
            vec![LanguageCode::En, LanguageCode::ZhCn]
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.backends.openai.model = "gpt-4o".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.backends.openai.model, "gpt-4o");
        assert_eq!(loaded.backends.custom, config.backends.custom);
    }

    #[test]
    fn test_backends_get_and_set() {
        let mut backends = BackendsConfig::default();
        let mut openai = backends.openai.clone();
        openai.api_key = "sk-new".to_string();
        backends.set(BackendConfig::OpenAi(openai));

        match backends.get(BackendType::OpenAi) {
            BackendConfig::OpenAi(c) => assert_eq!(c.api_key, "sk-new"),
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
