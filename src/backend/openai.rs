// Chat-completion backend (OpenAI and compatible APIs)

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::{RelingoError, Result, TransportError};
use crate::language::LanguageCode;
use crate::transport::HttpTransport;
use super::{AdapterRequest, BackendAdapter, BackendConfig, BackendType, common};

/// Prefixes models like to put in front of the answer
const RESPONSE_PREFIXES: &[&str] = &[
    "translation:",
    "translated text:",
    "translation result:",
    "翻译：",
    "翻译:",
    "译文：",
    "译文:",
];

const DELIMITER_TAGS: &[&str] = &["<text>", "</text>", "<translation>", "</translation>"];

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('「', '」'), ('『', '』')];

pub struct OpenAiAdapter {
    config: OpenAiConfig,
    transport: HttpTransport,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Ok(Self {
            config,
            transport: HttpTransport::new()?,
        })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Fixed instruction template embedding the target language and the literal input
    pub fn build_prompt(text: &str, to: LanguageCode) -> String {
        format!(
            "You are a professional translator.\n\
             Translate the text inside the <text> tags into {} ({}).\n\
             Return ONLY the translation. Do not add explanations, notes, quotes or the tags.\n\
             \n\
             <text>\n{}\n</text>",
            to.name(),
            to.code(),
            text
        )
    }

    fn build_body(&self, prompt: String, max_tokens: Option<u32>) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature,
            "max_tokens": max_tokens.unwrap_or(self.config.max_tokens),
            "top_p": 1.0,
            "frequency_penalty": 0.0,
            "presence_penalty": 0.0,
            "stream": false
        })
    }

    /// Strip wrapper artifacts the model adds around the translation
    pub fn clean_response(content: &str) -> String {
        let mut text = content.trim().to_string();

        if text.starts_with("```") {
            text = text
                .lines()
                .filter(|line| !line.trim_start().starts_with("```"))
                .collect::<Vec<_>>()
                .join("\n");
        }

        for tag in DELIMITER_TAGS {
            text = text.replace(tag, "");
        }
        text = text.trim().to_string();

        let prefix = RESPONSE_PREFIXES.iter().find(|prefix| {
            text.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        });
        if let Some(prefix) = prefix {
            text = text[prefix.len()..].trim().to_string();
        }

        for (open, close) in QUOTE_PAIRS {
            if text.chars().count() >= 2 && text.starts_with(*open) && text.ends_with(*close) {
                let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
                // `"A" and "B"` is quoted content, not one quoted answer
                if !inner.contains(*close) && !inner.contains(*open) {
                    text = inner.trim().to_string();
                }
                break;
            }
        }

        text
    }

    fn describe_error(&self, error: TransportError) -> RelingoError {
        let provider_message = error
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str::<Value>(body).ok())
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| error.body.clone().unwrap_or_default());

        let message = match error.status {
            Some(401) => format!("Invalid OpenAI API key (401): {}", provider_message),
            Some(403) => format!("OpenAI API key unauthorized for this resource (403): {}", provider_message),
            Some(429) if provider_message.to_lowercase().contains("quota") => {
                format!("OpenAI quota exceeded: {}", provider_message)
            }
            Some(429) => format!("OpenAI rate limit exceeded: {}", provider_message),
            Some(status) if status >= 500 => {
                format!("OpenAI service error {} after {} attempts", status, error.attempts)
            }
            Some(status) => format!("OpenAI API error {}: {}", status, provider_message),
            None => format!("Network error contacting OpenAI: {}", error.message),
        };

        common::backend_error(BackendType::OpenAi, message)
    }
}

#[async_trait]
impl BackendAdapter for OpenAiAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::OpenAi
    }

    fn display_name(&self) -> &str {
        "OpenAI"
    }

    fn supported_languages(&self) -> Vec<LanguageCode> {
        LanguageCode::ALL.to_vec()
    }

    fn configure(&mut self, config: BackendConfig) -> Result<()> {
        match config {
            BackendConfig::OpenAi(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(RelingoError::ConfigInvalid(format!(
                "OpenAI backend cannot use {} configuration",
                other.backend_type()
            ))),
        }
    }

    fn validate_config(&self) -> Result<()> {
        let config = &self.config;
        if config.api_key.trim().is_empty() {
            return Err(RelingoError::ConfigInvalid("OpenAI API key is required".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(RelingoError::ConfigInvalid("OpenAI model must not be empty".to_string()));
        }
        common::validate_url("base_url", &config.base_url)?;
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(RelingoError::ConfigInvalid(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                config.temperature
            )));
        }
        if config.max_tokens == 0 || config.max_tokens > 32_000 {
            return Err(RelingoError::ConfigInvalid(format!(
                "max_tokens must be between 1 and 32000, got {}",
                config.max_tokens
            )));
        }
        common::validate_timing(config.timeout_secs, config.retry_count)
    }

    async fn translate_raw(&self, request: AdapterRequest<'_>) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let prompt = Self::build_prompt(request.text, request.to);

        let mut options = common::request_options(
            self.config.timeout_secs,
            self.config.retry_count,
            self.config.retry_delay_ms,
        )
        .header("Authorization", format!("Bearer {}", self.config.api_key));
        options.body = Some(self.build_body(prompt, request.max_tokens));

        debug!("Sending translation request to: {}", url);

        let response = self
            .transport
            .send(&url, &options)
            .await
            .map_err(|e| self.describe_error(e))?;

        let content = response.data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                common::backend_error(
                    BackendType::OpenAi,
                    format!("Invalid response format from OpenAI: {}", response.data),
                )
            })?;

        debug!("Raw OpenAI response: {}", content);

        let cleaned = Self::clean_response(content);
        if cleaned.is_empty() {
            return Err(common::backend_error(BackendType::OpenAi, "Empty translation received"));
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(api_key: &str) -> OpenAiAdapter {
        OpenAiAdapter::new(OpenAiConfig {
            api_key: api_key.to_string(),
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_prompt_embeds_language_and_text() {
        let prompt = OpenAiAdapter::build_prompt("Hello there", LanguageCode::ZhCn);
        assert!(prompt.contains("Simplified Chinese (zh-CN)"));
        assert!(prompt.contains("<text>\nHello there\n</text>"));
    }

    #[test]
    fn test_clean_response_strips_artifacts() {
        assert_eq!(OpenAiAdapter::clean_response("  \"你好\"  "), "你好");
        assert_eq!(OpenAiAdapter::clean_response("Translation: Bonjour"), "Bonjour");
        assert_eq!(OpenAiAdapter::clean_response("译文：你好世界"), "你好世界");
        assert_eq!(OpenAiAdapter::clean_response("<text>\nHallo\n</text>"), "Hallo");
        assert_eq!(OpenAiAdapter::clean_response("```\nこんにちは\n```"), "こんにちは");
        assert_eq!(OpenAiAdapter::clean_response("「こんにちは」"), "こんにちは");
        assert_eq!(OpenAiAdapter::clean_response("Plain text"), "Plain text");
    }

    #[test]
    fn test_clean_response_keeps_inner_quotes() {
        assert_eq!(OpenAiAdapter::clean_response("\"A\" and \"B\""), "\"A\" and \"B\"");
        assert_eq!(OpenAiAdapter::clean_response("「甲」と「乙」"), "「甲」と「乙」");
        assert_eq!(OpenAiAdapter::clean_response("'it''s'"), "'it''s'");
    }

    #[test]
    fn test_validate_config() {
        assert!(adapter("sk-test").validate_config().is_ok());
        assert!(matches!(
            adapter("").validate_config(),
            Err(RelingoError::ConfigInvalid(_))
        ));

        let mut bad = adapter("sk-test");
        bad.config.temperature = 3.0;
        assert!(bad.validate_config().is_err());

        let mut bad = adapter("sk-test");
        bad.config.model = " ".to_string();
        assert!(bad.validate_config().is_err());
    }

    #[test]
    fn test_configure_rejects_other_backend() {
        let mut adapter = adapter("sk-test");
        let result = adapter.configure(BackendConfig::CustomApi(Default::default()));
        assert!(matches!(result, Err(RelingoError::ConfigInvalid(_))));

        let updated = OpenAiConfig {
            api_key: "sk-other".to_string(),
            ..OpenAiConfig::default()
        };
        adapter.configure(BackendConfig::OpenAi(updated)).unwrap();
        assert_eq!(adapter.config().api_key, "sk-other");
    }

    #[test]
    fn test_describe_error_classification() {
        let adapter = adapter("sk-test");
        let err = |status: Option<u16>, body: &str| TransportError {
            message: "failed".to_string(),
            status,
            body: Some(body.to_string()),
            attempts: 1,
        };

        let quota = adapter.describe_error(err(
            Some(429),
            r#"{"error":{"message":"You exceeded your current quota"}}"#,
        ));
        assert!(quota.to_string().contains("quota exceeded"));
        assert_eq!(quota.code(), crate::error::ErrorCode::QuotaExceeded);

        let auth = adapter.describe_error(err(Some(401), "{}"));
        assert_eq!(auth.code(), crate::error::ErrorCode::InvalidApiKey);

        let network = adapter.describe_error(err(None, ""));
        assert_eq!(network.code(), crate::error::ErrorCode::NetworkError);
    }
}
