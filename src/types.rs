use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::BackendType;
use crate::error::{ErrorCode, RelingoError};
use crate::language::LanguageCode;

/// A single translation request handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    pub backend_type: BackendType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
        backend_type: BackendType,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang,
            target_lang,
            backend_type,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    Success,
    Error,
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    pub backend_type: BackendType,
    pub status: TranslationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub timestamp: DateTime<Utc>,
}

impl TranslationResponse {
    pub fn success(request: &TranslationRequest, translated_text: impl Into<String>) -> Self {
        Self {
            original_text: request.text.clone(),
            translated_text: translated_text.into(),
            source_lang: request.source_lang,
            target_lang: request.target_lang,
            backend_type: request.backend_type,
            status: TranslationStatus::Success,
            error: None,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    /// Error placeholder carrying the failure message; `translated_text` stays empty.
    pub fn failure(request: &TranslationRequest, error: &RelingoError) -> Self {
        Self {
            original_text: request.text.clone(),
            translated_text: String::new(),
            source_lang: request.source_lang,
            target_lang: request.target_lang,
            backend_type: request.backend_type,
            status: TranslationStatus::Error,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TranslationStatus::Success
    }
}
