//! Shared translation lifecycle wrapped around a backend adapter.
//!
//! `TranslatorCore` owns the initialize/translate/destroy state machine that
//! every backend goes through. The adapter lives behind an async `RwLock`:
//! translations hold a read guard for the duration of the provider call,
//! while `initialize` and `destroy` take the write guard, so an instance is
//! never torn down underneath an in-flight request.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{AdapterRequest, BackendAdapter, BackendConfig, BackendType};
use crate::error::{RelingoError, Result, TranslationFailure, classify_error};
use crate::language::LanguageCode;
use crate::types::{TranslationRequest, TranslationResponse};

const ZERO_WIDTH_CHARS: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslatorState {
    Uninitialized,
    Initialized,
}

struct CoreInner {
    adapter: Box<dyn BackendAdapter>,
    state: TranslatorState,
}

pub struct TranslatorCore {
    backend_type: BackendType,
    display_name: String,
    inner: RwLock<CoreInner>,
}

/// Trim, collapse runs of whitespace and drop zero-width characters
pub fn preprocess_text(text: &str) -> String {
    text.chars()
        .filter(|c| !ZERO_WIDTH_CHARS.contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn postprocess_text(text: &str) -> String {
    text.trim().to_string()
}

/// Language pair used by availability checks: EN to ZH_CN when the backend
/// supports both, otherwise its first two distinct concrete languages
pub fn sample_pair(supported: &[LanguageCode]) -> Option<(LanguageCode, LanguageCode)> {
    if supported.contains(&LanguageCode::En) && supported.contains(&LanguageCode::ZhCn) {
        return Some((LanguageCode::En, LanguageCode::ZhCn));
    }
    let mut concrete = supported.iter().copied().filter(|l| !l.is_auto());
    let from = concrete.next()?;
    let to = concrete.find(|l| *l != from)?;
    Some((from, to))
}

/// Request checks that need no backend: non-empty text, concrete target,
/// distinct source and target
pub fn validate_request_shape(request: &TranslationRequest) -> Result<()> {
    if preprocess_text(&request.text).is_empty() {
        return Err(RelingoError::Validation("Text to translate is empty".to_string()));
    }
    if request.target_lang.is_auto() {
        return Err(RelingoError::Validation(
            "Target language cannot be 'auto'".to_string(),
        ));
    }
    if request.source_lang == request.target_lang {
        return Err(RelingoError::Validation(format!(
            "Source and target language are both '{}'",
            request.target_lang
        )));
    }
    Ok(())
}

/// Check a request against the languages a backend supports
pub fn validate_request(request: &TranslationRequest, supported: &[LanguageCode]) -> Result<()> {
    validate_request_shape(request)?;
    if !request.source_lang.is_auto() && !supported.contains(&request.source_lang) {
        return Err(RelingoError::Validation(format!(
            "Unsupported source language: {}",
            request.source_lang
        )));
    }
    if !supported.contains(&request.target_lang) {
        return Err(RelingoError::Validation(format!(
            "Unsupported target language: {}",
            request.target_lang
        )));
    }
    Ok(())
}

impl TranslatorCore {
    pub fn new(adapter: Box<dyn BackendAdapter>) -> Self {
        Self {
            backend_type: adapter.backend_type(),
            display_name: adapter.display_name().to_string(),
            inner: RwLock::new(CoreInner {
                adapter,
                state: TranslatorState::Uninitialized,
            }),
        }
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub async fn state(&self) -> TranslatorState {
        self.inner.read().await.state
    }

    pub async fn is_initialized(&self) -> bool {
        self.state().await == TranslatorState::Initialized
    }

    pub async fn supported_languages(&self) -> Vec<LanguageCode> {
        self.inner.read().await.adapter.supported_languages()
    }

    pub async fn validate_config(&self) -> Result<()> {
        self.inner.read().await.adapter.validate_config()
    }

    /// Apply `config` (if any), validate it, run the adapter hook and mark the
    /// translator ready. Any failure leaves it uninitialized.
    pub async fn initialize(&self, config: Option<BackendConfig>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.state = TranslatorState::Uninitialized;

        if let Some(config) = config {
            inner.adapter.configure(config)?;
        }
        inner.adapter.validate_config()?;
        inner.adapter.on_initialize().await?;

        inner.state = TranslatorState::Initialized;
        info!("{} translator initialized", self.display_name);
        Ok(())
    }

    /// Run one request through validation, preprocessing, the adapter and postprocessing.
    pub async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse> {
        let inner = self.inner.read().await;
        if inner.state != TranslatorState::Initialized {
            return Err(RelingoError::NotInitialized(format!(
                "{} translator must be initialized before translating",
                self.display_name
            )));
        }

        validate_request(request, &inner.adapter.supported_languages())?;

        let text = preprocess_text(&request.text);
        let adapter_request = AdapterRequest {
            text: &text,
            from: request.source_lang,
            to: request.target_lang,
            max_tokens: request.max_tokens,
        };

        debug!(
            "Translating {} chars {} -> {} via {}",
            text.chars().count(),
            request.source_lang,
            request.target_lang,
            self.backend_type
        );

        match inner.adapter.translate_raw(adapter_request).await {
            Ok(raw) => Ok(TranslationResponse::success(request, postprocess_text(&raw))),
            Err(error) => {
                let code = classify_error(&error);
                warn!("{} translation failed [{}]: {}", self.display_name, code, error);
                Err(RelingoError::Translation(Box::new(TranslationFailure {
                    code,
                    message: error.to_string(),
                    request: request.clone(),
                })))
            }
        }
    }

    /// Round-trip a tiny translation to see whether the backend answers
    pub async fn is_available(&self) -> bool {
        let Some((from, to)) = sample_pair(&self.supported_languages().await) else {
            debug!("{} supports no language pair to check", self.display_name);
            return false;
        };
        let sample = TranslationRequest::new("test", from, to, self.backend_type);
        match self.translate(&sample).await {
            Ok(_) => true,
            Err(e) => {
                debug!("{} availability check failed: {}", self.display_name, e);
                false
            }
        }
    }

    /// Run the adapter cleanup hook and return to the uninitialized state.
    /// Waits for in-flight translations to finish first.
    pub async fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.state = TranslatorState::Uninitialized;
        inner.adapter.on_destroy().await?;
        info!("{} translator destroyed", self.display_name);
        Ok(())
    }
}
