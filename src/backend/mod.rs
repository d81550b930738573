// Pluggable translation backends
//
// Each backend is an adapter that turns a normalized request into a
// provider-specific HTTP call and parses the provider response back into
// plain text. The shared request lifecycle lives in `translator::TranslatorCore`.
//
// To add a new backend:
// 1. Add a variant to BackendType and BackendConfig
// 2. Implement BackendAdapter for the provider
// 3. Register a constructor in BackendRegistry::with_builtin_backends

pub mod common;
pub mod custom;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{CustomApiConfig, OpenAiConfig};
use crate::error::{RelingoError, Result};
use crate::language::LanguageCode;

pub use common::*;
pub use custom::CustomApiAdapter;
pub use openai::OpenAiAdapter;

/// Backend kinds known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendType {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "custom")]
    CustomApi,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::CustomApi => "custom",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = RelingoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "custom" | "custom_api" | "custom-api" => Ok(Self::CustomApi),
            other => Err(RelingoError::Validation(format!("Unknown backend type: '{}'", other))),
        }
    }
}

/// Configuration for one backend, tagged by backend type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    #[serde(rename = "openai")]
    OpenAi(OpenAiConfig),
    #[serde(rename = "custom")]
    CustomApi(CustomApiConfig),
}

impl BackendConfig {
    pub fn backend_type(&self) -> BackendType {
        match self {
            Self::OpenAi(_) => BackendType::OpenAi,
            Self::CustomApi(_) => BackendType::CustomApi,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::OpenAi(c) => c.enabled,
            Self::CustomApi(c) => c.enabled,
        }
    }
}

/// Normalized input handed to an adapter after validation and preprocessing
#[derive(Debug, Clone, Copy)]
pub struct AdapterRequest<'a> {
    pub text: &'a str,
    pub from: LanguageCode,
    pub to: LanguageCode,
    pub max_tokens: Option<u32>,
}

/// Capability set every translation backend implements
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn display_name(&self) -> &str;

    fn supported_languages(&self) -> Vec<LanguageCode>;

    /// Replace the adapter configuration. Fails if the config belongs to another backend.
    fn configure(&mut self, config: BackendConfig) -> Result<()>;

    /// Check credentials, endpoint and numeric ranges of the current configuration
    fn validate_config(&self) -> Result<()>;

    /// Hook run after validation during initialization
    async fn on_initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Perform the provider call and return the raw translated text
    async fn translate_raw(&self, request: AdapterRequest<'_>) -> Result<String>;

    /// Hook run when the translator is destroyed
    async fn on_destroy(&mut self) -> Result<()> {
        Ok(())
    }
}
