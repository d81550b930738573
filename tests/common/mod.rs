#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relingo::backend::{AdapterRequest, BackendAdapter};
use relingo::config::Config;
use relingo::error::{RelingoError, Result};
use relingo::{BackendConfig, BackendRegistry, BackendType, LanguageCode, MemoryStorage, Storage, TranslationService};

/// Scripted backend used by the integration tests
#[derive(Clone)]
pub struct StubBackend {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
    /// Any text containing this marker fails with a network-style error
    pub fail_on: Option<String>,
    pub supported: Vec<LanguageCode>,
    pub dictionary: HashMap<String, String>,
}

impl Default for StubBackend {
    fn default() -> Self {
        let dictionary = [("Hello", "你好"), ("Goodbye", "再见"), ("Thanks", "谢谢")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            fail_on: None,
            supported: vec![LanguageCode::En, LanguageCode::ZhCn, LanguageCode::Ja],
            dictionary,
        }
    }
}

impl StubBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }
}

#[async_trait]
impl BackendAdapter for StubBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::OpenAi
    }

    fn display_name(&self) -> &str {
        "Stub"
    }

    fn supported_languages(&self) -> Vec<LanguageCode> {
        self.supported.clone()
    }

    fn configure(&mut self, _config: BackendConfig) -> Result<()> {
        Ok(())
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    async fn translate_raw(&self, request: AdapterRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(marker) = &self.fail_on {
            if request.text.contains(marker.as_str()) {
                return Err(RelingoError::Unknown("network connection reset".to_string()));
            }
        }
        Ok(self
            .dictionary
            .get(request.text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", request.to.code(), request.text)))
    }
}

/// Registry with `stub` registered as the OpenAI backend
pub fn stub_registry(stub: &StubBackend) -> Arc<BackendRegistry> {
    let registry = BackendRegistry::new();
    let stub = stub.clone();
    registry.register_backend(
        BackendType::OpenAi,
        move |_| Ok(Box::new(stub.clone()) as Box<dyn BackendAdapter>),
        "Stub",
        "scripted test backend",
    );
    Arc::new(registry)
}

pub fn stub_service(stub: &StubBackend) -> TranslationService {
    stub_service_with(stub, Config::default(), Arc::new(MemoryStorage::new()))
}

pub fn stub_service_with(stub: &StubBackend, config: Config, storage: Arc<dyn Storage>) -> TranslationService {
    TranslationService::new(config, stub_registry(stub), storage)
}
