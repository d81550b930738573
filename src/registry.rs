//! Backend registry and instance factory.
//!
//! Maps backend types to constructors and owns the live translator
//! instances keyed by instance id. One registry is created per process and
//! shared by reference with the translation service.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{
    BackendAdapter, BackendConfig, BackendType, CustomApiAdapter, OpenAiAdapter,
};
use crate::error::{RelingoError, Result};
use crate::translator::TranslatorCore;

/// Builds an adapter from its configuration
pub type BackendConstructor =
    Arc<dyn Fn(BackendConfig) -> Result<Box<dyn BackendAdapter>> + Send + Sync>;

/// Upper bound for a single availability check
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct BackendRegistration {
    pub backend_type: BackendType,
    pub constructor: BackendConstructor,
    pub display_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub backend_type: BackendType,
    pub display_name: String,
    pub description: String,
}

pub struct BackendRegistry {
    registrations: RwLock<HashMap<BackendType, BackendRegistration>>,
    instances: Mutex<HashMap<String, Arc<TranslatorCore>>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Default instance id: `type_timestamp_random`
pub fn generate_instance_id(backend_type: BackendType) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        backend_type,
        chrono::Utc::now().timestamp_millis(),
        &random[..9]
    )
}

impl BackendRegistry {
    /// Registry without any backends
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the bundled OpenAI and custom HTTP backends
    pub fn with_builtin_backends() -> Self {
        let registry = Self::new();
        registry.register_backend(
            BackendType::OpenAi,
            |config| match config {
                BackendConfig::OpenAi(c) => Ok(Box::new(OpenAiAdapter::new(c)?) as Box<dyn BackendAdapter>),
                other => Err(mismatched_config(BackendType::OpenAi, &other)),
            },
            "OpenAI",
            "Chat-completion translation through the OpenAI API or a compatible endpoint",
        );
        registry.register_backend(
            BackendType::CustomApi,
            |config| match config {
                BackendConfig::CustomApi(c) => Ok(Box::new(CustomApiAdapter::new(c)?) as Box<dyn BackendAdapter>),
                other => Err(mismatched_config(BackendType::CustomApi, &other)),
            },
            "Custom API",
            "Any HTTP translation endpoint described by field mappings and templates",
        );
        registry
    }

    /// Register a constructor for `backend_type`, replacing any previous one.
    pub fn register_backend<F>(
        &self,
        backend_type: BackendType,
        constructor: F,
        display_name: &str,
        description: &str,
    ) where
        F: Fn(BackendConfig) -> Result<Box<dyn BackendAdapter>> + Send + Sync + 'static,
    {
        let registration = BackendRegistration {
            backend_type,
            constructor: Arc::new(constructor),
            display_name: display_name.to_string(),
            description: description.to_string(),
        };

        let mut registrations = self.registrations.write().unwrap_or_else(PoisonError::into_inner);
        if registrations.insert(backend_type, registration).is_some() {
            warn!("Backend {} was already registered, overwriting", backend_type);
        } else {
            info!("Registered backend {} ({})", backend_type, display_name);
        }
    }

    /// Destroy every live instance of `backend_type`, then drop its registration.
    /// Returns whether the backend was registered.
    pub async fn unregister_backend(&self, backend_type: BackendType) -> bool {
        let doomed: Vec<(String, Arc<TranslatorCore>)> = {
            let mut instances = self.instances.lock().await;
            let ids: Vec<String> = instances
                .iter()
                .filter(|(_, core)| core.backend_type() == backend_type)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| instances.remove(&id).map(|core| (id, core)))
                .collect()
        };

        for (id, core) in doomed {
            if let Err(e) = core.destroy().await {
                warn!("Failed to destroy instance {} while unregistering {}: {}", id, backend_type, e);
            }
        }

        let removed = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&backend_type)
            .is_some();
        if removed {
            info!("Unregistered backend {}", backend_type);
        }
        removed
    }

    pub fn is_registered(&self, backend_type: BackendType) -> bool {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&backend_type)
    }

    pub fn registered_backends(&self) -> Vec<BackendInfo> {
        let registrations = self.registrations.read().unwrap_or_else(PoisonError::into_inner);
        let mut backends: Vec<BackendInfo> = registrations
            .values()
            .map(|r| BackendInfo {
                backend_type: r.backend_type,
                display_name: r.display_name.clone(),
                description: r.description.clone(),
            })
            .collect();
        backends.sort_by_key(|b| b.backend_type);
        backends
    }

    fn registration(&self, backend_type: BackendType) -> Option<BackendRegistration> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&backend_type)
            .cloned()
    }

    /// Construct, validate and initialize a new instance of `backend_type`.
    ///
    /// An instance already stored under the same id is destroyed first. Callers
    /// must not race two creations for the same explicit id.
    pub async fn create_instance(
        &self,
        backend_type: BackendType,
        config: BackendConfig,
        instance_id: Option<String>,
    ) -> Result<Arc<TranslatorCore>> {
        let registration = self
            .registration(backend_type)
            .ok_or(RelingoError::NotRegistered(backend_type))?;

        if config.backend_type() != backend_type {
            return Err(mismatched_config(backend_type, &config));
        }

        let adapter = (registration.constructor)(config)?;
        adapter.validate_config().map_err(|e| match e {
            RelingoError::ConfigInvalid(_) => e,
            other => RelingoError::ConfigInvalid(other.to_string()),
        })?;

        let id = instance_id.unwrap_or_else(|| generate_instance_id(backend_type));

        let previous = self.instances.lock().await.remove(&id);
        if let Some(previous) = previous {
            warn!("Instance {} already exists, destroying it before replacement", id);
            if let Err(e) = previous.destroy().await {
                warn!("Failed to destroy replaced instance {}: {}", id, e);
            }
        }

        let core = Arc::new(TranslatorCore::new(adapter));
        core.initialize(None).await?;

        self.instances.lock().await.insert(id.clone(), core.clone());
        info!("Created {} instance {}", backend_type, id);
        Ok(core)
    }

    pub async fn get_instance(&self, instance_id: &str) -> Option<Arc<TranslatorCore>> {
        self.instances.lock().await.get(instance_id).cloned()
    }

    pub async fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove and destroy one instance. Returns whether the id existed.
    pub async fn destroy_instance(&self, instance_id: &str) -> bool {
        let Some(core) = self.instances.lock().await.remove(instance_id) else {
            return false;
        };

        if let Err(e) = core.destroy().await {
            warn!("Failed to destroy instance {}: {}", instance_id, e);
        }
        true
    }

    /// Destroy every instance; one failure does not stop the rest
    pub async fn destroy_all(&self) {
        let drained: Vec<(String, Arc<TranslatorCore>)> =
            self.instances.lock().await.drain().collect();

        let count = drained.len();
        for (id, core) in drained {
            if let Err(e) = core.destroy().await {
                warn!("Failed to destroy instance {}: {}", id, e);
            }
        }
        info!("Destroyed {} backend instances", count);
    }

    /// Live instances that currently answer a sample translation
    pub async fn get_available_instances(&self) -> Vec<(String, Arc<TranslatorCore>)> {
        let snapshot: Vec<(String, Arc<TranslatorCore>)> = self
            .instances
            .lock()
            .await
            .iter()
            .map(|(id, core)| (id.clone(), core.clone()))
            .collect();

        let mut available = Vec::new();
        for (id, core) in snapshot {
            match tokio::time::timeout(AVAILABILITY_TIMEOUT, core.is_available()).await {
                Ok(true) => available.push((id, core)),
                Ok(false) => info!("Instance {} is unavailable", id),
                Err(_) => warn!("Availability check for instance {} timed out, treating as unavailable", id),
            }
        }
        available.sort_by(|a, b| a.0.cmp(&b.0));
        available
    }
}

fn mismatched_config(expected: BackendType, config: &BackendConfig) -> RelingoError {
    RelingoError::ConfigInvalid(format!(
        "Expected {} configuration, got {}",
        expected,
        config.backend_type()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AdapterRequest;
    use crate::config::OpenAiConfig;
    use crate::language::LanguageCode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counters {
        destroyed: Arc<AtomicUsize>,
    }

    struct StubAdapter {
        api_key: String,
        fail_destroy: bool,
        counters: Counters,
    }

    #[async_trait]
    impl BackendAdapter for StubAdapter {
        fn backend_type(&self) -> BackendType {
            BackendType::OpenAi
        }

        fn display_name(&self) -> &str {
            "Stub"
        }

        fn supported_languages(&self) -> Vec<LanguageCode> {
            LanguageCode::ALL.to_vec()
        }

        fn configure(&mut self, _config: BackendConfig) -> Result<()> {
            Ok(())
        }

        fn validate_config(&self) -> Result<()> {
            if self.api_key.is_empty() {
                Err(RelingoError::ConfigInvalid("api key missing".to_string()))
            } else {
                Ok(())
            }
        }

        async fn translate_raw(&self, request: AdapterRequest<'_>) -> Result<String> {
            Ok(request.text.to_uppercase())
        }

        async fn on_destroy(&mut self) -> Result<()> {
            self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                Err(RelingoError::Unknown("destroy failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn registry_with_stub(fail_destroy: bool) -> (BackendRegistry, Counters) {
        let registry = BackendRegistry::new();
        let counters = Counters::default();
        let shared = counters.clone();
        registry.register_backend(
            BackendType::OpenAi,
            move |config| {
                let api_key = match config {
                    BackendConfig::OpenAi(c) => c.api_key,
                    _ => String::new(),
                };
                Ok(Box::new(StubAdapter {
                    api_key,
                    fail_destroy,
                    counters: shared.clone(),
                }) as Box<dyn BackendAdapter>)
            },
            "Stub",
            "test backend",
        );
        (registry, counters)
    }

    fn config(api_key: &str) -> BackendConfig {
        BackendConfig::OpenAi(OpenAiConfig {
            api_key: api_key.to_string(),
            ..OpenAiConfig::default()
        })
    }

    #[tokio::test]
    async fn test_create_unknown_backend_fails() {
        let (registry, _) = registry_with_stub(false);
        let result = registry
            .create_instance(BackendType::CustomApi, BackendConfig::CustomApi(Default::default()), None)
            .await;
        assert!(matches!(result, Err(RelingoError::NotRegistered(BackendType::CustomApi))));
    }

    #[tokio::test]
    async fn test_create_with_invalid_config_fails() {
        let (registry, _) = registry_with_stub(false);
        let result = registry.create_instance(BackendType::OpenAi, config(""), None).await;
        assert!(matches!(result, Err(RelingoError::ConfigInvalid(_))));
        assert!(registry.instance_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_generated_instance_id_format() {
        let (registry, _) = registry_with_stub(false);
        let core = registry.create_instance(BackendType::OpenAi, config("k"), None).await.unwrap();
        assert!(core.is_initialized().await);

        let ids = registry.instance_ids().await;
        assert_eq!(ids.len(), 1);
        let parts: Vec<&str> = ids[0].split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "openai");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }

    #[tokio::test]
    async fn test_same_id_replaces_and_destroys_previous() {
        let (registry, counters) = registry_with_stub(false);
        let first = registry
            .create_instance(BackendType::OpenAi, config("k"), Some("main".to_string()))
            .await
            .unwrap();
        let second = registry
            .create_instance(BackendType::OpenAi, config("k"), Some("main".to_string()))
            .await
            .unwrap();

        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 1);
        assert!(!first.is_initialized().await);
        assert!(second.is_initialized().await);
        assert_eq!(registry.instance_ids().await, vec!["main".to_string()]);
    }

    #[tokio::test]
    async fn test_register_twice_overwrites() {
        let (registry, _) = registry_with_stub(false);
        registry.register_backend(
            BackendType::OpenAi,
            |_| Err(RelingoError::Unknown("replaced".to_string())),
            "Replacement",
            "overwrites the stub",
        );
        let backends = registry.registered_backends();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].display_name, "Replacement");
    }

    #[tokio::test]
    async fn test_unregister_destroys_instances() {
        let (registry, counters) = registry_with_stub(false);
        registry.create_instance(BackendType::OpenAi, config("k"), Some("a".to_string())).await.unwrap();
        registry.create_instance(BackendType::OpenAi, config("k"), Some("b".to_string())).await.unwrap();

        assert!(registry.unregister_backend(BackendType::OpenAi).await);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 2);
        assert!(registry.instance_ids().await.is_empty());
        assert!(!registry.is_registered(BackendType::OpenAi));
        assert!(!registry.unregister_backend(BackendType::OpenAi).await);
    }

    #[tokio::test]
    async fn test_destroy_all_is_best_effort() {
        let (registry, counters) = registry_with_stub(true);
        for id in ["a", "b", "c"] {
            registry.create_instance(BackendType::OpenAi, config("k"), Some(id.to_string())).await.unwrap();
        }

        registry.destroy_all().await;
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 3);
        assert!(registry.instance_ids().await.is_empty());
        assert!(!registry.destroy_instance("a").await);
    }

    #[tokio::test]
    async fn test_available_instances_skip_uninitialized() {
        let (registry, _) = registry_with_stub(false);
        let a = registry.create_instance(BackendType::OpenAi, config("k"), Some("a".to_string())).await.unwrap();
        registry.create_instance(BackendType::OpenAi, config("k"), Some("b".to_string())).await.unwrap();
        a.destroy().await.unwrap();

        let available = registry.get_available_instances().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].0, "b");
    }

    #[test]
    fn test_builtin_backends_registered() {
        let registry = BackendRegistry::with_builtin_backends();
        assert!(registry.is_registered(BackendType::OpenAi));
        assert!(registry.is_registered(BackendType::CustomApi));
    }
}
