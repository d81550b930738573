// Translation orchestration service
//
// Public entry point of the engine. Every single-shot translation goes
// through the cache, a single-flight map keyed by request fingerprint, and a
// lazily created backend instance from the registry. Batch jobs run as
// spawned tasks that callers poll for progress.

pub mod batch;
pub mod cache;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub use batch::{BatchError, BatchStatus, BatchTask, CANCELLED_MESSAGE};
pub use cache::{CacheEntry, HistoryEntry, TranslationCache, TranslationHistory, fingerprint};

use crate::backend::{BackendConfig, BackendType};
use crate::config::Config;
use crate::error::{RelingoError, Result};
use crate::language::LanguageCode;
use crate::registry::{BackendRegistry, generate_instance_id};
use crate::storage::{CACHE_DOCUMENT, HISTORY_DOCUMENT, SETTINGS_DOCUMENT, Storage};
use crate::translator::{TranslatorCore, validate_request_shape};
use crate::types::{TranslationRequest, TranslationResponse};
use batch::BatchEntry;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type InFlight = Arc<OnceCell<TranslationResponse>>;

pub(crate) struct ServiceInner {
    config: RwLock<Config>,
    registry: Arc<BackendRegistry>,
    storage: Arc<dyn Storage>,
    cache: Mutex<TranslationCache>,
    history: Mutex<TranslationHistory>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    instances: tokio::sync::Mutex<HashMap<BackendType, (String, Arc<TranslatorCore>)>>,
    batches: Mutex<HashMap<String, BatchEntry>>,
    // Snapshot and write happen under this lock so the newest snapshot lands last
    persist_lock: tokio::sync::Mutex<()>,
}

/// Cheap to clone; clones share the same state
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<ServiceInner>,
}

impl TranslationService {
    pub fn new(config: Config, registry: Arc<BackendRegistry>, storage: Arc<dyn Storage>) -> Self {
        let cache = TranslationCache::new(config.service.max_cache_size);
        let history = TranslationHistory::new(config.service.max_history_size);

        Self {
            inner: Arc::new(ServiceInner {
                config: RwLock::new(config),
                registry,
                storage,
                cache: Mutex::new(cache),
                history: Mutex::new(history),
                in_flight: Mutex::new(HashMap::new()),
                instances: tokio::sync::Mutex::new(HashMap::new()),
                batches: Mutex::new(HashMap::new()),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.inner.registry
    }

    /// Load the persisted cache and history. Missing documents start empty;
    /// unreadable ones are logged and ignored.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;

        match inner.load_document::<Vec<CacheEntry>>(CACHE_DOCUMENT).await {
            Some(entries) => {
                let mut cache = lock(&inner.cache);
                cache.load(entries);
                info!("Loaded {} cached translations", cache.len());
            }
            None => debug!("No translation cache to load"),
        }

        match inner.load_document::<Vec<HistoryEntry>>(HISTORY_DOCUMENT).await {
            Some(entries) => {
                let mut history = lock(&inner.history);
                history.load(entries);
                info!("Loaded {} history entries", history.len());
            }
            None => debug!("No translation history to load"),
        }

        Ok(())
    }

    /// Cancel unfinished batches, persist state and destroy backend instances
    pub async fn destroy(&self) {
        let cancelled = {
            let mut batches = lock(&self.inner.batches);
            batches.values_mut().map(BatchEntry::cancel).filter(|c| *c).count()
        };
        if cancelled > 0 {
            info!("Cancelled {} running batch tasks", cancelled);
        }

        self.inner.persist_cache().await;
        self.inner.persist_history().await;

        self.inner.instances.lock().await.clear();
        self.inner.registry.destroy_all().await;
        info!("Translation service destroyed");
    }

    /// Translate one request. Failures come back as `status = error` responses.
    pub async fn translate_text(&self, request: TranslationRequest) -> TranslationResponse {
        self.inner.translate_text(request).await
    }

    /// Translate requests one after another; each failure stays in its own slot
    pub async fn batch_translate(&self, requests: Vec<TranslationRequest>) -> Vec<TranslationResponse> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.inner.translate_text(request).await);
        }
        responses
    }

    /// Start a background batch job and return its task id immediately
    pub fn start_batch_translation(
        &self,
        texts: Vec<String>,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
        backend_type: BackendType,
    ) -> String {
        let task_id = format!("batch_{}", uuid::Uuid::new_v4().simple());
        let task = BatchTask::new(task_id.clone(), texts, source_lang, target_lang, backend_type);
        info!("Queued batch {} with {} chunks", task_id, task.texts.len());

        lock(&self.inner.batches).insert(task_id.clone(), BatchEntry::new(task));
        tokio::spawn(batch::execute_batch(self.inner.clone(), task_id.clone()));

        task_id
    }

    /// Snapshot of a batch task
    pub fn get_batch_progress(&self, task_id: &str) -> Option<BatchTask> {
        self.inner.with_batch(task_id, |entry| entry.task.clone())
    }

    /// Request cancellation. Returns false for unknown or finished tasks.
    pub fn cancel_batch_translation(&self, task_id: &str) -> bool {
        let cancelled = self.inner.with_batch(task_id, |entry| entry.cancel()).unwrap_or(false);
        if cancelled {
            info!("Batch {} cancelled", task_id);
        }
        cancelled
    }

    /// Poll a batch task until it completes or fails
    pub async fn wait_for_batch(&self, task_id: &str) -> Result<BatchTask> {
        let interval = Duration::from_millis(self.settings().service.batch_poll_interval_ms.max(1));
        loop {
            let task = self
                .get_batch_progress(task_id)
                .ok_or_else(|| RelingoError::TaskNotFound(task_id.to_string()))?;
            if task.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Drop completed and failed tasks. Returns how many were removed.
    pub fn clear_finished_batches(&self) -> usize {
        let mut batches = lock(&self.inner.batches);
        let before = batches.len();
        batches.retain(|_, entry| !entry.task.is_terminal());
        before - batches.len()
    }

    pub async fn clear_cache(&self) {
        lock(&self.inner.cache).clear();
        self.inner.persist_cache().await;
        info!("Translation cache cleared");
    }

    pub async fn clear_history(&self) {
        lock(&self.inner.history).clear();
        self.inner.persist_history().await;
        info!("Translation history cleared");
    }

    /// Up to `limit` history entries, newest first
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        lock(&self.inner.history).recent(limit)
    }

    pub fn cache_len(&self) -> usize {
        lock(&self.inner.cache).len()
    }

    pub fn settings(&self) -> Config {
        self.inner.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Persist the settings, then apply them and drop instances whose backend config changed.
    /// A failed write leaves the live settings untouched.
    pub async fn save_settings(&self, config: Config) -> Result<()> {
        let contents = serde_json::to_string_pretty(&config)?;
        self.inner.storage.write(SETTINGS_DOCUMENT, &contents).await?;
        self.inner.apply_settings(config).await;
        Ok(())
    }

    /// Load persisted settings, if any, and apply them
    pub async fn load_settings(&self) -> Result<Config> {
        if let Some(config) = self.inner.load_document::<Config>(SETTINGS_DOCUMENT).await {
            self.inner.apply_settings(config).await;
        }
        Ok(self.settings())
    }

    /// Replace one backend's config; its live instance is recreated on next use
    pub async fn update_backend_config(&self, config: BackendConfig) -> Result<()> {
        let mut settings = self.settings();
        settings.backends.set(config);
        self.save_settings(settings).await
    }
}

impl ServiceInner {
    fn settings(&self) -> Config {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn with_batch<R>(&self, task_id: &str, f: impl FnOnce(&mut BatchEntry) -> R) -> Option<R> {
        lock(&self.batches).get_mut(task_id).map(f)
    }

    fn backend_config(&self, backend_type: BackendType) -> Result<BackendConfig> {
        let config = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .backends
            .get(backend_type);
        if !config.enabled() {
            return Err(RelingoError::ConfigInvalid(format!(
                "Backend {} is disabled",
                backend_type
            )));
        }
        Ok(config)
    }

    /// Live instance for `backend_type`, created through the registry on first use
    pub(crate) async fn backend_instance(&self, backend_type: BackendType) -> Result<Arc<TranslatorCore>> {
        let mut instances = self.instances.lock().await;
        if let Some((_, core)) = instances.get(&backend_type) {
            if core.is_initialized().await {
                return Ok(core.clone());
            }
        }

        let config = self.backend_config(backend_type)?;
        let instance_id = generate_instance_id(backend_type);
        let core = self
            .registry
            .create_instance(backend_type, config, Some(instance_id.clone()))
            .await?;

        if let Some((old_id, _)) = instances.insert(backend_type, (instance_id, core.clone())) {
            self.registry.destroy_instance(&old_id).await;
        }
        Ok(core)
    }

    async fn translate_text(&self, request: TranslationRequest) -> TranslationResponse {
        if let Err(e) = validate_request_shape(&request) {
            debug!("Rejected request: {}", e);
            return TranslationResponse::failure(&request, &e);
        }

        let key = fingerprint(&request);

        if let Some(response) = self.cached_response(&key) {
            debug!("Cache hit for {}", &key[..12]);
            return response;
        }

        let cell = lock(&self.in_flight)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let response = cell
            .get_or_init(|| async {
                match self.backend_instance(request.backend_type).await {
                    Ok(instance) => self.translate_on(&instance, &request).await,
                    Err(e) => {
                        warn!("No {} backend available: {}", request.backend_type, e);
                        TranslationResponse::failure(&request, &e)
                    }
                }
            })
            .await
            .clone();

        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            in_flight.remove(&key);
        }

        response
    }

    /// Translate on a given instance, consulting and filling the cache and history
    pub(crate) async fn translate_on(
        &self,
        instance: &TranslatorCore,
        request: &TranslationRequest,
    ) -> TranslationResponse {
        let key = fingerprint(request);
        if let Some(response) = self.cached_response(&key) {
            return response;
        }

        match instance.translate(request).await {
            Ok(response) => {
                self.record_success(key, &response).await;
                response
            }
            Err(e) => {
                warn!("Translation via {} failed: {}", request.backend_type, e);
                TranslationResponse::failure(request, &e)
            }
        }
    }

    fn cached_response(&self, key: &str) -> Option<TranslationResponse> {
        if !self.settings().service.cache_enabled {
            return None;
        }
        lock(&self.cache).get(key).map(CacheEntry::to_response)
    }

    async fn record_success(&self, key: String, response: &TranslationResponse) {
        let service = self.settings().service;

        if service.cache_enabled {
            let inserted = lock(&self.cache).insert(CacheEntry::from_response(key, response));
            if inserted {
                self.persist_cache().await;
            }
        }

        if service.history_enabled {
            lock(&self.history).push(HistoryEntry::from_response(response));
            self.persist_history().await;
        }
    }

    async fn persist_cache(&self) {
        let _guard = self.persist_lock.lock().await;
        let entries = lock(&self.cache).entries();
        self.persist(CACHE_DOCUMENT, &entries).await;
    }

    async fn persist_history(&self) {
        let _guard = self.persist_lock.lock().await;
        let entries = lock(&self.history).entries();
        self.persist(HISTORY_DOCUMENT, &entries).await;
    }

    async fn persist<T: serde::Serialize>(&self, name: &str, value: &T) {
        let contents = match serde_json::to_string(value) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to serialize {}: {}", name, e);
                return;
            }
        };
        if let Err(e) = self.storage.write(name, &contents).await {
            warn!("Failed to persist {}: {}", name, e);
        }
    }

    async fn load_document<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let contents = match self.storage.read(name).await {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", name, e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", name, e);
                None
            }
        }
    }

    async fn apply_settings(&self, config: Config) {
        let previous = {
            let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, config.clone())
        };

        if previous.service.max_cache_size != config.service.max_cache_size {
            let mut cache = lock(&self.cache);
            let entries = cache.entries();
            *cache = TranslationCache::new(config.service.max_cache_size);
            cache.load(entries);
        }
        if previous.service.max_history_size != config.service.max_history_size {
            let mut history = lock(&self.history);
            let entries = history.entries();
            *history = TranslationHistory::new(config.service.max_history_size);
            history.load(entries);
        }

        let changed: Vec<BackendType> = [BackendType::OpenAi, BackendType::CustomApi]
            .into_iter()
            .filter(|t| previous.backends.get(*t) != config.backends.get(*t))
            .collect();

        let stale: Vec<String> = {
            let mut instances = self.instances.lock().await;
            changed
                .iter()
                .filter_map(|t| instances.remove(t).map(|(id, _)| id))
                .collect()
        };
        for id in stale {
            self.registry.destroy_instance(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AdapterRequest, BackendAdapter};
    use crate::config::OpenAiConfig;
    use crate::error::ErrorCode;
    use crate::storage::{MemoryStorage, MockStorage};
    use async_trait::async_trait;

    struct UpperAdapter;

    #[async_trait]
    impl BackendAdapter for UpperAdapter {
        fn backend_type(&self) -> BackendType {
            BackendType::OpenAi
        }

        fn display_name(&self) -> &str {
            "Upper"
        }

        fn supported_languages(&self) -> Vec<LanguageCode> {
            LanguageCode::ALL.to_vec()
        }

        fn configure(&mut self, _config: BackendConfig) -> Result<()> {
            Ok(())
        }

        fn validate_config(&self) -> Result<()> {
            Ok(())
        }

        async fn translate_raw(&self, request: AdapterRequest<'_>) -> Result<String> {
            Ok(request.text.to_uppercase())
        }
    }

    fn registry() -> Arc<BackendRegistry> {
        let registry = BackendRegistry::new();
        registry.register_backend(
            BackendType::OpenAi,
            |_| Ok(Box::new(UpperAdapter) as Box<dyn BackendAdapter>),
            "Upper",
            "uppercases text",
        );
        Arc::new(registry)
    }

    fn request(text: &str) -> TranslationRequest {
        TranslationRequest::new(text, LanguageCode::En, LanguageCode::Fr, BackendType::OpenAi)
    }

    #[tokio::test]
    async fn test_persistence_failures_do_not_fail_translation() {
        let mut storage = MockStorage::new();
        storage
            .expect_write()
            .returning(|_, _| Err(RelingoError::Storage("disk full".to_string())));

        let service = TranslationService::new(Config::default(), registry(), Arc::new(storage));
        let response = service.translate_text(request("hello")).await;

        assert!(response.is_success());
        assert_eq!(response.translated_text, "HELLO");
        assert_eq!(service.cache_len(), 1);
        assert_eq!(service.history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_treats_missing_documents_as_empty() {
        let mut storage = MockStorage::new();
        storage.expect_read().returning(|_| Ok(None));

        let service = TranslationService::new(Config::default(), registry(), Arc::new(storage));
        service.initialize().await.unwrap();
        assert_eq!(service.cache_len(), 0);
        assert!(service.history(10).is_empty());
    }

    #[tokio::test]
    async fn test_disabled_backend_returns_error_response() {
        let mut config = Config::default();
        config.backends.openai.enabled = false;
        let service = TranslationService::new(config, registry(), Arc::new(MemoryStorage::new()));

        let response = service.translate_text(request("hello")).await;
        assert!(!response.is_success());
        assert!(response.error.unwrap().contains("disabled"));
        assert!(response.translated_text.is_empty());
    }

    #[tokio::test]
    async fn test_update_backend_config_recreates_instance() {
        let service = TranslationService::new(Config::default(), registry(), Arc::new(MemoryStorage::new()));
        service.translate_text(request("one")).await;
        let before = service.registry().instance_ids().await;
        assert_eq!(before.len(), 1);

        service
            .update_backend_config(BackendConfig::OpenAi(OpenAiConfig {
                model: "gpt-4o".to_string(),
                ..OpenAiConfig::default()
            }))
            .await
            .unwrap();
        assert!(service.registry().instance_ids().await.is_empty());
        assert_eq!(service.settings().backends.openai.model, "gpt-4o");

        service.translate_text(request("two")).await;
        let after = service.registry().instance_ids().await;
        assert_eq!(after.len(), 1);
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_malformed_requests_fail_validation_before_backend_lookup() {
        // Default settings carry no API keys, so any backend lookup would fail differently
        let registry = Arc::new(BackendRegistry::with_builtin_backends());
        let service = TranslationService::new(Config::default(), registry, Arc::new(MemoryStorage::new()));

        let cases = [
            TranslationRequest::new("   ", LanguageCode::Auto, LanguageCode::ZhCn, BackendType::OpenAi),
            TranslationRequest::new("hello", LanguageCode::En, LanguageCode::Auto, BackendType::OpenAi),
            TranslationRequest::new("hello", LanguageCode::En, LanguageCode::En, BackendType::CustomApi),
        ];
        for request in cases {
            let response = service.translate_text(request).await;
            assert!(!response.is_success());
            assert_eq!(response.error_code, Some(ErrorCode::UnknownError));
            assert!(response.error.unwrap().starts_with("Validation error"));
        }

        assert!(service.registry().instance_ids().await.is_empty());
        assert_eq!(service.cache_len(), 0);
        assert!(service.history(10).is_empty());
    }

    #[tokio::test]
    async fn test_failed_settings_write_keeps_live_settings() {
        let mut storage = MockStorage::new();
        storage
            .expect_write()
            .returning(|_, _| Err(RelingoError::Storage("read-only volume".to_string())));

        let service = TranslationService::new(Config::default(), registry(), Arc::new(storage));
        assert!(service.translate_text(request("one")).await.is_success());
        let before = service.registry().instance_ids().await;

        let result = service
            .update_backend_config(BackendConfig::OpenAi(OpenAiConfig {
                model: "gpt-4o".to_string(),
                ..OpenAiConfig::default()
            }))
            .await;

        assert!(result.is_err());
        assert_eq!(service.settings().backends.openai.model, OpenAiConfig::default().model);
        assert_eq!(service.registry().instance_ids().await, before);
    }
}
