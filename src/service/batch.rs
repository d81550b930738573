use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::BackendType;
use crate::language::LanguageCode;
use crate::types::{TranslationRequest, TranslationResponse};
use super::ServiceInner;

/// Message recorded when the caller cancels a running batch
pub const CANCELLED_MESSAGE: &str = "Batch translation cancelled by caller";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    /// Chunk the error belongs to, absent for task-level failures
    pub index: Option<usize>,
    pub message: String,
}

/// Snapshot of a batch job. `results[i]` always belongs to `texts[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    pub id: String,
    pub texts: Vec<String>,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    pub backend_type: BackendType,
    /// Percentage of processed chunks, 0 - 100
    pub progress: u8,
    pub status: BatchStatus,
    pub results: Vec<TranslationResponse>,
    pub errors: Vec<BatchError>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchTask {
    pub fn new(
        id: String,
        texts: Vec<String>,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
        backend_type: BackendType,
    ) -> Self {
        Self {
            id,
            texts,
            source_lang,
            target_lang,
            backend_type,
            progress: 0,
            status: BatchStatus::Pending,
            results: Vec::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BatchStatus::Completed | BatchStatus::Failed)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    fn finish(&mut self, status: BatchStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    fn record(&mut self, index: usize, response: TranslationResponse) {
        if let Some(error) = &response.error {
            self.errors.push(BatchError {
                index: Some(index),
                message: error.clone(),
            });
        }
        self.results.push(response);

        let total = self.texts.len().max(1);
        self.progress = ((self.results.len() * 100) / total).min(100) as u8;
    }
}

/// A task plus the token its execution loop checks between chunks
pub(crate) struct BatchEntry {
    pub(crate) task: BatchTask,
    pub(crate) cancel_token: CancellationToken,
}

impl BatchEntry {
    pub(crate) fn new(task: BatchTask) -> Self {
        Self {
            task,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Flag the task and mark it failed. Returns false for finished tasks.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.task.is_terminal() {
            return false;
        }
        self.cancel_token.cancel();
        self.task.errors.push(BatchError {
            index: None,
            message: CANCELLED_MESSAGE.to_string(),
        });
        self.task.finish(BatchStatus::Failed);
        true
    }
}

/// Drive one batch task to completion.
///
/// Chunks run strictly in order on one shared backend instance. A failing
/// chunk leaves an error placeholder at its index and the loop moves on;
/// cancellation is checked before each chunk, so a chunk already in flight
/// still completes and is recorded.
pub(crate) async fn execute_batch(inner: Arc<ServiceInner>, task_id: String) {
    let Some((texts, source_lang, target_lang, backend_type, cancel_token)) =
        inner.with_batch(&task_id, |entry| {
            if entry.cancel_token.is_cancelled() || entry.task.is_terminal() {
                return None;
            }
            entry.task.status = BatchStatus::Running;
            let task = &entry.task;
            Some((
                task.texts.clone(),
                task.source_lang,
                task.target_lang,
                task.backend_type,
                entry.cancel_token.clone(),
            ))
        })
        .flatten()
    else {
        return;
    };

    info!("Batch {} started: {} chunks via {}", task_id, texts.len(), backend_type);

    let mut instance = match inner.backend_instance(backend_type).await {
        Ok(instance) => instance,
        Err(e) => {
            warn!("Batch {} could not obtain a {} instance: {}", task_id, backend_type, e);
            inner.with_batch(&task_id, |entry| {
                if !entry.task.is_terminal() {
                    entry.task.errors.push(BatchError {
                        index: None,
                        message: e.to_string(),
                    });
                    entry.task.finish(BatchStatus::Failed);
                }
            });
            return;
        }
    };

    for (index, text) in texts.into_iter().enumerate() {
        if cancel_token.is_cancelled() {
            info!("Batch {} cancelled before chunk {}", task_id, index + 1);
            return;
        }

        let request = TranslationRequest::new(text, source_lang, target_lang, backend_type);
        let mut response = inner.translate_on(&instance, &request).await;
        if !response.is_success() && !instance.is_initialized().await {
            // The shared instance was torn down mid-batch (settings change)
            info!("Batch {} re-acquiring its {} instance", task_id, backend_type);
            response = match inner.backend_instance(backend_type).await {
                Ok(fresh) => {
                    instance = fresh;
                    inner.translate_on(&instance, &request).await
                }
                Err(e) => TranslationResponse::failure(&request, &e),
            };
        }
        if !response.is_success() {
            warn!(
                "Batch {} chunk {} failed: {}",
                task_id,
                index + 1,
                response.error.as_deref().unwrap_or_default()
            );
        }

        inner.with_batch(&task_id, |entry| entry.task.record(index, response));
    }

    inner.with_batch(&task_id, |entry| {
        if !entry.task.is_terminal() {
            entry.task.progress = 100;
            entry.task.finish(BatchStatus::Completed);
            info!(
                "Batch {} completed: {} chunks, {} failed",
                task_id,
                entry.task.results.len(),
                entry.task.failed_count()
            );
        }
    });
}
