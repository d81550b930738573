use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use uuid::Uuid;

use crate::backend::BackendType;
use crate::language::LanguageCode;
use crate::types::{TranslationRequest, TranslationResponse, TranslationStatus};

/// Cache key for a request: SHA-256 over text, languages and backend type
pub fn fingerprint(request: &TranslationRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.text.as_bytes());
    hasher.update(b"|");
    hasher.update(request.source_lang.code().as_bytes());
    hasher.update(b"|");
    hasher.update(request.target_lang.code().as_bytes());
    hasher.update(b"|");
    hasher.update(request.backend_type.as_str().as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    pub backend_type: BackendType,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_response(fingerprint: String, response: &TranslationResponse) -> Self {
        Self {
            fingerprint,
            original_text: response.original_text.clone(),
            translated_text: response.translated_text.clone(),
            source_lang: response.source_lang,
            target_lang: response.target_lang,
            backend_type: response.backend_type,
            timestamp: response.timestamp,
        }
    }

    /// Rebuild a success response from the stored result
    pub fn to_response(&self) -> TranslationResponse {
        TranslationResponse {
            original_text: self.original_text.clone(),
            translated_text: self.translated_text.clone(),
            source_lang: self.source_lang,
            target_lang: self.target_lang,
            backend_type: self.backend_type,
            status: TranslationStatus::Success,
            error: None,
            error_code: None,
            timestamp: Utc::now(),
        }
    }
}

/// Bounded map of previous results. Entries are immutable once written and
/// evicted in insertion order: lookups use `peek`, so reads never promote.
pub struct TranslationCache {
    /// `None` when caching is sized to zero
    entries: Option<LruCache<String, CacheEntry>>,
}

impl TranslationCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(max_size).map(LruCache::new),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CacheEntry> {
        self.entries.as_ref()?.peek(fingerprint)
    }

    /// Insert an entry unless its fingerprint is already cached.
    /// Returns whether the cache changed.
    pub fn insert(&mut self, entry: CacheEntry) -> bool {
        let Some(entries) = self.entries.as_mut() else {
            return false;
        };
        if entries.contains(entry.fingerprint.as_str()) {
            return false;
        }
        entries.push(entry.fingerprint.clone(), entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.cap().get())
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }

    /// Entries oldest first, the order they are persisted and evicted in
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries
            .iter()
            .flat_map(|entries| entries.iter().rev())
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Rebuild from persisted entries, keeping only the newest that fit
    pub fn load(&mut self, entries: Vec<CacheEntry>) {
        self.clear();
        for entry in entries {
            self.insert(entry);
        }
    }
}

impl std::fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    pub backend_type: BackendType,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_response(response: &TranslationResponse) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_text: response.original_text.clone(),
            translated_text: response.translated_text.clone(),
            source_lang: response.source_lang,
            target_lang: response.target_lang,
            backend_type: response.backend_type,
            timestamp: response.timestamp,
        }
    }
}

/// Newest-first log of translations, truncated at the tail
#[derive(Debug)]
pub struct TranslationHistory {
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl TranslationHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.max_size);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Replace the log with persisted entries (newest first)
    pub fn load(&mut self, entries: Vec<HistoryEntry>) {
        self.entries = entries.into_iter().take(self.max_size).collect();
    }
}
