//! Relingo - Translation Orchestration Engine
//!
//! Translates text through interchangeable backend providers behind one
//! pipeline: a retrying HTTP transport, backend adapters with a shared
//! lifecycle template, a registry that builds and tracks live instances, and
//! a service that adds caching, history, single-flight deduplication and
//! background batch jobs.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod language;
pub mod registry;
pub mod service;
pub mod storage;
pub mod translator;
pub mod transport;
pub mod types;

pub use backend::{BackendAdapter, BackendConfig, BackendType};
pub use config::Config;
pub use error::{ErrorCode, RelingoError, Result};
pub use language::{LanguageCode, detect_language};
pub use registry::BackendRegistry;
pub use service::{BatchStatus, BatchTask, TranslationService};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use translator::TranslatorCore;
pub use types::{TranslationRequest, TranslationResponse, TranslationStatus};
