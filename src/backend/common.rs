use std::time::Duration;

use crate::error::{RelingoError, Result};
use crate::transport::RequestOptions;
use super::BackendType;

/// Upper bound accepted for `retry_count` in backend configs
pub const MAX_RETRY_COUNT: u32 = 10;

/// Upper bound accepted for `timeout_secs` in backend configs
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Build transport options from the timing fields every backend config carries
pub fn request_options(timeout_secs: u64, retry_count: u32, retry_delay_ms: u64) -> RequestOptions {
    RequestOptions {
        timeout: Duration::from_secs(timeout_secs),
        retries: retry_count,
        retry_delay: Duration::from_millis(retry_delay_ms),
        ..RequestOptions::default()
    }
}

pub fn validate_timing(timeout_secs: u64, retry_count: u32) -> Result<()> {
    if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
        return Err(RelingoError::ConfigInvalid(format!(
            "timeout_secs must be between 1 and {}, got {}",
            MAX_TIMEOUT_SECS, timeout_secs
        )));
    }
    if retry_count > MAX_RETRY_COUNT {
        return Err(RelingoError::ConfigInvalid(format!(
            "retry_count must be at most {}, got {}",
            MAX_RETRY_COUNT, retry_count
        )));
    }
    Ok(())
}

pub fn validate_url(field: &str, url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RelingoError::ConfigInvalid(format!("{} must not be empty", field)));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(RelingoError::ConfigInvalid(format!(
            "{} must be an http(s) URL, got '{}'",
            field, url
        )));
    }
    Ok(())
}

pub fn backend_error(backend: BackendType, message: impl Into<String>) -> RelingoError {
    RelingoError::Backend {
        backend,
        message: message.into(),
    }
}
