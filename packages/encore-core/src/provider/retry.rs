//! Retry logic for transient provider errors.
//!
//! Provides backoff for provider calls that fail with timeouts, rate limiting
//! or 5xx responses. Unauthorized and other permanent errors are returned on
//! the first attempt.

use std::future::Future;
use std::time::Duration;

use super::error::ProviderResult;
use crate::protocol_constants::RETRY_DELAYS_MS;

/// Executes a provider call, retrying transient failures after 200ms, 500ms
/// and 1000ms.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the call
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < RETRY_DELAYS_MS.len() => {
                let delay_ms = RETRY_DELAYS_MS[attempt];
                attempt += 1;
                log::warn!("[WebApi] {} transient error: {}", action, e);
                log::info!(
                    "[WebApi] Retrying {} (attempt {}/{}) after {}ms",
                    action,
                    attempt + 1,
                    RETRY_DELAYS_MS.len() + 1,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
