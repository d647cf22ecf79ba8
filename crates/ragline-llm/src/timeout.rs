use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

/// Run an agent call under a deadline.
///
/// An elapsed deadline surfaces as [`LlmError::Timeout`] so callers can treat it
/// exactly like any other failed call.
///
/// # Errors
///
/// Returns the inner error, or `LlmError::Timeout` when `limit` elapses first.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_result() {
        let out = bounded(Duration::from_secs(1), async { Ok::<_, LlmError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let out = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, LlmError>(1)
        })
        .await;
        assert!(matches!(out, Err(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn inner_error_is_preserved() {
        let out: Result<(), _> =
            bounded(Duration::from_secs(1), async { Err(LlmError::Unavailable) }).await;
        assert!(matches!(out, Err(LlmError::Unavailable)));
    }
}
