use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config;

/// Connection poolers running in transaction mode can hand a session a
/// backend that already holds (or has never seen) a named statement.
fn is_retryable(message: &str) -> bool {
    message.contains("prepared statement")
}

/// Run `op`, retrying on prepared-statement collisions with linear backoff
/// using the configured attempt count and delay.
pub async fn with_retry<T, E, F, Fut>(label: &str, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let db = &config::config().database;
    with_retry_config(label, db.retry_attempts, Duration::from_millis(db.retry_delay_ms), op).await
}

pub async fn with_retry_config<T, E, F, Fut>(
    label: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_retryable(&err.to_string()) => {
                tracing::warn!(
                    "{}: attempt {}/{} hit '{}', retrying",
                    label,
                    attempt,
                    attempts,
                    err
                );
                tokio::time::sleep(delay * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_prepared_statement_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<&str, String> = with_retry_config("test", 3, Duration::from_millis(1), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("prepared statement \"s0\" already exists".to_string())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_retry_config("test", 2, Duration::from_millis(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("prepared statement \"s3\" does not exist".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_fail_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_retry_config("test", 5, Duration::from_millis(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("duplicate key value violates unique constraint".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
