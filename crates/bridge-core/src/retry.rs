//! Transparent request-level retry
//!
//! Wraps an established session so every individual remote call is retried
//! on transient network failure, per its own backoff policy. The wrapper
//! exposes the same operation surface as the wrapped session; retry is
//! purely cross-cutting. Session lifecycle calls pass through untouched.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

use crate::options::RetrySettings;
use crate::remote::{Capability, RemoteError, RemoteRequest, RemoteService};

/// Retry decorator over a `RemoteService`
pub struct RetryingService {
    inner: Box<dyn RemoteService>,
    settings: RetrySettings,
}

impl RetryingService {
    pub fn new(inner: Box<dyn RemoteService>, settings: RetrySettings) -> Self {
        Self { inner, settings }
    }

    /// Run one logical call, re-issuing it on transient failure
    ///
    /// Attempts are strictly sequential: the next one never starts before
    /// the previous has failed and the computed wait has elapsed. Dropping
    /// the returned future during a wait aborts the loop without issuing a
    /// further attempt.
    async fn run_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, RemoteError>> + Send,
    {
        let attempts = self.settings.attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < attempts => {
                    let wait = self.settings.backoff.wait_for_attempt(attempt);
                    log::warn!(
                        "{operation} failed (attempt {attempt}/{attempts}), retrying in {:.1}s: {error}",
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl RemoteService for RetryingService {
    // lifecycle calls are forwarded unmodified, exactly once each
    async fn open(&self) -> Result<(), RemoteError> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.inner.close().await
    }

    async fn list_capabilities(&self) -> Result<Vec<Capability>, RemoteError> {
        self.run_with_retry("tools/list", || self.inner.list_capabilities())
            .await
    }

    async fn invoke(&self, request: RemoteRequest) -> Result<Value, RemoteError> {
        let operation = request.method.clone();
        self.run_with_retry(&operation, || self.inner.invoke(request.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails the first `failures` calls with the given error, then succeeds
    struct FlakyService {
        failures: u32,
        error_kind: &'static str,
        calls: Arc<AtomicU32>,
        opens: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    impl FlakyService {
        fn new(failures: u32, error_kind: &'static str) -> Self {
            Self {
                failures,
                error_kind,
                calls: Arc::new(AtomicU32::new(0)),
                opens: Arc::new(AtomicU32::new(0)),
                closes: Arc::new(AtomicU32::new(0)),
            }
        }

        fn make_error(&self) -> RemoteError {
            match self.error_kind {
                "read-timeout" => RemoteError::ReadTimeout("test".into()),
                "write" => RemoteError::Write("test".into()),
                "application" => RemoteError::Application {
                    code: -32000,
                    message: "test".into(),
                },
                "cancelled" => RemoteError::Cancelled,
                other => panic!("unknown test error kind {other}"),
            }
        }
    }

    #[async_trait]
    impl RemoteService for FlakyService {
        async fn open(&self) -> Result<(), RemoteError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), RemoteError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn list_capabilities(&self) -> Result<Vec<Capability>, RemoteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(self.make_error())
            } else {
                Ok(Vec::new())
            }
        }

        async fn invoke(&self, _request: RemoteRequest) -> Result<Value, RemoteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(self.make_error())
            } else {
                Ok(Value::String("ok".into()))
            }
        }
    }

    fn settings(attempts: u32) -> RetrySettings {
        RetrySettings::new(attempts, BackoffPolicy::new(0.0))
    }

    fn wrap(service: FlakyService, attempts: u32) -> (RetryingService, Arc<AtomicU32>) {
        let calls = service.calls.clone();
        (
            RetryingService::new(Box::new(service), settings(attempts)),
            calls,
        )
    }

    #[tokio::test]
    async fn test_transient_failures_retried_until_success() {
        let (wrapped, calls) = wrap(FlakyService::new(2, "read-timeout"), 3);
        let result = wrapped
            .invoke(RemoteRequest::new("tools/call", None))
            .await
            .unwrap();
        assert_eq!(result, Value::String("ok".into()));
        // two retries before the final successful attempt
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_propagates_last_transient_error() {
        let (wrapped, calls) = wrap(FlakyService::new(10, "write"), 3);
        let error = wrapped.list_capabilities().await.unwrap_err();
        assert!(matches!(error, RemoteError::Write(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_never_retried() {
        let (wrapped, calls) = wrap(FlakyService::new(10, "application"), 5);
        let error = wrapped
            .invoke(RemoteRequest::new("tools/call", None))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Application { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_never_retried() {
        let (wrapped, calls) = wrap(FlakyService::new(10, "cancelled"), 5);
        let error = wrapped
            .invoke(RemoteRequest::new("tools/call", None))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_never_retries() {
        let (wrapped, calls) = wrap(FlakyService::new(10, "read-timeout"), 1);
        assert!(wrapped.list_capabilities().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_forwarded_exactly_once() {
        let service = FlakyService::new(0, "read-timeout");
        let opens = service.opens.clone();
        let closes = service.closes.clone();
        let wrapped = RetryingService::new(Box::new(service), settings(5));
        wrapped.open().await.unwrap();
        wrapped.close().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_call_during_backoff_stops_retrying() {
        let service = FlakyService::new(10, "read-timeout");
        let calls = service.calls.clone();
        // long backoff so the call is parked in its wait when we cancel it
        let settings = RetrySettings::new(3, BackoffPolicy::new(5.0));
        let wrapped = RetryingService::new(Box::new(service), settings);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            wrapped.invoke(RemoteRequest::new("tools/call", None)),
        )
        .await;
        assert!(cancelled.is_err(), "call should have been cancelled mid-wait");

        // the aborted wait must not have issued another attempt
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
