// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        default_backoff, is_retryable_error, retry_with_backoff, ExponentialBackoff,
    };
    use kube::core::response::StatusSummary;
    use kube::core::Status;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Box::new(Status {
            status: Some(StatusSummary::Failure),
            code,
            message: format!("{reason} ({code})"),
            reason: reason.to_string(),
            details: None,
            metadata: None,
        }))
    }

    /// A schedule short enough to keep async tests fast, without jitter
    fn fast_backoff() -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(2),
            Some(Duration::from_secs(5)),
            2.0,
            0.0,
        )
    }

    #[test]
    fn test_backoff_configuration() {
        let backoff = default_backoff();

        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_interval, Duration::from_secs(30));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(300)));

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(backoff.multiplier, 2.0);
            assert_eq!(backoff.randomization_factor, 0.1);
        }
    }

    #[test]
    fn test_write_conflict_is_retryable() {
        assert!(
            is_retryable_error(&api_error(409, "Conflict")),
            "optimistic-concurrency conflicts must be retried, not treated as fatal"
        );
    }

    #[test]
    fn test_already_exists_is_not_retryable() {
        assert!(
            !is_retryable_error(&api_error(409, "AlreadyExists")),
            "a lost create race is resolved by the next pass, not by re-creating"
        );
    }

    #[test]
    fn test_429_and_5xx_are_retryable() {
        for code in [429, 500, 503, 599] {
            assert!(
                is_retryable_error(&api_error(code, "ServerError")),
                "HTTP {code} should be retryable"
            );
        }
    }

    #[test]
    fn test_4xx_not_retryable() {
        for code in [400, 401, 403, 404, 422] {
            assert!(
                !is_retryable_error(&api_error(code, "ClientError")),
                "HTTP {code} should not be retryable"
            );
        }
    }

    #[test]
    fn test_service_errors_retryable() {
        let service_error: Box<dyn std::error::Error + Send + Sync> = Box::new(
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection failed"),
        );

        assert!(is_retryable_error(&kube::Error::Service(service_error)));
    }

    #[test]
    fn test_next_backoff_doubles_and_caps() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(300),
            None,
            2.0,
            0.0,
        );

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(1000),
            Duration::from_millis(1000),
            None,
            1.0,
            0.1,
        );

        for _ in 0..50 {
            let next = backoff.next_backoff().unwrap();
            assert!(next >= Duration::from_millis(900) && next <= Duration::from_millis(1100));
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_conflict() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_with_backoff(
            fast_backoff(),
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(api_error(409, "Conflict"))
                    } else {
                        Ok("patched")
                    }
                }
            },
            "patch Service github",
        )
        .await;

        assert_eq!(result.unwrap(), "patched");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_fast_on_client_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: anyhow::Result<()> = retry_with_backoff(
            fast_backoff(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(api_error(422, "Invalid"))
                }
            },
            "create Deployment github",
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(
            matches!(err.downcast_ref::<kube::Error>(), Some(kube::Error::Api(e)) if e.code == 422),
            "the original API error should be preserved for callers"
        );
    }

    #[tokio::test]
    async fn test_retry_gives_up_when_budget_spent() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Some(Duration::ZERO),
            2.0,
            0.0,
        );
        assert!(backoff.is_exhausted());

        let result: anyhow::Result<()> = retry_with_backoff(
            backoff,
            || async { Err(api_error(503, "ServiceUnavailable")) },
            "get ConfigMap github",
        )
        .await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("get ConfigMap github failed after 1 attempts"));
    }
}
