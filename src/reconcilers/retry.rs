// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backoff for Kubernetes API calls made while reconciling gateways.
//!
//! Only transient failures are retried: write conflicts, throttling (429),
//! server errors (5xx) and transport errors. Everything else fails the call
//! at once and the controller requeues the whole pass from fresh reads.
//!
//! Default schedule: 100ms doubling per attempt, capped at 30s between
//! attempts, with ±10% jitter, giving up after 5 minutes.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const INITIAL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_INTERVAL: Duration = Duration::from_secs(30);
const MAX_ELAPSED_TIME: Duration = Duration::from_secs(300);
const BACKOFF_MULTIPLIER: f64 = 2.0;
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Jittered exponential backoff schedule.
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Budget for all attempts together; `None` retries forever
    pub max_elapsed_time: Option<Duration>,
    pub multiplier: f64,
    /// Fraction of each interval added or removed at random
    pub randomization_factor: f64,
    current_interval: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            current_interval: initial_interval,
            started: Instant::now(),
        }
    }

    /// `true` once the elapsed-time budget is spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max_elapsed_time
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    /// Delay before the next attempt, or `None` when the budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let interval = self.current_interval;
        self.current_interval = interval.mul_f64(self.multiplier).min(self.max_interval);
        Some(self.jitter(interval))
    }

    fn jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let factor = rand::thread_rng()
            .gen_range(1.0 - self.randomization_factor..=1.0 + self.randomization_factor);
        interval.mul_f64(factor.max(0.0))
    }
}

/// Backoff used for every API call made by the reconcilers.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        INITIAL_INTERVAL,
        MAX_INTERVAL,
        Some(MAX_ELAPSED_TIME),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Run a Kubernetes API call with [`default_backoff`].
///
/// # Example
///
/// ```no_run
/// use kube::{Api, Client};
/// use k8s_openapi::api::core::v1::Service;
/// use egress_operator::reconcilers::retry::retry_api_call;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<Service> = Api::namespaced(client, "egress-operator-system");
///
/// let svc = retry_api_call(|| api.get_opt("github"), "get Service github").await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the first non-retryable error, or an error once the backoff is
/// exhausted.
pub async fn retry_api_call<T, F, Fut>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    retry_with_backoff(default_backoff(), operation, operation_name).await
}

/// Run a Kubernetes API call with an explicit backoff schedule.
///
/// # Errors
///
/// Returns the first non-retryable error, or an error once `backoff` is
/// exhausted.
pub async fn retry_with_backoff<T, F, Fut>(
    mut backoff: ExponentialBackoff,
    mut operation: F,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if !is_retryable_error(&e) => return Err(e.into()),
            Err(e) => e,
        };

        let Some(delay) = backoff.next_backoff() else {
            error!(
                operation = operation_name,
                attempt,
                error = %e,
                "Giving up on API call"
            );
            return Err(anyhow!(
                "{operation_name} failed after {attempt} attempts: {e}"
            ));
        };

        warn!(
            operation = operation_name,
            attempt,
            retry_after = ?delay,
            error = %e,
            "Transient API error, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// `true` for API errors worth retrying.
///
/// A `409` is retried as a write conflict unless its reason is
/// `AlreadyExists`: a lost create race is settled by the next pass patching.
pub(crate) fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => match response.code {
            409 => response.reason != "AlreadyExists",
            429 => true,
            code => (500..600).contains(&code),
        },
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
