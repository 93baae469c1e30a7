//! Request-scoped deadline for external calls.
//!
//! A [`RequestDeadline`] is created when a request enters a service and every
//! storage or signing call made on behalf of that request runs under it. Calls
//! share one budget: a slow lookup leaves less time for the write that follows.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::AuthResult;
use crate::error::AuthError;

/// Absolute deadline shared by all external calls of one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline {
    expires_at: Instant,
}

impl RequestDeadline {
    /// Starts a deadline that expires `budget` from now.
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Runs `fut` to completion unless the deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Timeout` naming `operation` if the deadline passes,
    /// otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        match tokio::time::timeout_at(self.expires_at, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, "External call exceeded request deadline");
                Err(AuthError::timeout(operation))
            }
        }
    }

    /// Runs a CPU-bound closure on the blocking pool under the deadline.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Timeout` if the deadline passes, `AuthError::Internal`
    /// if the blocking task panics, otherwise whatever `f` returns.
    pub async fn run_blocking<T, F>(&self, operation: &'static str, f: F) -> AuthResult<T>
    where
        F: FnOnce() -> AuthResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(operation, async move {
            tokio::task::spawn_blocking(f)
                .await
                .map_err(|e| AuthError::internal(format!("{} task failed: {}", operation, e)))?
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let deadline = RequestDeadline::start(Duration::from_secs(1));
        let value = deadline.run("fast", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let deadline = RequestDeadline::start(Duration::from_millis(10));
        let result: AuthResult<()> = deadline
            .run("slow_lookup", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AuthError::Timeout { ref operation } if operation == "slow_lookup"));
        assert_eq!(err.oauth_error_code(), "server_error");
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let deadline = RequestDeadline::start(Duration::from_secs(1));
        let result: AuthResult<()> = deadline
            .run("lookup", async { Err(AuthError::invalid_grant("nope")) })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let deadline = RequestDeadline::start(Duration::from_secs(1));
        let value = deadline.run_blocking("sign", || Ok("signed")).await.unwrap();
        assert_eq!(value, "signed");
        assert!(deadline.remaining() <= Duration::from_secs(1));
    }
}
