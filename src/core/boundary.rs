// src/core/boundary.rs
//! Uniform wrapper for calls into external collaborators
//!
//! Symbol introspection, the call-graph oracle and the assistant may all suspend,
//! fail or outlive the caller's interest. Every call site goes through `guarded`,
//! which checks the cancellation token, races the call against it and against the
//! configured timeout, and reports each outcome as a typed `RoutetraceError`.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{RoutetraceError, Result};

/// Timeout plus cancellation shared by every collaborator call in one pipeline run
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run one collaborator call under the guard
    pub async fn guarded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(RoutetraceError::Cancelled { operation: operation.to_string() });
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(RoutetraceError::Cancelled { operation: operation.to_string() })
            }
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(RoutetraceError::Timeout {
                    operation: operation.to_string(),
                    seconds: self.timeout.as_secs(),
                }),
            },
        }
    }
}
