//! Cancellation and deadlines for one pipeline invocation

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};

/// Wraps every blocking step of an invocation. Once the token is cancelled
/// or the deadline passes, guarded steps resolve to
/// [`PipelineError::Cancelled`] instead of waiting for their future.
#[derive(Debug, Clone)]
pub struct Interrupt {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Guard that never fires on its own.
    pub fn never() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if already interrupted.
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Run `step` unless the invocation is interrupted first.
    pub async fn guard<F, T>(&self, step: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PipelineError::Cancelled),
            _ = deadline => Err(PipelineError::Cancelled),
            out = step => Ok(out),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_when_idle() {
        let interrupt = Interrupt::never();
        assert_eq!(interrupt.guard(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        let interrupt = Interrupt::new(token.clone(), None);
        token.cancel();

        let err = interrupt.guard(async { 7 }).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_slow_step() {
        let interrupt = Interrupt::new(CancellationToken::new(), Some(Duration::from_secs(5)));
        let slow = tokio::time::sleep(Duration::from_secs(60));

        let err = interrupt.guard(slow).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(interrupt.is_interrupted());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let token = CancellationToken::new();
        let interrupt = Interrupt::new(token.clone(), None);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = interrupt.guard(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        canceller.await.unwrap();
    }
}
