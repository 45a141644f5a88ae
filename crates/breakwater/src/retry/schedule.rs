//! Handle for retry runs executing on a background task

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{ResilienceError, ResilienceResult};

/// Handle to a retry run spawned by [`Retry::schedule`](super::Retry::schedule)
///
/// The background task keeps running when the handle is merely held;
/// dropping the handle without joining cancels the run, since its outcome
/// can no longer be observed. Cancellation takes effect between attempts
/// and during backoff waits.
#[derive(Debug)]
pub struct ScheduledRetry<T, E> {
    token: CancellationToken,
    receiver: Option<oneshot::Receiver<Result<T, E>>>,
}

impl<T, E> ScheduledRetry<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(token: CancellationToken, receiver: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { token, receiver: Some(receiver) }
    }

    /// Request cancellation of the scheduled run
    ///
    /// An attempt already in flight completes and is recorded; no further
    /// attempt starts afterwards.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the terminal outcome of the scheduled run
    ///
    /// Resolves to [`ResilienceError::Cancelled`] when cancellation
    /// preempted the terminal outcome.
    pub async fn join(mut self) -> ResilienceResult<T, E> {
        match self.receiver.take() {
            Some(receiver) => match receiver.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(ResilienceError::Operation { source }),
                Err(_) => Err(ResilienceError::Cancelled),
            },
            // join consumes the handle, so the receiver is always present.
            None => Err(ResilienceError::Cancelled),
        }
    }
}

impl<T, E> Drop for ScheduledRetry<T, E> {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.token.cancel();
        }
    }
}
