//! Cancellation and time limits for calls that leave the process

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pl_core::PeerError;

/// Run `fut` until it finishes, `cancel` fires or `limit` elapses
///
/// Cancellation wins over a result that becomes ready at the same time.
pub async fn bounded<T, F>(
    cancel: &CancellationToken,
    op: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, PeerError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PeerError::Cancelled { op }),
        result = tokio::time::timeout(limit, fut) => {
            result.map_err(|_| PeerError::TimedOut { op, after: limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_future_passes_through() {
        let cancel = CancellationToken::new();
        let value = bounded(&cancel, "noop", Duration::from_secs(1), async { 7 })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_future_times_out() {
        let cancel = CancellationToken::new();
        let err = bounded(
            &cancel,
            "wait",
            Duration::from_secs(3),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PeerError::TimedOut { op: "wait", after } if after == Duration::from_secs(3)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = bounded(&cancel, "noop", Duration::from_secs(1), async { 7 })
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Cancelled { op: "noop" }));
    }
}
