//! Pending-completion token for connection attempts.
//!
//! A connect command returns a [`PendingConnection`] immediately; the lifecycle keeps
//! the matching [`CompletionSignal`] inside the session. The signal is consumed when
//! it fires, so it can fire at most once, and firing is forced on drop, so a session
//! that is discarded without an explicit outcome still resolves its caller with
//! [`Error::Cancelled`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use bluelink_types::{DeviceId, ServiceCatalog};

use crate::error::{Error, Result};

/// Lifecycle-side half of a connection attempt.
#[derive(Debug)]
pub(crate) struct CompletionSignal {
    tx: Option<oneshot::Sender<Result<ServiceCatalog>>>,
}

impl CompletionSignal {
    /// Resolve the attempt.
    pub(crate) fn complete(mut self, result: Result<ServiceCatalog>) {
        if let Some(tx) = self.tx.take() {
            // The caller may have dropped its PendingConnection; nothing to do then.
            let _ = tx.send(result);
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(Error::Cancelled));
        }
    }
}

/// Caller-side half of a connection attempt.
///
/// Await it to receive the discovered [`ServiceCatalog`] once the session is ready,
/// or the error that ended the attempt.
///
/// ```ignore
/// let pending = manager.connect("AA:BB:CC:DD:EE:FF").await?;
/// let catalog = pending.await?;
/// println!("{} services", catalog.len());
/// ```
#[derive(Debug)]
#[must_use = "a pending connection does nothing unless awaited or polled"]
pub struct PendingConnection {
    device_id: DeviceId,
    rx: oneshot::Receiver<Result<ServiceCatalog>>,
}

impl PendingConnection {
    /// Create a linked signal/token pair.
    pub(crate) fn channel(device_id: DeviceId) -> (CompletionSignal, Self) {
        let (tx, rx) = oneshot::channel();
        (CompletionSignal { tx: Some(tx) }, Self { device_id, rx })
    }

    /// A token that is already resolved.
    pub(crate) fn resolved(device_id: DeviceId, result: Result<ServiceCatalog>) -> Self {
        let (signal, pending) = Self::channel(device_id);
        signal.complete(result);
        pending
    }

    /// The device this attempt targets.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Take the outcome without waiting, if it has fired.
    ///
    /// Returns `None` while the attempt is still in flight. After the outcome has
    /// been taken once, later calls report [`Error::Cancelled`].
    pub fn try_result(&mut self) -> Option<Result<ServiceCatalog>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Cancelled)),
        }
    }
}

impl Future for PendingConnection {
    type Output = Result<ServiceCatalog>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_resolves_pending() {
        let (signal, pending) = PendingConnection::channel(DeviceId::new("A"));
        signal.complete(Ok(ServiceCatalog::new()));
        assert!(pending.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_fires_cancelled() {
        let (signal, pending) = PendingConnection::channel(DeviceId::new("A"));
        drop(signal);
        assert!(matches!(pending.await, Err(Error::Cancelled)));
    }

    #[test]
    fn test_try_result_before_and_after() {
        let (signal, mut pending) = PendingConnection::channel(DeviceId::new("A"));
        assert!(pending.try_result().is_none());

        signal.complete(Err(Error::transport("boom")));
        assert!(matches!(pending.try_result(), Some(Err(Error::Transport(_)))));
    }

    #[tokio::test]
    async fn test_resolved_token() {
        let pending = PendingConnection::resolved(DeviceId::new("B"), Ok(ServiceCatalog::new()));
        assert_eq!(pending.device_id(), &DeviceId::new("B"));
        assert!(pending.await.is_ok());
    }
}
