// ── Reactive device streams ──
//
// Subscription types for consuming device list changes from the registry.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Device, DeviceAddress};

pub use filter::DeviceFilter;

type Snapshot = Arc<Vec<Arc<Device>>>;

/// A subscription to the device list.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via the `changed()` method or by converting to a `Stream`.
pub struct DeviceStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Look up one device in the latest snapshot.
    pub fn find(&self, address: DeviceAddress) -> Option<Arc<Device>> {
        self.receiver
            .borrow()
            .iter()
            .find(|d| d.address == address)
            .cloned()
    }

    /// Devices of the latest snapshot accepted by `filter`.
    pub fn matching(&self, filter: &DeviceFilter) -> Vec<Arc<Device>> {
        self.receiver
            .borrow()
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the registry has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields a new snapshot each time the registry changes.
pub struct DeviceWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for DeviceWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
