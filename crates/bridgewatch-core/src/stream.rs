// ── Registry subscriptions ──
//
// Two ways to follow the registry: whole-map snapshots (`watch`) and the
// per-descriptor event feed (`broadcast`).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::warn;

use crate::model::DeviceDescriptor;
use crate::store::{RegistryEvent, Snapshot};

/// A subscription to the published descriptor map.
pub struct DescriptorStream {
    current: Snapshot<DeviceDescriptor>,
    receiver: watch::Receiver<Snapshot<DeviceDescriptor>>,
}

impl DescriptorStream {
    pub(crate) fn new(mut receiver: watch::Receiver<Snapshot<DeviceDescriptor>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Snapshot<DeviceDescriptor> {
        &self.current
    }

    pub fn latest(&self) -> Snapshot<DeviceDescriptor> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the registry is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<DeviceDescriptor>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    pub fn into_stream(self) -> DescriptorWatchStream {
        DescriptorWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` of snapshots, starting with the current one.
pub struct DescriptorWatchStream {
    inner: WatchStream<Snapshot<DeviceDescriptor>>,
}

impl Stream for DescriptorWatchStream {
    type Item = Snapshot<DeviceDescriptor>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The registry event feed. A slow consumer skips what it missed.
pub struct EventStream {
    receiver: broadcast::Receiver<RegistryEvent>,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<RegistryEvent>) -> Self {
        Self { receiver }
    }

    /// Next event. `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<RegistryEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "registry event consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = RegistryEvent> + Send + 'static {
        BroadcastStream::new(self.receiver).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "registry event consumer lagged");
                    None
                }
            }
        })
    }
}
