use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::HostError;

pub mod loopback;
#[cfg(test)]
pub mod memory;

/// One discovered dongle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub address: String,
    pub name: String,
}

/// Opaque GATT object paths cached per dongle to skip rediscovery on
/// reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHandles {
    pub device_path: String,
    pub tx_path: String,
    pub rx_path: String,
}

/// BLE transport contract (Nordic-UART-style TX/RX characteristics).
///
/// Implementations deliver notification chunks of arbitrary size and accept
/// one complete outbound frame per `write_tx`, fragmenting to the MTU
/// internally. The platform GATT backend lives outside this crate; the
/// in-process simulator in [`loopback`] implements the same contract.
pub trait BleTransport {
    fn scan(&mut self, timeout: Duration) -> Result<Vec<DeviceInfo>, HostError>;

    fn connect(
        &mut self,
        address: &str,
        ensure_paired: bool,
        handles: Option<&CachedHandles>,
    ) -> Result<(), HostError>;

    /// Handle paths resolved by the last successful connect, for caching.
    fn resolved_handles(&self) -> Option<CachedHandles>;

    /// Send one complete outer frame.
    fn write_tx(&mut self, frame: &[u8]) -> Result<(), HostError>;

    /// Block for the next notification chunk or until the timeout expires.
    fn wait_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, HostError>;

    fn disconnect(&mut self);
}

/// Bounded FIFO between the notification producer (the BLE stack's callback
/// thread) and the session owner. The consumer pops under the mutex; the
/// producer signals the condvar on insert. When the queue is full the oldest
/// chunk is dropped, which surfaces downstream as a framing gap rather than
/// unbounded memory growth.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    available: Condvar,
    capacity: usize,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                chunks: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                capacity,
            }),
        }
    }

    pub fn push(&self, chunk: Vec<u8>) {
        let mut chunks = self.inner.chunks.lock().expect("notification queue poisoned");
        if chunks.len() == self.inner.capacity {
            log::warn!("notification queue full; dropping oldest chunk");
            chunks.pop_front();
        }
        chunks.push_back(chunk);
        self.inner.available.notify_one();
    }

    pub fn pop(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut chunks = self.inner.chunks.lock().expect("notification queue poisoned");
        loop {
            if let Some(chunk) = chunks.pop_front() {
                return Some(chunk);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .inner
                .available
                .wait_timeout(chunks, deadline - now)
                .expect("notification queue poisoned");
            chunks = guard;
        }
    }

    pub fn clear(&self) {
        self.inner
            .chunks
            .lock()
            .expect("notification queue poisoned")
            .clear();
    }
}
