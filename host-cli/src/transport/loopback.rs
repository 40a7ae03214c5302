//! In-process dongle simulator.
//!
//! Embeds the real [`DongleEngine`] behind the [`BleTransport`] contract so
//! the whole command surface can run without hardware. This backs the `--sim`
//! flag and the end-to-end tests.

use std::cmp;
use std::time::{Duration, Instant};

use dongle_core::{DongleEngine, MemoryDeviceStore, RecordingHid, DEFAULT_KDF_ITERS};
use rand_core::OsRng;

use crate::constants::NOTIFY_QUEUE_CAPACITY;
use crate::error::HostError;
use crate::transport::{BleTransport, CachedHandles, DeviceInfo, NotificationQueue};

pub const SIM_ADDRESS: &str = "F0:9F:C2:00:51:17";
pub const SIM_NAME: &str = "BluKey Sim";
/// Setup password baked into the simulated dongle's first-run configuration.
pub const SIM_SETUP_PASSWORD: &str = "blukey-sim";

/// Granularity at which the simulated dongle's retransmit timer runs while
/// the host blocks on notifications.
const TICK_SLICE: Duration = Duration::from_millis(50);

pub struct LoopbackTransport {
    engine: DongleEngine<MemoryDeviceStore, RecordingHid, OsRng>,
    queue: NotificationQueue,
    started: Instant,
    connected: bool,
}

impl LoopbackTransport {
    /// A simulator that has already been through first-run setup with
    /// [`SIM_SETUP_PASSWORD`].
    pub fn new() -> Self {
        let mut engine = DongleEngine::new(MemoryDeviceStore::new(), RecordingHid::new(), OsRng)
            .expect("memory store loads");
        engine.run_setup(SIM_SETUP_PASSWORD, DEFAULT_KDF_ITERS);
        Self::with_engine(engine)
    }

    /// Wrap an engine in whatever state a test needs.
    pub fn with_engine(engine: DongleEngine<MemoryDeviceStore, RecordingHid, OsRng>) -> Self {
        Self {
            engine,
            queue: NotificationQueue::new(NOTIFY_QUEUE_CAPACITY),
            started: Instant::now(),
            connected: false,
        }
    }

    pub fn engine(&self) -> &DongleEngine<MemoryDeviceStore, RecordingHid, OsRng> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DongleEngine<MemoryDeviceStore, RecordingHid, OsRng> {
        &mut self.engine
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn deliver(&mut self, frames: Vec<Vec<u8>>) {
        for frame in frames {
            self.queue.push(frame);
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport for LoopbackTransport {
    fn scan(&mut self, _timeout: Duration) -> Result<Vec<DeviceInfo>, HostError> {
        Ok(vec![DeviceInfo {
            address: SIM_ADDRESS.into(),
            name: SIM_NAME.into(),
        }])
    }

    fn connect(
        &mut self,
        address: &str,
        _ensure_paired: bool,
        _handles: Option<&CachedHandles>,
    ) -> Result<(), HostError> {
        if address != SIM_ADDRESS {
            return Err(HostError::Transport(format!(
                "no such device: {address} (the simulator answers on {SIM_ADDRESS})"
            )));
        }
        self.queue.clear();
        let now = self.now_ms();
        let frames = self.engine.on_connect(now);
        self.deliver(frames);
        self.connected = true;
        Ok(())
    }

    fn resolved_handles(&self) -> Option<CachedHandles> {
        None
    }

    fn write_tx(&mut self, frame: &[u8]) -> Result<(), HostError> {
        if !self.connected {
            return Err(HostError::Transport("not connected".into()));
        }
        let now = self.now_ms();
        let frames = self.engine.push_chunk(frame, now);
        self.deliver(frames);
        Ok(())
    }

    fn wait_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, HostError> {
        if !self.connected {
            return Err(HostError::Transport("not connected".into()));
        }

        // Slice the wait so the simulated retransmit timer keeps running.
        let deadline = Instant::now() + timeout;
        loop {
            let now = self.now_ms();
            let frames = self.engine.tick(now);
            self.deliver(frames);

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if let Some(chunk) = self.queue.pop(cmp::min(TICK_SLICE, remaining)) {
                return Ok(Some(chunk));
            }
        }
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.engine.on_disconnect();
            self.queue.clear();
            self.connected = false;
        }
    }
}
