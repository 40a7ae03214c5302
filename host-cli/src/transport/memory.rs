//! Scripted transport: replays queued notification chunks and records every
//! frame the host writes.

use std::collections::VecDeque;
use std::time::Duration;

use shared::frame::encode_frame;

use super::{BleTransport, CachedHandles, DeviceInfo};
use crate::error::HostError;

#[derive(Default)]
pub struct MemoryBleTransport {
    pub devices: Vec<DeviceInfo>,
    queued: VecDeque<Vec<u8>>,
    pub written: Vec<Vec<u8>>,
    pub connected: bool,
    pub connect_count: usize,
}

impl MemoryBleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one raw notification chunk.
    pub fn queue_chunk(&mut self, chunk: Vec<u8>) {
        self.queued.push_back(chunk);
    }

    /// Queue a complete frame as a single notification.
    pub fn queue_frame(&mut self, op: u8, payload: &[u8]) {
        let frame = encode_frame(op, payload).expect("payload within cap");
        self.queue_chunk(frame);
    }

    pub fn last_written(&self) -> Option<&Vec<u8>> {
        self.written.last()
    }
}

impl BleTransport for MemoryBleTransport {
    fn scan(&mut self, _timeout: Duration) -> Result<Vec<DeviceInfo>, HostError> {
        Ok(self.devices.clone())
    }

    fn connect(
        &mut self,
        _address: &str,
        _ensure_paired: bool,
        _handles: Option<&CachedHandles>,
    ) -> Result<(), HostError> {
        self.connected = true;
        self.connect_count += 1;
        Ok(())
    }

    fn resolved_handles(&self) -> Option<CachedHandles> {
        None
    }

    fn write_tx(&mut self, frame: &[u8]) -> Result<(), HostError> {
        self.written.push(frame.to_vec());
        Ok(())
    }

    fn wait_notification(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.queued.pop_front())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
