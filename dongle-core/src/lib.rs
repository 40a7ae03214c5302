#![cfg_attr(not(feature = "std"), no_std)]

//! Dongle-side protocol engine.
//!
//! Transport-agnostic: notification chunks go in, complete outbound wire
//! frames come out. The firmware glue owns the BLE stack, USB HID, and NVS,
//! and drives this engine from its receive callback plus a periodic tick for
//! HELLO retransmission. The host CLI embeds the same engine behind its
//! simulated transport, which is also how the end-to-end tests run.

extern crate alloc;

pub mod config;
mod dispatch;
pub mod hid;
mod provision;
mod session;

pub use config::{
    DeviceConfig, DeviceStore, KdfParams, Layout, MemoryDeviceStore, StoreError,
    DEFAULT_DEVICE_NAME, DEFAULT_KDF_ITERS,
};
pub use hid::{HidOutput, RecordingHid};
pub use provision::MAX_PROOF_FAILURES;

use alloc::vec::Vec;
use rand_core::CryptoRngCore;

use shared::error::PolicyError;
use shared::frame::{decode_exact_frame, encode_frame, Frame, Framer, Opcode};

use provision::{ProvisionReply, Provisioner};
use session::ServerSession;

/// Protocol state machine for one dongle.
///
/// Owns the framer buffer, the provisioning challenge, and the session
/// counters; callers on other threads must reach it through one owner.
pub struct DongleEngine<S: DeviceStore, H: HidOutput, R: CryptoRngCore> {
    config: DeviceConfig,
    store: S,
    hid: H,
    rng: R,
    framer: Framer,
    session: ServerSession,
    provisioner: Provisioner,
    fast_keys: bool,
}

impl<S: DeviceStore, H: HidOutput, R: CryptoRngCore> DongleEngine<S, H, R> {
    /// Load persisted configuration (or start from factory state) and build
    /// an idle engine.
    pub fn new(mut store: S, hid: H, rng: R) -> Result<Self, StoreError> {
        let config = store
            .load()?
            .unwrap_or_else(|| DeviceConfig::factory(DEFAULT_DEVICE_NAME));
        Ok(Self {
            config,
            store,
            hid,
            rng,
            framer: Framer::new(),
            session: ServerSession::new(),
            provisioner: Provisioner::new(),
            fast_keys: false,
        })
    }

    /// First-run setup, normally driven by the captive portal.
    pub fn run_setup(&mut self, password: &str, iters: u32) {
        self.config.run_setup(password, iters, &mut self.rng);
        self.persist();
        log::info!("setup complete; APPKEY minted");
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn hid(&self) -> &H {
        &self.hid
    }

    pub fn hid_mut(&mut self) -> &mut H {
        &mut self.hid
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn fast_keys_enabled(&self) -> bool {
        self.fast_keys
    }

    /// A central has connected: reset per-connection state and, if the
    /// device has been set up, open with a HELLO.
    pub fn on_connect(&mut self, now_ms: u64) -> Vec<Vec<u8>> {
        self.framer.clear();
        self.fast_keys = false;
        self.session.reset();

        let mut out = Vec::new();
        if self.config.appkey.is_some() {
            let payload = self.session.start_hello(&mut self.rng, now_ms);
            log::info!("hello issued (sid=0x{:08x})", self.session.sid());
            Self::push_raw(&mut out, Opcode::Hello, &payload);
        } else {
            log::warn!("no APPKEY minted yet; waiting for first-run setup");
        }
        out
    }

    pub fn on_disconnect(&mut self) {
        self.framer.clear();
        self.fast_keys = false;
        self.session.reset();
        log::info!("central disconnected; session state cleared");
    }

    /// Periodic driver for HELLO retransmission.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        if let Some(payload) = self.session.tick(now_ms) {
            log::debug!("hello retransmit");
            Self::push_raw(&mut out, Opcode::Hello, &payload);
        }
        out
    }

    /// Feed one notification chunk from the transport; returns the complete
    /// wire frames to send back.
    pub fn push_chunk(&mut self, chunk: &[u8], now_ms: u64) -> Vec<Vec<u8>> {
        let frames = self.framer.push(chunk);
        let mut out = Vec::new();
        for frame in frames {
            self.dispatch_frame(frame, &mut out, now_ms);
        }
        out
    }

    fn dispatch_frame(&mut self, frame: Frame, out: &mut Vec<Vec<u8>>, now_ms: u64) {
        match Opcode::try_from(frame.op) {
            Ok(Opcode::KeyExchange) => self.handle_key_exchange(&frame.payload, out),
            Ok(Opcode::Record) => self.handle_record(&frame.payload, out, now_ms),
            Ok(op) if !self.session.is_active() => self.handle_presession(op, &frame.payload, out),
            Ok(op) => self.handle_app_frame(op, &frame.payload, out, now_ms),
            Err(_) => {
                log::warn!("unknown opcode 0x{:02X}", frame.op);
                if self.session.is_active() {
                    self.send_error(out, "bad op", now_ms);
                } else {
                    Self::push_error(out, PolicyError::NoSession.reason());
                }
            }
        }
    }

    fn handle_key_exchange(&mut self, payload: &[u8], out: &mut Vec<Vec<u8>>) {
        let appkey = match &self.config.appkey {
            Some(appkey) => appkey.clone(),
            None => {
                Self::push_error(out, PolicyError::NoSession.reason());
                return;
            }
        };

        match self.session.handle_key_exchange(payload, &appkey) {
            Ok(finished) => {
                // B2 goes out raw: the session only counts as active for
                // frames after the finished tag.
                Self::push_raw(out, Opcode::ServerFinished, &finished);
                log::info!("session active (sid=0x{:08x})", self.session.sid());
            }
            Err(failure) => {
                // The cached HELLO stays armed so the controller can retry
                // against the same ephemeral key.
                log::warn!("key exchange refused: {}", failure.reason());
                Self::push_error(out, failure.reason());
            }
        }
    }

    fn handle_record(&mut self, payload: &[u8], out: &mut Vec<Vec<u8>>, now_ms: u64) {
        use shared::error::{AuthError, SecureChannelError};

        if !self.session.is_active() {
            Self::push_error(out, "NOSESSION");
            return;
        }

        match self.session.open_incoming(payload) {
            Ok(plain) => match decode_exact_frame(&plain) {
                Ok(inner) => self.dispatch_frame(inner, out, now_ms),
                Err(err) => log::warn!("discarding unparseable inner frame: {err}"),
            },
            Err(SecureChannelError::Auth(err)) => {
                let reason = match err {
                    AuthError::Replay => "REPLAY",
                    _ => "BADMAC",
                };
                log::warn!("record rejected: {reason}; resetting session");
                Self::push_error(out, reason);
                self.restart_hello(out, now_ms);
            }
            Err(SecureChannelError::Protocol(err)) => {
                log::warn!("record framing rejected: {err}");
                self.send_error(out, "bad length", now_ms);
            }
        }
    }

    fn handle_presession(&mut self, op: Opcode, payload: &[u8], out: &mut Vec<Vec<u8>>) {
        let reply = match op {
            Opcode::ProvisionRequest => self.provisioner.handle_request(&self.config, &mut self.rng),
            Opcode::ProvisionProof => self.provisioner.handle_proof(payload, &self.config),
            _ => {
                Self::push_error(out, PolicyError::NoSession.reason());
                return;
            }
        };

        match reply {
            ProvisionReply::Challenge(payload) => {
                Self::push_raw(out, Opcode::ProvisionChallenge, &payload);
            }
            ProvisionReply::Wrapped(payload) => {
                Self::push_raw(out, Opcode::ProvisionKey, &payload);
                self.config.appkey_released = true;
                self.persist();
            }
            ProvisionReply::Refused(reason) => Self::push_error(out, reason),
        }
    }

    /// Crypto failure mid-session: tear down and offer a fresh handshake
    /// without waiting for a reconnect.
    fn restart_hello(&mut self, out: &mut Vec<Vec<u8>>, now_ms: u64) {
        self.session.reset();
        self.fast_keys = false;
        if self.config.appkey.is_some() {
            let payload = self.session.start_hello(&mut self.rng, now_ms);
            log::info!("hello re-issued (sid=0x{:08x})", self.session.sid());
            Self::push_raw(out, Opcode::Hello, &payload);
        }
    }

    pub(crate) fn persist(&mut self) {
        if let Err(err) = self.store.save(&self.config) {
            log::error!("failed to persist configuration: {err}");
        }
    }

    /// Frame and queue a reply, wrapping it in a record once the session is
    /// active. On sequence exhaustion the reply is dropped and a fresh
    /// handshake is forced.
    pub(crate) fn send_frame(
        &mut self,
        out: &mut Vec<Vec<u8>>,
        op: Opcode,
        payload: &[u8],
        now_ms: u64,
    ) {
        if !self.session.is_active() {
            Self::push_raw(out, op, payload);
            return;
        }

        let inner = match encode_frame(op.into(), payload) {
            Ok(inner) => inner,
            Err(err) => {
                log::error!("refusing oversized reply: {err}");
                return;
            }
        };
        match self.session.seal_outgoing(&inner) {
            Ok(record) => Self::push_raw(out, Opcode::Record, &record),
            Err(_) => {
                log::warn!("outbound sequence space exhausted; forcing re-handshake");
                self.restart_hello(out, now_ms);
            }
        }
    }

    pub(crate) fn send_error(&mut self, out: &mut Vec<Vec<u8>>, reason: &str, now_ms: u64) {
        self.send_frame(out, Opcode::Error, reason.as_bytes(), now_ms);
    }

    /// Queue a frame without record wrapping, regardless of session state.
    pub(crate) fn push_raw(out: &mut Vec<Vec<u8>>, op: Opcode, payload: &[u8]) {
        match encode_frame(op.into(), payload) {
            Ok(frame) => out.push(frame),
            Err(err) => log::error!("dropping oversized frame: {err}"),
        }
    }

    pub(crate) fn push_error(out: &mut Vec<Vec<u8>>, reason: &str) {
        Self::push_raw(out, Opcode::Error, reason.as_bytes());
    }
}

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod tests_dispatch;
#[cfg(test)]
mod tests_provision;
