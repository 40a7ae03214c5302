//! Application dispatcher: the opcodes a controller may issue once the
//! session is active.

use alloc::format;
use alloc::vec::Vec;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use shared::crypto::md5_digest;
use shared::frame::Opcode;

use crate::config::{DeviceStore, Layout};
use crate::hid::HidOutput;
use crate::DongleEngine;

impl<S: DeviceStore, H: HidOutput, R: CryptoRngCore> DongleEngine<S, H, R> {
    pub(crate) fn handle_app_frame(
        &mut self,
        op: Opcode,
        payload: &[u8],
        out: &mut Vec<Vec<u8>>,
        now_ms: u64,
    ) {
        match op {
            Opcode::SetLayout => self.handle_set_layout(payload, out, now_ms),
            Opcode::GetInfo => self.handle_get_info(out, now_ms),
            Opcode::FactoryReset => self.handle_factory_reset(out, now_ms),
            Opcode::FastKeys => self.handle_fast_keys(payload, out, now_ms),
            Opcode::SendString => self.handle_send_string(payload, out, now_ms),
            Opcode::KeyTap => self.handle_key_tap(payload, out, now_ms),
            _ => self.send_error(out, "bad op", now_ms),
        }
    }

    fn ack(&mut self, out: &mut Vec<Vec<u8>>, now_ms: u64) {
        self.send_frame(out, Opcode::Ack, &[], now_ms);
    }

    /// `C0`: persist a keyboard layout given by name.
    fn handle_set_layout(&mut self, payload: &[u8], out: &mut Vec<Vec<u8>>, now_ms: u64) {
        let layout = core::str::from_utf8(payload).ok().and_then(Layout::from_name);
        match layout {
            Some(layout) => {
                log::info!("layout set to {}", layout.name());
                self.config.layout = layout;
                self.persist();
                self.ack(out, now_ms);
            }
            None => self.send_error(out, "bad layout", now_ms),
        }
    }

    /// `C1`: reply `C2` with a short ASCII summary of the device.
    fn handle_get_info(&mut self, out: &mut Vec<Vec<u8>>, now_ms: u64) {
        let info = format!(
            "LAYOUT={}; PROTO={}; FW={}",
            self.config.layout.name(),
            shared::PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION"),
        );
        self.send_frame(out, Opcode::InfoValue, info.as_bytes(), now_ms);
    }

    /// `C4`: mint a fresh APPKEY and drop the setup and released flags. The
    /// KDF parameters survive, so re-provisioning reuses the same setup
    /// password until the portal is run again. The current session keeps its
    /// already-derived keys and dies with the connection.
    fn handle_factory_reset(&mut self, out: &mut Vec<Vec<u8>>, now_ms: u64) {
        let mut appkey = Zeroizing::new([0u8; 32]);
        self.rng.fill_bytes(&mut appkey[..]);
        self.config.appkey = Some(appkey);
        self.config.appkey_released = false;
        self.config.setup_done = false;
        self.persist();
        log::info!("factory reset: APPKEY rotated, setup flag cleared");
        self.ack(out, now_ms);
    }

    /// `C8`: enable or disable the raw-HID fast path.
    fn handle_fast_keys(&mut self, payload: &[u8], out: &mut Vec<Vec<u8>>, now_ms: u64) {
        if payload.len() != 1 {
            self.send_error(out, "bad len", now_ms);
            return;
        }
        self.fast_keys = payload[0] != 0;
        self.ack(out, now_ms);
    }

    /// `D0`: type the UTF-8 payload and answer `D1` with a status byte and
    /// the MD5 of the exact payload bytes.
    fn handle_send_string(&mut self, payload: &[u8], out: &mut Vec<Vec<u8>>, now_ms: u64) {
        self.hid.type_utf8(payload);
        log::info!("typed {} bytes", payload.len());

        let digest = md5_digest(payload);
        let mut reply = Vec::with_capacity(1 + digest.len());
        reply.push(0x00);
        reply.extend_from_slice(&digest);
        self.send_frame(out, Opcode::SendResult, &reply, now_ms);
    }

    /// `E0`: fire-and-forget raw HID tap. Gated on fast mode; no reply on
    /// success.
    fn handle_key_tap(&mut self, payload: &[u8], out: &mut Vec<Vec<u8>>, now_ms: u64) {
        if payload.len() != 2 && payload.len() != 3 {
            self.send_error(out, "bad len", now_ms);
            return;
        }
        if !self.fast_keys {
            self.send_error(out, "raw off", now_ms);
            return;
        }

        let mods = payload[0];
        let usage = payload[1];
        let repeat = payload.get(2).copied().unwrap_or(1).max(1);
        for _ in 0..repeat {
            self.hid.tap(mods, usage);
        }
    }
}
