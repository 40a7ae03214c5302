//! Controller side of the protocol: frame pump, provisioning flow, MTLS
//! handshake, and the secure application requests.
//!
//! One `ClientSession` is the single owner of the framer buffer and the
//! sequence counters for a connection (the transport may receive
//! notifications on another thread; they meet in the transport's queue).
//! Every blocking receive is bounded by an explicit deadline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand_core::OsRng;
use zeroize::Zeroizing;

use shared::crypto::{ct_eq, md5_digest, pbkdf2_sha256};
use shared::error::{AuthError, ProtocolError};
use shared::frame::{decode_exact_frame, encode_frame, Frame, Framer, Opcode, HEADER_SIZE,
    MAX_PAYLOAD};
use shared::provision::{decode_challenge, proof_mac, unwrap_appkey, APPKEY_LEN};
use shared::session::{
    decode_hello, derive_session_key, ecdh_x, generate_keypair, keyx_mac, open_record,
    parse_public_key, seal_record, Direction, Hello, TrafficKeys, RECORD_OVERHEAD, SEQ_EXHAUSTED,
    TAG_LEN,
};

use crate::constants::{HANDSHAKE_TIMEOUT, HELLO_TIMEOUT, INFO_TIMEOUT, TYPE_TIMEOUT};
use crate::error::HostError;
use crate::transport::BleTransport;

struct SessionState {
    sid: u32,
    keys: TrafficKeys,
    seq_out: u16,
    seq_in: u16,
}

pub struct ClientSession<'a, T: BleTransport + ?Sized> {
    transport: &'a mut T,
    framer: Framer,
    pending: VecDeque<Frame>,
    state: Option<SessionState>,
}

impl<'a, T: BleTransport + ?Sized> ClientSession<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            framer: Framer::new(),
            pending: VecDeque::new(),
            state: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    fn recv_frame(&mut self, deadline: Instant, what: &'static str) -> Result<Frame, HostError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(HostError::Timeout(what));
            }
            match self.transport.wait_notification(deadline - now)? {
                Some(chunk) => self.pending.extend(self.framer.push(&chunk)),
                None => return Err(HostError::Timeout(what)),
            }
        }
    }

    /// Wait for one of the wanted raw opcodes, surfacing `0xFF` as a device
    /// refusal. Unrelated frames are skipped.
    fn await_raw(
        &mut self,
        wanted: &[u8],
        timeout: Duration,
        what: &'static str,
    ) -> Result<Frame, HostError> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.recv_frame(deadline, what)?;
            if wanted.contains(&frame.op) {
                return Ok(frame);
            }
            if frame.op == u8::from(Opcode::Error) {
                return Err(HostError::Device(
                    String::from_utf8_lossy(&frame.payload).into_owned(),
                ));
            }
            log::debug!("ignoring raw frame 0x{:02X} while waiting for {what}", frame.op);
        }
    }

    fn send_raw(&mut self, op: Opcode, payload: &[u8]) -> Result<(), HostError> {
        let frame = encode_frame(op.into(), payload)?;
        self.transport.write_tx(&frame)
    }

    /// Wait for the dongle's HELLO. Any pre-existing session state is void
    /// once a new HELLO is seen.
    pub fn wait_hello(&mut self) -> Result<Hello, HostError> {
        let frame = self.await_raw(&[Opcode::Hello.into()], HELLO_TIMEOUT, "HELLO")?;
        self.state = None;
        Ok(decode_hello(&frame.payload)?)
    }

    /// Run the A0/A2/A3/A1 exchange and return the APPKEY.
    pub fn provision(&mut self, password: &str) -> Result<Zeroizing<[u8; APPKEY_LEN]>, HostError> {
        self.send_raw(Opcode::ProvisionRequest, &[])?;
        let frame = self.await_raw(
            &[Opcode::ProvisionChallenge.into()],
            HANDSHAKE_TIMEOUT,
            "provisioning challenge",
        )?;
        let challenge = decode_challenge(&frame.payload)?;

        let verifier = pbkdf2_sha256(password.as_bytes(), &challenge.salt, challenge.iters);
        let proof = proof_mac(&verifier, &challenge.chal);
        self.send_raw(Opcode::ProvisionProof, &proof)?;

        let frame = self.await_raw(
            &[Opcode::ProvisionKey.into()],
            HANDSHAKE_TIMEOUT,
            "wrapped APPKEY",
        )?;
        Ok(unwrap_appkey(&verifier, &challenge.chal, &frame.payload)?)
    }

    /// B1/B2 key exchange against a received HELLO.
    pub fn handshake(&mut self, hello: &Hello, appkey: &[u8; 32]) -> Result<(), HostError> {
        let srv_key = parse_public_key(&hello.srv_pub)?;
        let (secret, cli_pub) = generate_keypair(&mut OsRng);

        let mac = keyx_mac(appkey, hello.sid, &hello.srv_pub, &cli_pub);
        let mut payload = Vec::with_capacity(cli_pub.len() + mac.len());
        payload.extend_from_slice(&cli_pub);
        payload.extend_from_slice(&mac);
        self.send_raw(Opcode::KeyExchange, &payload)?;

        let frame = self.await_raw(
            &[Opcode::ServerFinished.into()],
            HANDSHAKE_TIMEOUT,
            "server finished",
        )?;
        if frame.payload.len() != TAG_LEN {
            return Err(ProtocolError::BadLength {
                declared: TAG_LEN,
                actual: frame.payload.len(),
            }
            .into());
        }

        let shared_x = ecdh_x(&secret, &srv_key);
        let sess_key = derive_session_key(appkey, &shared_x, hello.sid, &hello.srv_pub, &cli_pub);
        let keys = TrafficKeys::derive(&sess_key);
        let expected = keys.server_finished_mac(hello.sid, &hello.srv_pub, &cli_pub);
        if !ct_eq(&expected, &frame.payload) {
            return Err(AuthError::BadMac.into());
        }

        self.state = Some(SessionState {
            sid: hello.sid,
            keys,
            seq_out: 0,
            seq_in: 0,
        });
        log::info!("session established (sid=0x{:08x})", hello.sid);
        Ok(())
    }

    fn seal_app_frame(&mut self, op: Opcode, payload: &[u8]) -> Result<Vec<u8>, HostError> {
        if payload.len() + HEADER_SIZE + RECORD_OVERHEAD > MAX_PAYLOAD {
            return Err(ProtocolError::BadLength {
                declared: payload.len(),
                actual: MAX_PAYLOAD - HEADER_SIZE - RECORD_OVERHEAD,
            }
            .into());
        }
        if self.state.as_ref().ok_or(HostError::NoSession)?.seq_out == SEQ_EXHAUSTED {
            self.state = None;
            return Err(HostError::SessionExpired);
        }
        let state = self.state.as_mut().ok_or(HostError::NoSession)?;

        let inner = encode_frame(op.into(), payload)?;
        let record = seal_record(
            &state.keys,
            state.sid,
            Direction::ControllerToDongle,
            state.seq_out,
            &inner,
        );
        state.seq_out += 1;
        Ok(encode_frame(Opcode::Record.into(), &record)?)
    }

    fn open_reply_record(&mut self, payload: &[u8]) -> Result<Frame, HostError> {
        let result = {
            let state = self.state.as_ref().ok_or(HostError::NoSession)?;
            open_record(
                &state.keys,
                state.sid,
                Direction::DongleToController,
                state.seq_in,
                payload,
            )
        };
        match result {
            Ok(plain) => {
                if let Some(state) = self.state.as_mut() {
                    state.seq_in += 1;
                }
                Ok(decode_exact_frame(&plain)?)
            }
            Err(err) => {
                // Cryptographic failure kills the session; a malformed
                // record is dropped without touching the counters.
                if matches!(err, shared::error::SecureChannelError::Auth(_)) {
                    self.state = None;
                }
                Err(err.into())
            }
        }
    }

    /// Send an application frame inside a record and wait for the expected
    /// inner reply opcode.
    pub fn request(
        &mut self,
        op: Opcode,
        payload: &[u8],
        expect: Opcode,
        timeout: Duration,
        what: &'static str,
    ) -> Result<Vec<u8>, HostError> {
        let wire = self.seal_app_frame(op, payload)?;
        self.transport.write_tx(&wire)?;

        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.recv_frame(deadline, what)?;
            match Opcode::try_from(frame.op) {
                Ok(Opcode::Record) => {
                    let inner = self.open_reply_record(&frame.payload)?;
                    if inner.op == u8::from(expect) {
                        return Ok(inner.payload);
                    }
                    if inner.op == u8::from(Opcode::Error) {
                        return Err(HostError::Device(
                            String::from_utf8_lossy(&inner.payload).into_owned(),
                        ));
                    }
                    log::debug!("ignoring inner frame 0x{:02X}", inner.op);
                }
                Ok(Opcode::Error) => {
                    return Err(HostError::Device(
                        String::from_utf8_lossy(&frame.payload).into_owned(),
                    ));
                }
                Ok(Opcode::Hello) => {
                    // The dongle tore the session down and is offering a
                    // fresh handshake.
                    self.state = None;
                    return Err(HostError::Device("session reset by dongle".into()));
                }
                _ => log::debug!("ignoring raw frame 0x{:02X}", frame.op),
            }
        }
    }

    /// `C1` info query; returns the ASCII summary string.
    pub fn get_info(&mut self) -> Result<String, HostError> {
        let payload = self.request(
            Opcode::GetInfo,
            &[],
            Opcode::InfoValue,
            INFO_TIMEOUT,
            "device info",
        )?;
        String::from_utf8(payload).map_err(|_| ProtocolError::BadFrame.into())
    }

    /// `C8 01`: arm the raw-HID fast path.
    pub fn enable_fast_keys(&mut self) -> Result<(), HostError> {
        let payload = self.request(
            Opcode::FastKeys,
            &[0x01],
            Opcode::Ack,
            INFO_TIMEOUT,
            "fast-keys acknowledgement",
        )?;
        if !payload.is_empty() {
            return Err(ProtocolError::BadFrame.into());
        }
        Ok(())
    }

    /// `D0`: type a string and verify the `D1` receipt, including the MD5
    /// over the exact bytes sent.
    pub fn send_string(&mut self, text: &str, add_newline: bool) -> Result<usize, HostError> {
        let mut bytes = text.as_bytes().to_vec();
        if add_newline {
            bytes.push(b'\n');
        }
        let expected_digest = md5_digest(&bytes);

        let reply = self.request(
            Opcode::SendString,
            &bytes,
            Opcode::SendResult,
            TYPE_TIMEOUT,
            "typing receipt",
        )?;
        if reply.len() != 17 {
            return Err(ProtocolError::BadLength {
                declared: 17,
                actual: reply.len(),
            }
            .into());
        }
        if reply[0] != 0x00 {
            return Err(HostError::Device(format!(
                "typing failed with status 0x{:02X}",
                reply[0]
            )));
        }
        if !ct_eq(&reply[1..], &expected_digest) {
            return Err(HostError::Device("typed-string digest mismatch".into()));
        }
        Ok(bytes.len())
    }

    /// `E0`: raw HID tap. Travels outside the record layer for latency, but
    /// only once a session is active and fast mode has been enabled.
    /// Fire-and-forget: no acknowledgement is expected.
    pub fn send_key_tap(&mut self, usage: u8, mods: u8, repeat: u8) -> Result<(), HostError> {
        if self.state.is_none() {
            return Err(HostError::NoSession);
        }
        let repeat = repeat.max(1);
        let mut payload = vec![mods, usage];
        if repeat > 1 {
            payload.push(repeat);
        }
        self.send_raw(Opcode::KeyTap, &payload)
    }
}
