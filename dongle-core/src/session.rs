//! Server side of the MTLS session: HELLO emission with retransmission,
//! the B1 key exchange, and the B3 record counters.

use alloc::vec::Vec;
use p256::ecdh::EphemeralSecret;
use rand_core::CryptoRngCore;

use shared::error::SecureChannelError;
use shared::session::{
    derive_session_key, ecdh_x, encode_hello, generate_keypair, keyx_mac, open_record,
    parse_public_key, seal_record, Direction, TrafficKeys, KEY_EXCHANGE_LEN, PUBLIC_KEY_LEN,
    SEQ_EXHAUSTED, TAG_LEN,
};

/// Give up on an unanswered HELLO after this many retransmits.
pub(crate) const HELLO_RETRY_LIMIT: u8 = 10;
/// Pace between HELLO retransmits.
pub(crate) const HELLO_RETRY_INTERVAL_MS: u64 = 300;

/// Why a B1 key exchange was refused. Each maps to the ASCII reason of the
/// `0xFF` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyExchangeFailure {
    /// No HELLO outstanding (or a session is already active).
    NoHello,
    BadLength,
    BadMac,
    /// Client public key failed validation or the ECDH derivation failed.
    Derive,
}

impl KeyExchangeFailure {
    pub(crate) fn reason(self) -> &'static str {
        match self {
            KeyExchangeFailure::NoHello => "NOSESSION",
            KeyExchangeFailure::BadLength => "bad length",
            KeyExchangeFailure::BadMac => "BADMAC",
            KeyExchangeFailure::Derive => "DERIVE",
        }
    }
}

/// Outbound sequence space exhausted; the session must be re-established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SequenceExhausted;

/// One session at a time. Reset wipes everything, including the ephemeral
/// secret backing any outstanding HELLO.
pub(crate) struct ServerSession {
    active: bool,
    sid: u32,
    secret: Option<EphemeralSecret>,
    srv_pub: [u8; PUBLIC_KEY_LEN],
    keys: Option<TrafficKeys>,
    seq_in: u16,
    seq_out: u16,
    hello_cache: Option<Vec<u8>>,
    hello_retries: u8,
    hello_next_at_ms: u64,
}

impl Default for ServerSession {
    fn default() -> Self {
        Self {
            active: false,
            sid: 0,
            secret: None,
            srv_pub: [0u8; PUBLIC_KEY_LEN],
            keys: None,
            seq_in: 0,
            seq_out: 0,
            hello_cache: None,
            hello_retries: 0,
            hello_next_at_ms: 0,
        }
    }
}

impl ServerSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn sid(&self) -> u32 {
        self.sid
    }

    pub(crate) fn expected_seq_in(&self) -> u16 {
        self.seq_in
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Mint a fresh session id and ephemeral keypair and build the B0
    /// payload. The payload is cached for retransmission until a valid B1
    /// arrives or the retry budget runs out.
    pub(crate) fn start_hello(&mut self, rng: &mut impl CryptoRngCore, now_ms: u64) -> Vec<u8> {
        self.reset();
        self.sid = rng.next_u32();
        let (secret, srv_pub) = generate_keypair(rng);
        self.secret = Some(secret);
        self.srv_pub = srv_pub;

        let payload = encode_hello(&self.srv_pub, self.sid);
        self.hello_cache = Some(payload.clone());
        self.hello_retries = 0;
        self.hello_next_at_ms = now_ms + HELLO_RETRY_INTERVAL_MS;
        payload
    }

    /// Retransmit the cached HELLO when due. Returns the payload to resend.
    pub(crate) fn tick(&mut self, now_ms: u64) -> Option<Vec<u8>> {
        if self.active {
            return None;
        }
        if self.hello_retries >= HELLO_RETRY_LIMIT {
            self.hello_cache = None;
            return None;
        }
        let cache = self.hello_cache.as_ref()?;
        if now_ms < self.hello_next_at_ms {
            return None;
        }
        self.hello_retries += 1;
        self.hello_next_at_ms = now_ms + HELLO_RETRY_INTERVAL_MS;
        Some(cache.clone())
    }

    /// Process a B1 payload. On success the session goes active and the B2
    /// finished tag is returned. The HELLO cache is dropped and the ephemeral
    /// secret is consumed either way a key is derived.
    pub(crate) fn handle_key_exchange(
        &mut self,
        payload: &[u8],
        appkey: &[u8; 32],
    ) -> Result<[u8; TAG_LEN], KeyExchangeFailure> {
        if self.active || self.secret.is_none() {
            return Err(KeyExchangeFailure::NoHello);
        }
        if payload.len() != KEY_EXCHANGE_LEN {
            return Err(KeyExchangeFailure::BadLength);
        }

        let mut cli_pub = [0u8; PUBLIC_KEY_LEN];
        cli_pub.copy_from_slice(&payload[..PUBLIC_KEY_LEN]);
        let mac_in = &payload[PUBLIC_KEY_LEN..];

        let expected = keyx_mac(appkey, self.sid, &self.srv_pub, &cli_pub);
        if !shared::crypto::ct_eq(&expected, mac_in) {
            return Err(KeyExchangeFailure::BadMac);
        }

        let peer = parse_public_key(&cli_pub).map_err(|_| KeyExchangeFailure::Derive)?;
        let secret = self.secret.take().ok_or(KeyExchangeFailure::NoHello)?;
        let shared_x = ecdh_x(&secret, &peer);
        let sess_key = derive_session_key(appkey, &shared_x, self.sid, &self.srv_pub, &cli_pub);
        let keys = TrafficKeys::derive(&sess_key);
        let finished = keys.server_finished_mac(self.sid, &self.srv_pub, &cli_pub);

        self.keys = Some(keys);
        self.active = true;
        self.seq_in = 0;
        self.seq_out = 0;
        self.hello_cache = None;
        self.hello_retries = 0;
        Ok(finished)
    }

    /// Validate and decrypt an inbound record; bumps `seq_in` only when the
    /// record is accepted.
    pub(crate) fn open_incoming(&mut self, payload: &[u8]) -> Result<Vec<u8>, SecureChannelError> {
        let keys = self.keys.as_ref().expect("open_incoming requires an active session");
        let plain = open_record(
            keys,
            self.sid,
            Direction::ControllerToDongle,
            self.seq_in,
            payload,
        )?;
        self.seq_in += 1;
        Ok(plain)
    }

    /// Encrypt an outbound inner frame as a B3 payload. Refuses to touch the
    /// final sequence value: IV reuse after a wrap would be fatal, so the
    /// session is marked inactive instead.
    pub(crate) fn seal_outgoing(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SequenceExhausted> {
        if self.seq_out == SEQ_EXHAUSTED {
            self.active = false;
            return Err(SequenceExhausted);
        }
        let keys = self.keys.as_ref().expect("seal_outgoing requires an active session");
        let payload = seal_record(
            keys,
            self.sid,
            Direction::DongleToController,
            self.seq_out,
            plaintext,
        );
        self.seq_out += 1;
        Ok(payload)
    }

    #[cfg(test)]
    pub(crate) fn force_seq_out(&mut self, seq: u16) {
        self.seq_out = seq;
    }
}
