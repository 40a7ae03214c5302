//! MTLS session layer: handshake transcripts, key schedule, and the B3
//! record format.
//!
//! A session is keyed by the long-term APPKEY (mutual authentication) and a
//! fresh P-256 ECDH exchange (forward secrecy). The dongle opens with
//! `B0 = srv_pub65 ‖ sid_le4`; the controller answers
//! `B1 = cli_pub65 ‖ keyx_mac16`; the dongle finishes with `B2 = sfin_mac16`.
//! Application frames then travel inside B3 records, encrypted with
//! AES-256-CTR and authenticated per direction and sequence number.
//!
//! Endianness is split deliberately and mirrors deployed devices: the `sid`
//! rides little-endian inside the B0 payload but is big-endian in every
//! transcript and record derivation, and the B3 `seq`/`clen` fields are
//! big-endian while the outer frame length stays little-endian. Each
//! encoding lives in exactly one named helper below.

use alloc::vec::Vec;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::crypto::{aes256_ctr, ct_eq, hkdf_sha256, hmac_sha256, mac16};
use crate::error::{AuthError, ProtocolError, SecureChannelError};

/// Uncompressed SEC1 point: `0x04 ‖ x ‖ y`.
pub const PUBLIC_KEY_LEN: usize = 65;
/// Truncated HMAC tag carried by handshake messages and records.
pub const TAG_LEN: usize = 16;
/// B0 payload: server public key plus little-endian session id.
pub const HELLO_LEN: usize = PUBLIC_KEY_LEN + 4;
/// B1 payload: client public key plus KEYX tag.
pub const KEY_EXCHANGE_LEN: usize = PUBLIC_KEY_LEN + TAG_LEN;
/// Fixed bytes of a B3 payload around the ciphertext: `seq ‖ clen ‖ … ‖ mac`.
pub const RECORD_OVERHEAD: usize = 2 + 2 + TAG_LEN;
/// Sending at this sequence would reuse IVs on wrap; the session must be
/// torn down and re-established first.
pub const SEQ_EXHAUSTED: u16 = 0xFFFF;

/// Direction tag bound into every record MAC and IV, preventing reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ControllerToDongle,
    DongleToController,
}

impl Direction {
    pub const fn tag(self) -> u8 {
        match self {
            Direction::ControllerToDongle => b'C',
            Direction::DongleToController => b'S',
        }
    }
}

/// `sid` as carried inside the B0 payload (little-endian).
pub fn encode_sid_for_b0(sid: u32) -> [u8; 4] {
    sid.to_le_bytes()
}

/// `sid` as bound into transcripts and record derivations (big-endian).
pub fn sid_transcript_bytes(sid: u32) -> [u8; 4] {
    sid.to_be_bytes()
}

/// `seq` as carried in B3 bodies and derivations (big-endian).
pub fn encode_seq_for_b3(seq: u16) -> [u8; 2] {
    seq.to_be_bytes()
}

/// Decoded B0 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub srv_pub: [u8; PUBLIC_KEY_LEN],
    pub sid: u32,
}

pub fn encode_hello(srv_pub: &[u8; PUBLIC_KEY_LEN], sid: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HELLO_LEN);
    out.extend_from_slice(srv_pub);
    out.extend_from_slice(&encode_sid_for_b0(sid));
    out
}

pub fn decode_hello(payload: &[u8]) -> Result<Hello, ProtocolError> {
    if payload.len() != HELLO_LEN {
        return Err(ProtocolError::BadLength {
            declared: HELLO_LEN,
            actual: payload.len(),
        });
    }
    let mut srv_pub = [0u8; PUBLIC_KEY_LEN];
    srv_pub.copy_from_slice(&payload[..PUBLIC_KEY_LEN]);
    let sid = u32::from_le_bytes([payload[65], payload[66], payload[67], payload[68]]);
    Ok(Hello { srv_pub, sid })
}

/// Generate a fresh ephemeral keypair, returning the secret and the
/// uncompressed public encoding sent on the wire.
pub fn generate_keypair(rng: &mut impl CryptoRngCore) -> (EphemeralSecret, [u8; PUBLIC_KEY_LEN]) {
    let secret = EphemeralSecret::random(rng);
    let point = secret.public_key().to_encoded_point(false);
    let mut encoded = [0u8; PUBLIC_KEY_LEN];
    encoded.copy_from_slice(point.as_bytes());
    (secret, encoded)
}

/// Parse and validate a peer public key: exactly 65 bytes, uncompressed
/// marker, on the curve, and not the identity point.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, ProtocolError> {
    if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != 0x04 {
        return Err(ProtocolError::BadFrame);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| ProtocolError::BadFrame)
}

/// ECDH shared secret: the x-coordinate, 32 bytes.
pub fn ecdh_x(secret: &EphemeralSecret, peer: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = secret.diffie_hellman(peer);
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(shared.raw_secret_bytes());
    out
}

fn transcript(label: &[u8], sid: u32, srv_pub: &[u8; 65], cli_pub: &[u8; 65]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(label.len() + 4 + 2 * PUBLIC_KEY_LEN);
    msg.extend_from_slice(label);
    msg.extend_from_slice(&sid_transcript_bytes(sid));
    msg.extend_from_slice(srv_pub);
    msg.extend_from_slice(cli_pub);
    msg
}

/// B1 tag: `HMAC(APPKEY, "KEYX" ‖ sid_be ‖ srv_pub ‖ cli_pub)[0..16]`.
pub fn keyx_mac(appkey: &[u8; 32], sid: u32, srv_pub: &[u8; 65], cli_pub: &[u8; 65]) -> [u8; 16] {
    mac16(appkey, &transcript(b"KEYX", sid, srv_pub, cli_pub))
}

/// Master session key:
/// `HKDF(salt = APPKEY, ikm = ECDH-x, info = "MT1" ‖ sid_be ‖ srv ‖ cli)`.
pub fn derive_session_key(
    appkey: &[u8; 32],
    shared_x: &[u8; 32],
    sid: u32,
    srv_pub: &[u8; 65],
    cli_pub: &[u8; 65],
) -> Zeroizing<[u8; 32]> {
    hkdf_sha256(appkey, shared_x, &transcript(b"MT1", sid, srv_pub, cli_pub))
}

/// Per-direction traffic keys derived from the master session key.
pub struct TrafficKeys {
    k_enc: Zeroizing<[u8; 32]>,
    k_mac: Zeroizing<[u8; 32]>,
    k_iv: Zeroizing<[u8; 32]>,
}

impl TrafficKeys {
    pub fn derive(sess_key: &[u8; 32]) -> Self {
        Self {
            k_enc: Zeroizing::new(hmac_sha256(sess_key, b"ENC")),
            k_mac: Zeroizing::new(hmac_sha256(sess_key, b"MAC")),
            k_iv: Zeroizing::new(hmac_sha256(sess_key, b"IVK")),
        }
    }

    /// B2 tag: `HMAC(k_mac, "SFIN" ‖ sid_be ‖ srv_pub ‖ cli_pub)[0..16]`.
    pub fn server_finished_mac(
        &self,
        sid: u32,
        srv_pub: &[u8; 65],
        cli_pub: &[u8; 65],
    ) -> [u8; 16] {
        mac16(&self.k_mac[..], &transcript(b"SFIN", sid, srv_pub, cli_pub))
    }
}

fn record_iv(k_iv: &[u8; 32], sid: u32, dir: Direction, seq: u16) -> [u8; 16] {
    let mut msg = Vec::with_capacity(3 + 4 + 1 + 2);
    msg.extend_from_slice(b"IV1");
    msg.extend_from_slice(&sid_transcript_bytes(sid));
    msg.push(dir.tag());
    msg.extend_from_slice(&encode_seq_for_b3(seq));
    mac16(k_iv, &msg)
}

fn record_mac(k_mac: &[u8; 32], sid: u32, dir: Direction, seq: u16, cipher: &[u8]) -> [u8; 16] {
    let mut msg = Vec::with_capacity(4 + 4 + 1 + 2 + cipher.len());
    msg.extend_from_slice(b"ENCM");
    msg.extend_from_slice(&sid_transcript_bytes(sid));
    msg.push(dir.tag());
    msg.extend_from_slice(&encode_seq_for_b3(seq));
    msg.extend_from_slice(cipher);
    mac16(k_mac, &msg)
}

/// Build a B3 payload: `seq_be ‖ clen_be ‖ cipher ‖ mac16`.
///
/// The plaintext is a complete inner frame, including the zero-length case
/// `op ‖ 0x0000`.
pub fn seal_record(
    keys: &TrafficKeys,
    sid: u32,
    dir: Direction,
    seq: u16,
    plaintext: &[u8],
) -> Vec<u8> {
    let iv = record_iv(&keys.k_iv, sid, dir, seq);
    let cipher = aes256_ctr(&keys.k_enc, &iv, plaintext);
    let mac = record_mac(&keys.k_mac, sid, dir, seq, &cipher);

    let mut out = Vec::with_capacity(RECORD_OVERHEAD + cipher.len());
    out.extend_from_slice(&encode_seq_for_b3(seq));
    out.extend_from_slice(&(cipher.len() as u16).to_be_bytes());
    out.extend_from_slice(&cipher);
    out.extend_from_slice(&mac);
    out
}

/// Validate and decrypt a B3 payload, enforcing the receive order: lengths,
/// then MAC, then the exact expected sequence, then decryption.
pub fn open_record(
    keys: &TrafficKeys,
    sid: u32,
    dir: Direction,
    expected_seq: u16,
    payload: &[u8],
) -> Result<Vec<u8>, SecureChannelError> {
    if payload.len() < RECORD_OVERHEAD {
        return Err(ProtocolError::BadFrame.into());
    }
    let seq = u16::from_be_bytes([payload[0], payload[1]]);
    let clen = u16::from_be_bytes([payload[2], payload[3]]) as usize;
    if payload.len() != RECORD_OVERHEAD + clen {
        return Err(ProtocolError::BadLength {
            declared: clen,
            actual: payload.len() - RECORD_OVERHEAD,
        }
        .into());
    }

    let cipher = &payload[4..4 + clen];
    let mac_in = &payload[4 + clen..];
    let expected_mac = record_mac(&keys.k_mac, sid, dir, seq, cipher);
    if !ct_eq(&expected_mac, mac_in) {
        return Err(AuthError::BadMac.into());
    }
    if seq != expected_seq {
        return Err(AuthError::Replay.into());
    }

    let iv = record_iv(&keys.k_iv, sid, dir, seq);
    Ok(aes256_ctr(&keys.k_enc, &iv, cipher))
}
