//! APPKEY provisioning formulas shared by both ends of the A0/A2/A3/A1
//! exchange.
//!
//! The dongle proves nothing here; the controller proves knowledge of the
//! setup password via the PBKDF2 verifier, and the dongle answers with the
//! long-term APPKEY wrapped under a one-time key derived from the same
//! verifier and challenge. Wrapping keeps the APPKEY opaque to passive
//! observers of the BLE link.

use alloc::vec::Vec;
use zeroize::Zeroizing;

use crate::crypto::{aes256_ctr, ct_eq, hmac_sha256, mac16};
use crate::error::{AuthError, ProtocolError, SecureChannelError};

pub const SALT_LEN: usize = 16;
pub const CHALLENGE_LEN: usize = 16;
pub const APPKEY_LEN: usize = 32;
/// The A3 proof is the untruncated HMAC.
pub const PROOF_LEN: usize = 32;
/// Wrapped A1 payload: 32-byte ciphertext plus 16-byte tag.
pub const WRAPPED_LEN: usize = APPKEY_LEN + 16;
/// A2 payload: salt ‖ iters_le ‖ challenge.
pub const CHALLENGE_PAYLOAD_LEN: usize = SALT_LEN + 4 + CHALLENGE_LEN;

/// Decoded A2 challenge payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub salt: [u8; SALT_LEN],
    pub iters: u32,
    pub chal: [u8; CHALLENGE_LEN],
}

/// Encode the A2 payload: `salt16 ‖ iters_le4 ‖ chal16`.
pub fn encode_challenge(salt: &[u8; SALT_LEN], iters: u32, chal: &[u8; CHALLENGE_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHALLENGE_PAYLOAD_LEN);
    out.extend_from_slice(salt);
    out.extend_from_slice(&iters.to_le_bytes());
    out.extend_from_slice(chal);
    out
}

pub fn decode_challenge(payload: &[u8]) -> Result<Challenge, ProtocolError> {
    if payload.len() != CHALLENGE_PAYLOAD_LEN {
        return Err(ProtocolError::BadLength {
            declared: CHALLENGE_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&payload[..SALT_LEN]);
    let iters = u32::from_le_bytes([payload[16], payload[17], payload[18], payload[19]]);
    let mut chal = [0u8; CHALLENGE_LEN];
    chal.copy_from_slice(&payload[20..]);

    if iters == 0 {
        return Err(ProtocolError::BadFrame);
    }
    Ok(Challenge { salt, iters, chal })
}

/// A3 proof: `HMAC(verifier, "APPKEY" ‖ chal)`, sent in full.
pub fn proof_mac(verifier: &[u8; 32], chal: &[u8; CHALLENGE_LEN]) -> [u8; PROOF_LEN] {
    let mut msg = Vec::with_capacity(6 + CHALLENGE_LEN);
    msg.extend_from_slice(b"APPKEY");
    msg.extend_from_slice(chal);
    hmac_sha256(verifier, &msg)
}

fn wrap_key(verifier: &[u8; 32], chal: &[u8; CHALLENGE_LEN]) -> Zeroizing<[u8; 32]> {
    let mut msg = Vec::with_capacity(6 + CHALLENGE_LEN);
    msg.extend_from_slice(b"AKWRAP");
    msg.extend_from_slice(chal);
    Zeroizing::new(hmac_sha256(verifier, &msg))
}

// The IV is keyed by the verifier, not the wrap key. Deployed devices derive
// it this way, so both sides must keep doing so to stay interoperable.
fn wrap_iv(verifier: &[u8; 32], chal: &[u8; CHALLENGE_LEN]) -> [u8; 16] {
    let mut msg = Vec::with_capacity(4 + CHALLENGE_LEN);
    msg.extend_from_slice(b"AKIV");
    msg.extend_from_slice(chal);
    mac16(verifier, &msg)
}

fn wrap_mac(key: &[u8; 32], chal: &[u8; CHALLENGE_LEN], cipher: &[u8]) -> [u8; 16] {
    let mut msg = Vec::with_capacity(5 + CHALLENGE_LEN + cipher.len());
    msg.extend_from_slice(b"AKMAC");
    msg.extend_from_slice(chal);
    msg.extend_from_slice(cipher);
    mac16(key, &msg)
}

/// Produce the wrapped A1 payload: `cipher32 ‖ mac16`.
pub fn wrap_appkey(
    verifier: &[u8; 32],
    chal: &[u8; CHALLENGE_LEN],
    appkey: &[u8; APPKEY_LEN],
) -> Vec<u8> {
    let key = wrap_key(verifier, chal);
    let iv = wrap_iv(verifier, chal);
    let cipher = aes256_ctr(&key, &iv, appkey);
    let mac = wrap_mac(&key, chal, &cipher);

    let mut out = Vec::with_capacity(WRAPPED_LEN);
    out.extend_from_slice(&cipher);
    out.extend_from_slice(&mac);
    out
}

/// Recover the APPKEY from an A1 payload.
///
/// Accepts the preferred 48-byte wrapped form and the legacy 32-byte clear
/// form still emitted by old firmware. Wrapped payloads are authenticated
/// before decryption.
pub fn unwrap_appkey(
    verifier: &[u8; 32],
    chal: &[u8; CHALLENGE_LEN],
    payload: &[u8],
) -> Result<Zeroizing<[u8; APPKEY_LEN]>, SecureChannelError> {
    match payload.len() {
        APPKEY_LEN => {
            let mut key = [0u8; APPKEY_LEN];
            key.copy_from_slice(payload);
            Ok(Zeroizing::new(key))
        }
        WRAPPED_LEN => {
            let (cipher, mac_in) = payload.split_at(APPKEY_LEN);
            let key = wrap_key(verifier, chal);
            let expected = wrap_mac(&key, chal, cipher);
            if !ct_eq(&expected, mac_in) {
                return Err(AuthError::BadMac.into());
            }

            let iv = wrap_iv(verifier, chal);
            let plain = aes256_ctr(&key, &iv, cipher);
            let mut out = Zeroizing::new([0u8; APPKEY_LEN]);
            out.copy_from_slice(&plain);
            Ok(out)
        }
        other => Err(ProtocolError::BadLength {
            declared: WRAPPED_LEN,
            actual: other,
        }
        .into()),
    }
}
