//! Cryptographic primitives used by provisioning and the session layer.
//!
//! Thin, allocation-light wrappers over the RustCrypto crates. Key-sized
//! outputs come back as fixed arrays, secrets as [`Zeroizing`] values; no
//! context handles leak out of this module.

use aes::Aes256;
use alloc::vec::Vec;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// HMAC-SHA256 over `msg` with an arbitrary-length key.
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA256 truncated to the 16-byte tag used throughout the protocol.
pub fn mac16(key: &[u8], msg: &[u8]) -> [u8; 16] {
    let full = hmac_sha256(key, msg);
    let mut out = [0u8; 16];
    out.copy_from_slice(&full[..16]);
    out
}

/// HKDF-SHA256 with a single 32-byte output block.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8]) -> Zeroizing<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    Zeroizing::new(okm)
}

/// PBKDF2-HMAC-SHA256 producing the 32-byte password verifier.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iters: u32) -> Zeroizing<[u8; 32]> {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iters, &mut out);
    Zeroizing::new(out)
}

/// AES-256-CTR keystream application. Encryption and decryption are the same
/// operation; the counter runs big-endian over the whole 128-bit block.
pub fn aes256_ctr(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(&mut buf);
    buf
}

/// MD5 digest, used only for the `D1` typed-string receipt.
pub fn md5_digest(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// Constant-time equality for MACs and key material.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
