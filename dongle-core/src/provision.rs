//! Server side of the APPKEY onboarding exchange (A0/A2/A3/A1).
//!
//! The challenge lives only in RAM: it is cleared after every proof attempt
//! and lost on reboot. Proof failures count against a boot-scoped budget;
//! once exhausted, both A0 and A3 are refused until the dongle restarts.

use alloc::vec::Vec;
use rand_core::CryptoRngCore;

use shared::error::PolicyError;
use shared::provision::{encode_challenge, proof_mac, wrap_appkey, CHALLENGE_LEN, PROOF_LEN};

use crate::config::DeviceConfig;

/// Proof failures tolerated per boot before provisioning locks out.
pub const MAX_PROOF_FAILURES: u16 = 100;

/// Outcome of an A0 or A3 frame.
pub(crate) enum ProvisionReply {
    /// A2 payload: fresh challenge plus the stored KDF parameters.
    Challenge(Vec<u8>),
    /// A1 payload: the wrapped APPKEY. The engine marks it released.
    Wrapped(Vec<u8>),
    /// `0xFF` with this reason.
    Refused(&'static str),
}

#[derive(Default)]
pub(crate) struct Provisioner {
    chal: [u8; CHALLENGE_LEN],
    pending: bool,
    fail_count: u16,
}

impl Provisioner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn fail_count(&self) -> u16 {
        self.fail_count
    }

    fn rate_limited(&self) -> bool {
        self.fail_count >= MAX_PROOF_FAILURES
    }

    fn clear_challenge(&mut self) {
        self.chal = [0u8; CHALLENGE_LEN];
        self.pending = false;
    }

    /// A0: hand out KDF parameters and a fresh challenge.
    pub(crate) fn handle_request(
        &mut self,
        config: &DeviceConfig,
        rng: &mut impl CryptoRngCore,
    ) -> ProvisionReply {
        if self.rate_limited() {
            return ProvisionReply::Refused(PolicyError::RateLimited.reason());
        }
        if config.appkey_released && !config.multi_app {
            return ProvisionReply::Refused(PolicyError::LockedSingle.reason());
        }
        let kdf = match (&config.kdf, &config.appkey) {
            (Some(kdf), Some(_)) => kdf,
            _ => return ProvisionReply::Refused(PolicyError::KdfMissing.reason()),
        };

        rng.fill_bytes(&mut self.chal);
        self.pending = true;
        log::info!("provisioning challenge issued (iters={})", kdf.iters);
        ProvisionReply::Challenge(encode_challenge(&kdf.salt, kdf.iters, &self.chal))
    }

    /// A3: verify the password proof and, on success, wrap the APPKEY.
    /// The challenge is single-use whatever the outcome.
    pub(crate) fn handle_proof(
        &mut self,
        payload: &[u8],
        config: &DeviceConfig,
    ) -> ProvisionReply {
        if self.rate_limited() {
            return ProvisionReply::Refused(PolicyError::RateLimited.reason());
        }
        if !self.pending || payload.len() != PROOF_LEN {
            self.clear_challenge();
            return ProvisionReply::Refused("no pending challenge");
        }

        let (kdf, appkey) = match (&config.kdf, &config.appkey) {
            (Some(kdf), Some(appkey)) => (kdf, appkey),
            _ => {
                self.clear_challenge();
                return ProvisionReply::Refused(PolicyError::KdfMissing.reason());
            }
        };

        let expected = proof_mac(&kdf.verifier, &self.chal);
        if !shared::crypto::ct_eq(&expected, payload) {
            self.fail_count += 1;
            log::warn!("provisioning proof rejected ({} failures)", self.fail_count);
            self.clear_challenge();
            return ProvisionReply::Refused("bad proof");
        }

        let wrapped = wrap_appkey(&kdf.verifier, &self.chal, appkey);
        self.clear_challenge();
        log::info!("provisioning proof accepted; releasing wrapped APPKEY");
        ProvisionReply::Wrapped(wrapped)
    }
}
