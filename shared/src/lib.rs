#![cfg_attr(not(feature = "std"), no_std)]

//! Protocol types shared between the BluKey controller and the dongle engine.
//!
//! Everything on the wire is binary: `op ‖ len_le16 ‖ payload`. The modules
//! here cover the chunk reassembler, the cryptographic primitives, the APPKEY
//! provisioning formulas, and the MTLS session layer (handshake transcripts,
//! key schedule, and the B3 record layer). Both sides of the link depend on
//! this crate so a single set of encoders and test vectors keeps them honest.

extern crate alloc;

pub mod crypto;
pub mod error;
pub mod frame;
pub mod provision;
pub mod session;

/// Protocol revision reported in the `C2` info string.
pub const PROTOCOL_VERSION: &str = "1.2";
