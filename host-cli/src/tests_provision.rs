use shared::crypto::pbkdf2_sha256;
use shared::frame::decode_exact_frame;
use shared::provision::{encode_challenge, proof_mac, wrap_appkey};

use crate::error::HostError;
use crate::session::ClientSession;
use crate::transport::memory::MemoryBleTransport;

const SALT: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F,
];
const CHAL: [u8; 16] = [
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
    0x1F,
];
const ITERS: u32 = 10_000;

fn fixture_appkey() -> [u8; 32] {
    let mut appkey = [0u8; 32];
    for (i, byte) in appkey.iter_mut().enumerate() {
        *byte = 0x20 + i as u8;
    }
    appkey
}

#[test]
fn provision_flow_recovers_wrapped_appkey() {
    let appkey = fixture_appkey();
    let verifier = pbkdf2_sha256(b"hunter2", &SALT, ITERS);

    let mut transport = MemoryBleTransport::new();
    transport.queue_frame(0xA2, &encode_challenge(&SALT, ITERS, &CHAL));
    transport.queue_frame(0xA1, &wrap_appkey(&verifier, &CHAL, &appkey));

    let recovered = {
        let mut session = ClientSession::new(&mut transport);
        session.provision("hunter2").expect("provisioning flow")
    };
    assert_eq!(&recovered[..], &appkey[..]);

    // The controller sent A0 and then the full 32-byte proof.
    assert_eq!(transport.written.len(), 2);
    let a0 = decode_exact_frame(&transport.written[0]).expect("A0 frame");
    assert_eq!((a0.op, a0.payload.len()), (0xA0, 0));
    let a3 = decode_exact_frame(&transport.written[1]).expect("A3 frame");
    assert_eq!(a3.op, 0xA3);
    assert_eq!(a3.payload, proof_mac(&verifier, &CHAL).to_vec());
}

#[test]
fn legacy_clear_appkey_is_accepted() {
    let appkey = fixture_appkey();
    let mut transport = MemoryBleTransport::new();
    transport.queue_frame(0xA2, &encode_challenge(&SALT, ITERS, &CHAL));
    transport.queue_frame(0xA1, &appkey);

    let mut session = ClientSession::new(&mut transport);
    let recovered = session.provision("hunter2").expect("legacy payload");
    assert_eq!(&recovered[..], &appkey[..]);
}

#[test]
fn device_refusal_surfaces_the_reason() {
    let mut transport = MemoryBleTransport::new();
    transport.queue_frame(0xFF, b"LOCKED_SINGLE_NEED_RESET");

    let mut session = ClientSession::new(&mut transport);
    let err = session.provision("hunter2").expect_err("refused");
    match err {
        HostError::Device(reason) => assert_eq!(reason, "LOCKED_SINGLE_NEED_RESET"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_challenge_is_a_protocol_error() {
    let mut transport = MemoryBleTransport::new();
    transport.queue_frame(0xA2, &[0u8; 10]);

    let mut session = ClientSession::new(&mut transport);
    let err = session.provision("hunter2").expect_err("short challenge");
    assert!(matches!(err, HostError::Protocol(_)), "{err}");
}

#[test]
fn tampered_wrapped_appkey_is_an_auth_error() {
    let appkey = fixture_appkey();
    let verifier = pbkdf2_sha256(b"hunter2", &SALT, ITERS);
    let mut wrapped = wrap_appkey(&verifier, &CHAL, &appkey);
    wrapped[40] ^= 0x01;

    let mut transport = MemoryBleTransport::new();
    transport.queue_frame(0xA2, &encode_challenge(&SALT, ITERS, &CHAL));
    transport.queue_frame(0xA1, &wrapped);

    let mut session = ClientSession::new(&mut transport);
    let err = session.provision("hunter2").expect_err("tampered payload");
    assert!(matches!(err, HostError::Auth(_)), "{err}");
}

#[test]
fn silence_times_out() {
    let mut transport = MemoryBleTransport::new();
    let mut session = ClientSession::new(&mut transport);
    let err = session.provision("hunter2").expect_err("no reply");
    assert!(matches!(err, HostError::Timeout(_)), "{err}");
}
