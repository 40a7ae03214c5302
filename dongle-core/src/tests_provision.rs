use alloc::vec;

use shared::crypto::pbkdf2_sha256;
use shared::provision::{decode_challenge, proof_mac, unwrap_appkey, PROOF_LEN};

use crate::provision::MAX_PROOF_FAILURES;
use crate::test_helpers::{
    factory_engine, parse_frame, provisioned_engine, wire_frame, SETUP_PASSWORD,
};

#[test]
fn request_returns_kdf_params_and_challenge() {
    let mut engine = provisioned_engine();
    engine.on_connect(0);

    let mut replies = engine.push_chunk(&wire_frame(0xA0, &[]), 0);
    assert_eq!(replies.len(), 1);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xA2);

    let challenge = decode_challenge(&frame.payload).expect("challenge payload");
    let kdf = engine.config().kdf.as_ref().unwrap();
    assert_eq!(challenge.salt, kdf.salt);
    assert_eq!(challenge.iters, kdf.iters);
}

#[test]
fn full_exchange_releases_wrapped_appkey_once() {
    let mut engine = provisioned_engine();
    engine.on_connect(0);

    let mut replies = engine.push_chunk(&wire_frame(0xA0, &[]), 0);
    let challenge = decode_challenge(&parse_frame(&replies.remove(0)).payload).unwrap();

    let verif = pbkdf2_sha256(SETUP_PASSWORD.as_bytes(), &challenge.salt, challenge.iters);
    let proof = proof_mac(&verif, &challenge.chal);
    let mut replies = engine.push_chunk(&wire_frame(0xA3, &proof), 0);
    assert_eq!(replies.len(), 1);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xA1);

    let recovered = unwrap_appkey(&verif, &challenge.chal, &frame.payload).expect("unwrap");
    assert_eq!(
        &recovered[..],
        &engine.config().appkey.as_ref().unwrap()[..]
    );
    assert!(engine.config().appkey_released);

    // Single-app lock: a second controller is refused until factory reset.
    let mut replies = engine.push_chunk(&wire_frame(0xA0, &[]), 0);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xFF);
    assert_eq!(frame.payload, b"LOCKED_SINGLE_NEED_RESET".to_vec());
}

#[test]
fn wrong_password_is_refused_and_challenge_is_single_use() {
    let mut engine = provisioned_engine();
    engine.on_connect(0);

    let mut replies = engine.push_chunk(&wire_frame(0xA0, &[]), 0);
    let challenge = decode_challenge(&parse_frame(&replies.remove(0)).payload).unwrap();

    let verif = pbkdf2_sha256(b"wrong password", &challenge.salt, challenge.iters);
    let proof = proof_mac(&verif, &challenge.chal);
    let mut replies = engine.push_chunk(&wire_frame(0xA3, &proof), 0);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xFF);
    assert_eq!(frame.payload, b"bad proof".to_vec());
    assert!(!engine.config().appkey_released);

    // The challenge died with the attempt; a correct retry needs a new A0.
    let good = pbkdf2_sha256(SETUP_PASSWORD.as_bytes(), &challenge.salt, challenge.iters);
    let proof = proof_mac(&good, &challenge.chal);
    let mut replies = engine.push_chunk(&wire_frame(0xA3, &proof), 0);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xFF);
    assert_eq!(frame.payload, b"no pending challenge".to_vec());
}

#[test]
fn proof_without_challenge_or_with_bad_size_is_refused() {
    let mut engine = provisioned_engine();
    engine.on_connect(0);

    let mut replies = engine.push_chunk(&wire_frame(0xA3, &[0u8; PROOF_LEN]), 0);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xFF);
    assert_eq!(frame.payload, b"no pending challenge".to_vec());

    engine.push_chunk(&wire_frame(0xA0, &[]), 0);
    let mut replies = engine.push_chunk(&wire_frame(0xA3, &[0u8; 16]), 0);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.payload, b"no pending challenge".to_vec());
}

#[test]
fn unprovisioned_device_reports_missing_kdf() {
    let mut engine = factory_engine();
    engine.on_connect(0);

    let mut replies = engine.push_chunk(&wire_frame(0xA0, &[]), 0);
    let frame = parse_frame(&replies.remove(0));
    assert_eq!(frame.op, 0xFF);
    assert_eq!(frame.payload, b"KDF missing".to_vec());
}

#[test]
fn repeated_failures_lock_out_provisioning_until_reboot() {
    let mut engine = provisioned_engine();
    engine.on_connect(0);

    for _ in 0..MAX_PROOF_FAILURES {
        engine.push_chunk(&wire_frame(0xA0, &[]), 0);
        let mut replies = engine.push_chunk(&wire_frame(0xA3, &[0u8; PROOF_LEN]), 0);
        let frame = parse_frame(&replies.remove(0));
        assert_eq!(frame.payload, b"bad proof".to_vec());
    }

    for op in [0xA0, 0xA3] {
        let payload = if op == 0xA3 {
            vec![0u8; PROOF_LEN]
        } else {
            vec![]
        };
        let mut replies = engine.push_chunk(&wire_frame(op, &payload), 0);
        let frame = parse_frame(&replies.remove(0));
        assert_eq!(frame.op, 0xFF);
        assert_eq!(frame.payload, b"rate limited".to_vec());
    }
}

#[test]
fn application_ops_are_refused_before_session() {
    let mut engine = provisioned_engine();
    engine.on_connect(0);

    for op in [0xC0, 0xC1, 0xC8, 0xD0, 0xE0] {
        let mut replies = engine.push_chunk(&wire_frame(op, &[]), 0);
        assert_eq!(replies.len(), 1, "op 0x{op:02X}");
        let frame = parse_frame(&replies.remove(0));
        assert_eq!(frame.op, 0xFF);
        assert_eq!(frame.payload, b"need MTLS".to_vec());
    }
}
