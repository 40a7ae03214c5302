use shared::crypto::md5_digest;

use crate::config::Layout;
use crate::test_helpers::{parse_frame, provisioned_engine, wire_frame, TestController};

#[test]
fn set_layout_persists_and_acknowledges() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    let mut replies = engine.push_chunk(&controller.seal(0xC0, b"LAYOUT_DE_MAC"), 0);
    let ack = controller.open_reply(&replies.remove(0));
    assert_eq!(ack.op, 0x00);
    assert!(ack.payload.is_empty());
    assert_eq!(engine.config().layout, Layout::DeMac);
}

#[test]
fn unknown_layout_is_refused() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    let mut replies = engine.push_chunk(&controller.seal(0xC0, b"DVORAK_MOON"), 0);
    let error = controller.open_reply(&replies.remove(0));
    assert_eq!(error.op, 0xFF);
    assert_eq!(error.payload, b"bad layout".to_vec());
}

#[test]
fn info_reply_reports_layout_proto_and_firmware() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    let mut replies = engine.push_chunk(&controller.seal(0xC1, &[]), 0);
    let info = controller.open_reply(&replies.remove(0));
    assert_eq!(info.op, 0xC2);

    let text = core::str::from_utf8(&info.payload).expect("ascii info");
    assert!(text.starts_with("LAYOUT=US_WINLIN; PROTO=1.2; FW="), "{text}");
}

#[test]
fn send_string_types_and_returns_md5_receipt() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    let mut replies = engine.push_chunk(&controller.seal(0xD0, b"OK"), 0);
    let result = controller.open_reply(&replies.remove(0));
    assert_eq!(result.op, 0xD1);
    assert_eq!(result.payload.len(), 17);
    assert_eq!(result.payload[0], 0x00);
    assert_eq!(
        hex::encode(&result.payload[1..]).to_uppercase(),
        "E0AA021E21DDDBD6D8CECEC71E9CF564"
    );
    assert_eq!(engine.hid().typed, [b"OK".to_vec()]);
}

#[test]
fn md5_receipt_covers_exact_payload_bytes() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    let text = "line with newline\n";
    let mut replies = engine.push_chunk(&controller.seal(0xD0, text.as_bytes()), 0);
    let result = controller.open_reply(&replies.remove(0));
    assert_eq!(&result.payload[1..], &md5_digest(text.as_bytes())[..]);
}

#[test]
fn fast_keys_requires_one_mode_byte() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    let mut replies = engine.push_chunk(&controller.seal(0xC8, &[]), 0);
    let error = controller.open_reply(&replies.remove(0));
    assert_eq!(error.op, 0xFF);
    assert_eq!(error.payload, b"bad len".to_vec());

    let mut replies = engine.push_chunk(&controller.seal(0xC8, &[0x01, 0x01]), 0);
    assert_eq!(controller.open_reply(&replies.remove(0)).op, 0xFF);
    assert!(!engine.fast_keys_enabled());
}

#[test]
fn key_tap_is_gated_on_fast_mode() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    // Raw E0 before C8: refused, nothing tapped.
    let mut replies = engine.push_chunk(&wire_frame(0xE0, &[0x00, 0x04]), 0);
    let error = controller.open_reply(&replies.remove(0));
    assert_eq!(error.op, 0xFF);
    assert_eq!(error.payload, b"raw off".to_vec());
    assert!(engine.hid().taps.is_empty());

    let mut replies = engine.push_chunk(&controller.seal(0xC8, &[0x01]), 0);
    assert_eq!(controller.open_reply(&replies.remove(0)).op, 0x00);

    // Usage 0x04 = 'A'; fire-and-forget, so no reply frames at all.
    let replies = engine.push_chunk(&wire_frame(0xE0, &[0x00, 0x04]), 0);
    assert!(replies.is_empty());
    assert_eq!(engine.hid().taps, [(0x00, 0x04)]);
}

#[test]
fn key_tap_repeat_semantics() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);
    let mut replies = engine.push_chunk(&controller.seal(0xC8, &[0x01]), 0);
    controller.open_reply(&replies.remove(0));

    // Explicit repeat.
    engine.push_chunk(&wire_frame(0xE0, &[0x02, 0x05, 0x03]), 0);
    assert_eq!(engine.hid().taps.len(), 3);
    assert_eq!(engine.hid().taps[0], (0x02, 0x05));

    // Zero repeat is treated as one tap.
    engine.hid_mut().taps.clear();
    engine.push_chunk(&wire_frame(0xE0, &[0x00, 0x06, 0x00]), 0);
    assert_eq!(engine.hid().taps.len(), 1);

    // Malformed payload.
    let mut replies = engine.push_chunk(&wire_frame(0xE0, &[0x00]), 0);
    let error = controller.open_reply(&replies.remove(0));
    assert_eq!(error.payload, b"bad len".to_vec());
}

#[test]
fn factory_reset_rotates_appkey_and_clears_flags() {
    let mut engine = provisioned_engine();
    let before = engine.config().appkey.clone().unwrap();
    let mut controller = TestController::establish(&mut engine);

    let mut replies = engine.push_chunk(&controller.seal(0xC4, &[]), 0);
    assert_eq!(controller.open_reply(&replies.remove(0)).op, 0x00);

    let config = engine.config();
    assert_ne!(&config.appkey.as_ref().unwrap()[..], &before[..]);
    assert!(!config.appkey_released);
    assert!(!config.setup_done);
    // KDF parameters survive so the same setup password re-provisions.
    assert!(config.kdf.is_some());
}

#[test]
fn unknown_application_op_is_answered_with_bad_op() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    // 0xD1 is a reply opcode; a dongle never accepts it as a request.
    let mut replies = engine.push_chunk(&controller.seal(0xD1, &[]), 0);
    let error = controller.open_reply(&replies.remove(0));
    assert_eq!(error.op, 0xFF);
    assert_eq!(error.payload, b"bad op".to_vec());
}

#[test]
fn zero_length_payload_round_trips_through_records() {
    let mut engine = provisioned_engine();
    let mut controller = TestController::establish(&mut engine);

    // C1 with an empty payload exercises the zero-length inner frame path
    // in both directions (the ACK to C8 0x00 is empty as well).
    let mut replies = engine.push_chunk(&controller.seal(0xC8, &[0x00]), 0);
    let ack = controller.open_reply(&replies.remove(0));
    assert_eq!(ack.op, 0x00);
    assert!(ack.payload.is_empty());
}
