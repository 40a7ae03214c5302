//! Shared fixtures: a deterministic engine and a hand-rolled controller that
//! drives the handshake and record layer from the client side.

use alloc::vec::Vec;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

use shared::frame::{decode_exact_frame, encode_frame, Frame};
use shared::session::{
    decode_hello, derive_session_key, ecdh_x, generate_keypair, keyx_mac, open_record,
    parse_public_key, seal_record, Direction, TrafficKeys,
};

use crate::config::MemoryDeviceStore;
use crate::hid::RecordingHid;
use crate::DongleEngine;

pub(crate) type TestEngine = DongleEngine<MemoryDeviceStore, RecordingHid, ChaCha20Rng>;

pub(crate) const SETUP_PASSWORD: &str = "hunter2";
pub(crate) const SETUP_ITERS: u32 = 1_000;

pub(crate) fn factory_engine() -> TestEngine {
    DongleEngine::new(
        MemoryDeviceStore::new(),
        RecordingHid::new(),
        ChaCha20Rng::seed_from_u64(0xD0),
    )
    .expect("memory store loads")
}

pub(crate) fn provisioned_engine() -> TestEngine {
    let mut engine = factory_engine();
    engine.run_setup(SETUP_PASSWORD, SETUP_ITERS);
    engine
}

pub(crate) fn parse_frame(wire: &[u8]) -> Frame {
    decode_exact_frame(wire).expect("complete wire frame")
}

pub(crate) fn wire_frame(op: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(op, payload).expect("payload within cap")
}

/// Client half of a session, driven manually so tests control every byte.
pub(crate) struct TestController {
    pub(crate) sid: u32,
    pub(crate) keys: TrafficKeys,
    pub(crate) seq_out: u16,
    pub(crate) seq_in: u16,
}

impl TestController {
    /// Connect and run the full handshake against the engine.
    pub(crate) fn establish(engine: &mut TestEngine) -> Self {
        let mut replies = engine.on_connect(0);
        assert_eq!(replies.len(), 1, "expected HELLO on connect");
        Self::from_hello(engine, &replies.remove(0))
    }

    pub(crate) fn from_hello(engine: &mut TestEngine, hello_wire: &[u8]) -> Self {
        let hello_frame = parse_frame(hello_wire);
        assert_eq!(hello_frame.op, 0xB0);
        let hello = decode_hello(&hello_frame.payload).expect("hello payload");

        let appkey = engine
            .config()
            .appkey
            .clone()
            .expect("engine is provisioned");
        let mut rng = ChaCha20Rng::seed_from_u64(0xC11E27);
        let (secret, cli_pub) = generate_keypair(&mut rng);
        let mac = keyx_mac(&appkey, hello.sid, &hello.srv_pub, &cli_pub);

        let mut b1 = Vec::with_capacity(cli_pub.len() + mac.len());
        b1.extend_from_slice(&cli_pub);
        b1.extend_from_slice(&mac);
        let mut replies = engine.push_chunk(&wire_frame(0xB1, &b1), 0);
        assert_eq!(replies.len(), 1, "expected server finished");
        let b2 = parse_frame(&replies.remove(0));
        assert_eq!(b2.op, 0xB2, "handshake refused: {:?}", b2.payload);

        let srv_key = parse_public_key(&hello.srv_pub).expect("server point");
        let shared_x = ecdh_x(&secret, &srv_key);
        let sess = derive_session_key(&appkey, &shared_x, hello.sid, &hello.srv_pub, &cli_pub);
        let keys = TrafficKeys::derive(&sess);
        assert_eq!(
            b2.payload,
            keys.server_finished_mac(hello.sid, &hello.srv_pub, &cli_pub),
            "server finished tag mismatch"
        );

        Self {
            sid: hello.sid,
            keys,
            seq_out: 0,
            seq_in: 0,
        }
    }

    /// Wrap an app frame in a record and return the complete wire frame.
    pub(crate) fn seal(&mut self, op: u8, payload: &[u8]) -> Vec<u8> {
        let inner = wire_frame(op, payload);
        let record = seal_record(
            &self.keys,
            self.sid,
            Direction::ControllerToDongle,
            self.seq_out,
            &inner,
        );
        self.seq_out += 1;
        wire_frame(0xB3, &record)
    }

    /// Open one record reply from the engine into its inner frame.
    pub(crate) fn open_reply(&mut self, wire: &[u8]) -> Frame {
        let frame = parse_frame(wire);
        assert_eq!(frame.op, 0xB3, "expected record, got op 0x{:02X}", frame.op);
        let plain = open_record(
            &self.keys,
            self.sid,
            Direction::DongleToController,
            self.seq_in,
            &frame.payload,
        )
        .expect("authentic reply record");
        self.seq_in += 1;
        decode_exact_frame(&plain).expect("inner frame")
    }
}
