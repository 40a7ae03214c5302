//! HID output collaborator contract.

use alloc::vec::Vec;

/// Keystroke sink. Real firmware backs this with the USB HID interface and
/// its layout tables; the engine never looks inside.
pub trait HidOutput {
    /// Layout-aware typing of a UTF-8 byte string.
    fn type_utf8(&mut self, text: &[u8]);

    /// Press and release a raw HID usage with the given modifier bits.
    fn tap(&mut self, mods: u8, usage: u8);
}

/// Records every keystroke for assertions; also backs the host simulator.
#[derive(Debug, Default)]
pub struct RecordingHid {
    pub typed: Vec<Vec<u8>>,
    pub taps: Vec<(u8, u8)>,
}

impl RecordingHid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HidOutput for RecordingHid {
    fn type_utf8(&mut self, text: &[u8]) {
        self.typed.push(text.to_vec());
    }

    fn tap(&mut self, mods: u8, usage: u8) {
        self.taps.push((mods, usage));
    }
}
