//! Persisted dongle configuration and the keyboard-layout registry.

use alloc::string::{String, ToString};
use core::fmt;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use shared::crypto::pbkdf2_sha256;
use shared::provision::{APPKEY_LEN, SALT_LEN};

/// Advertised name used until the owner renames the device.
pub const DEFAULT_DEVICE_NAME: &str = "BluKey Dongle";

/// PBKDF2 iteration count applied to a fresh setup password.
pub const DEFAULT_KDF_ITERS: u32 = 10_000;

/// Password KDF parameters fixed at first-run setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: [u8; SALT_LEN],
    pub iters: u32,
    pub verifier: [u8; 32],
}

/// Keyboard layouts the typing path knows how to drive. Only the identifier
/// registry lives here; the scancode tables belong to the HID collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    UsWinlin,
    UkWinlin,
    IeWinlin,
    UsMac,
    UkMac,
    IeMac,
    DeWinlin,
    DeMac,
    FrWinlin,
    FrMac,
    EsWinlin,
    EsMac,
    ItWinlin,
    ItMac,
    PtPtWinlin,
    PtPtMac,
    PtBrWinlin,
    PtBrMac,
    SeWinlin,
    NoWinlin,
    DkWinlin,
    FiWinlin,
    ChDeWinlin,
    ChFrWinlin,
    TrWinlin,
    TrMac,
}

impl Layout {
    pub const ALL: [Layout; 26] = [
        Layout::UsWinlin,
        Layout::UkWinlin,
        Layout::IeWinlin,
        Layout::UsMac,
        Layout::UkMac,
        Layout::IeMac,
        Layout::DeWinlin,
        Layout::DeMac,
        Layout::FrWinlin,
        Layout::FrMac,
        Layout::EsWinlin,
        Layout::EsMac,
        Layout::ItWinlin,
        Layout::ItMac,
        Layout::PtPtWinlin,
        Layout::PtPtMac,
        Layout::PtBrWinlin,
        Layout::PtBrMac,
        Layout::SeWinlin,
        Layout::NoWinlin,
        Layout::DkWinlin,
        Layout::FiWinlin,
        Layout::ChDeWinlin,
        Layout::ChFrWinlin,
        Layout::TrWinlin,
        Layout::TrMac,
    ];

    /// Short identifier, as reported in the `C2` info string.
    pub fn name(self) -> &'static str {
        match self {
            Layout::UsWinlin => "US_WINLIN",
            Layout::UkWinlin => "UK_WINLIN",
            Layout::IeWinlin => "IE_WINLIN",
            Layout::UsMac => "US_MAC",
            Layout::UkMac => "UK_MAC",
            Layout::IeMac => "IE_MAC",
            Layout::DeWinlin => "DE_WINLIN",
            Layout::DeMac => "DE_MAC",
            Layout::FrWinlin => "FR_WINLIN",
            Layout::FrMac => "FR_MAC",
            Layout::EsWinlin => "ES_WINLIN",
            Layout::EsMac => "ES_MAC",
            Layout::ItWinlin => "IT_WINLIN",
            Layout::ItMac => "IT_MAC",
            Layout::PtPtWinlin => "PT_PT_WINLIN",
            Layout::PtPtMac => "PT_PT_MAC",
            Layout::PtBrWinlin => "PT_BR_WINLIN",
            Layout::PtBrMac => "PT_BR_MAC",
            Layout::SeWinlin => "SE_WINLIN",
            Layout::NoWinlin => "NO_WINLIN",
            Layout::DkWinlin => "DK_WINLIN",
            Layout::FiWinlin => "FI_WINLIN",
            Layout::ChDeWinlin => "CH_DE_WINLIN",
            Layout::ChFrWinlin => "CH_FR_WINLIN",
            Layout::TrWinlin => "TR_WINLIN",
            Layout::TrMac => "TR_MAC",
        }
    }

    /// Resolve a layout from its ASCII name, with or without the historical
    /// `LAYOUT_` prefix. Surrounding whitespace is ignored.
    pub fn from_name(raw: &str) -> Option<Layout> {
        let name = raw.trim();
        let name = name.strip_prefix("LAYOUT_").unwrap_or(name);
        Self::ALL.iter().copied().find(|layout| layout.name() == name)
    }
}

/// Everything the dongle persists across power cycles. The engine treats the
/// backing store as opaque key/value storage; only the KDF parameters and the
/// APPKEY feed directly into the protocol.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// BLE advertised name.
    pub name: String,
    pub layout: Layout,
    pub kdf: Option<KdfParams>,
    /// Long-term PSK shared with provisioned controllers.
    pub appkey: Option<Zeroizing<[u8; APPKEY_LEN]>>,
    /// First-run setup completed.
    pub setup_done: bool,
    /// Allow provisioning more than one controller identity.
    pub multi_app: bool,
    /// Allow bonding more than one central.
    pub multi_device: bool,
    /// Close the pairing window after the first bond.
    pub pair_lock: bool,
    /// 6-digit BLE pairing passkey shown on the device display.
    pub passkey: u32,
    /// The APPKEY has been handed to at least one controller.
    pub appkey_released: bool,
}

impl DeviceConfig {
    /// Factory state: nothing provisioned, US layout, pairing open.
    pub fn factory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            layout: Layout::UsWinlin,
            kdf: None,
            appkey: None,
            setup_done: false,
            multi_app: false,
            multi_device: false,
            pair_lock: false,
            passkey: 0,
            appkey_released: false,
        }
    }

    /// First-run setup: derive the password verifier and mint the APPKEY.
    /// This is what the captive setup portal invokes once the owner picks a
    /// setup password.
    pub fn run_setup(&mut self, password: &str, iters: u32, rng: &mut impl CryptoRngCore) {
        let iters = iters.max(1);
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let verifier = pbkdf2_sha256(password.as_bytes(), &salt, iters);

        let mut appkey = Zeroizing::new([0u8; APPKEY_LEN]);
        rng.fill_bytes(&mut appkey[..]);

        self.kdf = Some(KdfParams {
            salt,
            iters,
            verifier: *verifier,
        });
        self.appkey = Some(appkey);
        self.passkey = 100_000 + rng.next_u32() % 900_000;
        self.setup_done = true;
        self.appkey_released = false;
    }
}

/// Failure talking to the persistent store.
#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device store failure: {}", self.0)
    }
}

impl core::error::Error for StoreError {}

/// Persistent key/value storage contract (NVS on real hardware).
pub trait DeviceStore {
    fn load(&mut self) -> Result<Option<DeviceConfig>, StoreError>;
    fn save(&mut self, config: &DeviceConfig) -> Result<(), StoreError>;
}

/// In-memory store used by the host-side simulator and the test suite.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    saved: Option<DeviceConfig>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DeviceConfig) -> Self {
        Self {
            saved: Some(config),
        }
    }

    pub fn saved(&self) -> Option<&DeviceConfig> {
        self.saved.as_ref()
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn load(&mut self) -> Result<Option<DeviceConfig>, StoreError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<(), StoreError> {
        self.saved = Some(config.clone());
        Ok(())
    }
}
