use std::time::Duration;

/// Key-store file used when `--store` is not given.
pub const DEFAULT_STORE_FILE: &str = "blukey-store.json";

/// BLE discovery window for `list`.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Waiting for the dongle's HELLO after connecting.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Handshake replies: the A2 challenge, the A1 key, and the B2 finished tag.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(6);

/// Info query and fast-keys acknowledgement.
pub const INFO_TIMEOUT: Duration = Duration::from_secs(4);

/// Typing receipt for a D0 string.
pub const TYPE_TIMEOUT: Duration = Duration::from_secs(6);

/// Settle time between the provisioning connection and the verification
/// connection.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Bounded notification FIFO depth.
pub const NOTIFY_QUEUE_CAPACITY: usize = 32;
