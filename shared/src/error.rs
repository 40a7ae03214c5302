use core::fmt;

/// Wire-level failures: the frame or field cannot be understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame or field structure is malformed.
    BadFrame,
    /// A declared length does not match the bytes present.
    BadLength { declared: usize, actual: usize },
    /// Opcode is not known to this implementation.
    BadOp(u8),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadFrame => write!(f, "malformed frame"),
            ProtocolError::BadLength { declared, actual } => {
                write!(f, "declared length {declared} but {actual} bytes present")
            }
            ProtocolError::BadOp(op) => write!(f, "unknown opcode 0x{op:02X}"),
        }
    }
}

impl core::error::Error for ProtocolError {}

/// Cryptographic failures. Fatal to the current session: the holder must
/// reset its session state before continuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// A MAC did not verify.
    BadMac,
    /// The provisioning proof did not match the stored verifier.
    BadProof,
    /// A record arrived with a sequence number other than the expected one.
    Replay,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::BadMac => write!(f, "MAC verification failed"),
            AuthError::BadProof => write!(f, "setup password proof rejected"),
            AuthError::Replay => write!(f, "record sequence replayed or reordered"),
        }
    }
}

impl core::error::Error for AuthError {}

/// Server-side refusals. Each maps to the ASCII reason carried in a `0xFF`
/// reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    /// The APPKEY was already handed out and the dongle is single-app locked.
    LockedSingle,
    /// Too many failed provisioning proofs since boot.
    RateLimited,
    /// First-run setup has not stored KDF parameters yet.
    KdfMissing,
    /// An application opcode arrived before the session went active.
    NoSession,
}

impl PolicyError {
    /// ASCII reason sent back in the `0xFF` error frame.
    pub fn reason(&self) -> &'static str {
        match self {
            PolicyError::LockedSingle => "LOCKED_SINGLE_NEED_RESET",
            PolicyError::RateLimited => "rate limited",
            PolicyError::KdfMissing => "KDF missing",
            PolicyError::NoSession => "need MTLS",
        }
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl core::error::Error for PolicyError {}

/// Failure while opening or validating a protected payload: either the bytes
/// are structurally wrong or a cryptographic check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureChannelError {
    Protocol(ProtocolError),
    Auth(AuthError),
}

impl fmt::Display for SecureChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecureChannelError::Protocol(err) => write!(f, "{err}"),
            SecureChannelError::Auth(err) => write!(f, "{err}"),
        }
    }
}

impl From<ProtocolError> for SecureChannelError {
    fn from(value: ProtocolError) -> Self {
        SecureChannelError::Protocol(value)
    }
}

impl From<AuthError> for SecureChannelError {
    fn from(value: AuthError) -> Self {
        SecureChannelError::Auth(value)
    }
}

impl core::error::Error for SecureChannelError {}
