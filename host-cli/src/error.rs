use shared::error::{AuthError, ProtocolError, SecureChannelError};
use std::io;
use thiserror::Error;

/// Controller-side failure taxonomy. Cryptographic failures are fatal to the
/// session that produced them; transport failures bubble up without retry.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("security failure: {0}")]
    Auth(#[from] AuthError),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("dongle refused: {0}")]
    Device(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no active session")]
    NoSession,
    #[error("session sequence space exhausted; re-handshake required")]
    SessionExpired,
}

impl From<SecureChannelError> for HostError {
    fn from(value: SecureChannelError) -> Self {
        match value {
            SecureChannelError::Protocol(err) => HostError::Protocol(err),
            SecureChannelError::Auth(err) => HostError::Auth(err),
        }
    }
}

impl From<io::Error> for HostError {
    fn from(value: io::Error) -> Self {
        HostError::Transport(value.to_string())
    }
}
