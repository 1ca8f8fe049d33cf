use bytes::Bytes;

/// Errors that can occur during command encoding or response decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An address is outside the single-digit range the wire format allows.
    #[error("invalid address {0} (expected 1..=9)")]
    InvalidAddress(u8),

    /// A channel-scoped mnemonic was addressed to the pump, or vice versa.
    #[error("command {mnemonic} cannot be sent with {address}")]
    ScopeMismatch {
        mnemonic: &'static str,
        address: String,
    },

    /// A parameter cannot be rendered on the wire.
    #[error("invalid parameter for {mnemonic}: {reason}")]
    InvalidParameter {
        mnemonic: &'static str,
        reason: String,
    },

    /// Received bytes are not a structurally valid response.
    #[error("invalid response ({reason}): {raw:?}")]
    InvalidResponse { raw: Bytes, reason: &'static str },

    /// Received bytes are not a structurally valid command.
    #[error("invalid command ({reason}): {raw:?}")]
    InvalidCommand { raw: Bytes, reason: &'static str },
}

impl FrameError {
    /// Raw bytes attached to a decode failure, if any.
    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            Self::InvalidResponse { raw, .. } | Self::InvalidCommand { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
