/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified serial port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// Failed to enumerate serial ports.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(serialport::Error),

    /// A serial port setting could not be applied.
    #[error("serial port configuration error on {port}: {source}")]
    Configure {
        port: String,
        source: serialport::Error,
    },

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// The underlying I/O error kind, where one exists.
    ///
    /// A port that does not exist maps to [`std::io::ErrorKind::NotFound`].
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Open { source, .. } | Self::Configure { source, .. } | Self::Enumerate(source) => {
                match source.kind() {
                    serialport::ErrorKind::Io(kind) => Some(kind),
                    serialport::ErrorKind::NoDevice => Some(std::io::ErrorKind::NotFound),
                    _ => None,
                }
            }
            Self::Io(err) => Some(err.kind()),
            Self::Closed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
