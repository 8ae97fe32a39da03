use std::io;
use std::net::SocketAddr;

/// Errors that abort startup or prevent a connection from being set up.
///
/// Per-connection failures during the transmission loop are not reported through
/// this type; they end the owning worker's loop and show up in its metrics.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("field size must be greater than zero")]
    ZeroFieldSize,
    #[error("failed to allocate {requested} bytes for field {field}")]
    Allocation { field: usize, requested: usize },
    #[error("failed to allocate {requested} bytes for the serialized message")]
    SerializeAllocation { requested: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure socket: {0}")]
    SocketOption(#[source] io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to install signal handler: {0}")]
    Signal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
