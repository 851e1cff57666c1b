//! Error types for framecast

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Framecast error types
///
/// Malformed inbound packets never surface here; the stack drops them and
/// counts the drop in `InterfaceStats`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (device file, TAP interface, frame file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A consumer is already registered on this UDP port
    #[error("UDP port {0} already has a consumer")]
    PortInUse(u16),

    /// Outbound payload does not fit in one IPv4 packet
    #[error("Payload of {len} bytes exceeds MTU of {mtu}")]
    PayloadTooLarge {
        /// IP payload length requested
        len: usize,
        /// Configured MTU
        mtu: usize,
    },

    /// Peer is still unresolved and its pending queue has no room
    #[error("Pending queue for {0} full")]
    PendingQueueFull(std::net::Ipv4Addr),

    /// Buffer length is not a multiple of the 32-bit word size
    #[error("Buffer length {0} is not a multiple of 4")]
    Unaligned(usize),

    /// Frame buffer window outside the device address space
    #[error("Buffer index {index} out of range (max {max})")]
    WindowOutOfRange {
        /// Requested window index
        index: u32,
        /// Highest valid window index
        max: u32,
    },

    /// Peer stage hung up
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Stage thread could not be started
    #[error("Failed to spawn {0} thread")]
    ThreadSpawn(&'static str),

    /// Stage thread panicked
    #[error("{0} thread panicked")]
    StagePanicked(&'static str),
}
