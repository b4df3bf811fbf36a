//! Error taxonomy, spec §7.
//!
//! Packet-level variants here never escape the RX thread: every call site in
//! [`crate::classifier`], [`crate::session`] and [`crate::aggregator`] that
//! can produce one logs it, bumps a counter, and drops the packet. Only
//! [`crate::supervisor::Supervisor::start`] surfaces an `Error` to its
//! caller.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while accepting or decoding wfb traffic, or
/// while standing up the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame too short, or its 802.11 header doesn't match the wfb template.
    #[error("bad framing")]
    BadFraming,

    /// AEAD authentication failed. Expected under adversarial traffic.
    #[error("AEAD authentication failed")]
    BadMac,

    /// A KEY packet's epoch was not greater than the current session epoch.
    #[error("stale epoch")]
    StaleEpoch,

    /// KEY packet named an FEC scheme other than Vandermonde RS.
    #[error("unsupported FEC type")]
    UnsupportedFec,

    /// DATA arrived for a channel with no accepted KEY yet.
    #[error("no session established")]
    NoSession,

    /// A block was evicted with fewer than `k` fragments ever received.
    #[error("block irrecoverable")]
    BlockIrrecoverable,

    /// USB device could not be opened or claimed.
    #[error("device open failed: {0}")]
    DeviceOpenFailed(String),

    /// Keypair file missing, wrong size, or unreadable.
    #[error("bad key file: {0}")]
    BadKey(String),

    /// Radio driver reported a read timeout / signal loss.
    #[error("signal lost")]
    SignalLost,

    /// Reed-Solomon encode/decode failure (malformed parameters, not a
    /// transport-level event).
    #[error("FEC codec error: {0}")]
    Fec(String),

    /// I/O error from a socket or file operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error, e.g. for `Config` sidecars.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Requested TX power outside the `[1, 40]` mW range.
    #[error("tx power {0} mW out of range [1, 40]")]
    InvalidTxPower(u32),
}
