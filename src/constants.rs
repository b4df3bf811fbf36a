//! Wire-format constants, from spec §6.

/// Size of the session nonce inside a KEY packet.
pub const SESSION_NONCE_SIZE: usize = 24;

/// AEAD symmetric key size (ChaCha20-Poly1305).
pub const AEAD_KEY_SIZE: usize = 32;

/// AEAD authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Number of in-flight blocks the aggregator tracks at once.
pub const RX_RING_SIZE: u64 = 40;

/// Highest legal block index (55-bit space).
pub const MAX_BLOCK_IDX: u64 = (1 << 55) - 1;

/// Mask applied to the 56-bit `(block_idx << 8) | fragment_idx` nonce field.
pub const BLOCK_IDX_MASK: u64 = (1 << 56) - 1;

/// Plaintext size of `wsession_data` before sealing (spec §6's "48 B of
/// encrypted session parameters" describes this plaintext; once sealed with
/// the 16-byte AEAD tag the ciphertext is [`KEY_SEALED_SIZE`] bytes).
pub const WSESSION_DATA_SIZE: usize = 48;

/// Size of the sealed `wsession_data` blob (plaintext + AEAD tag), not
/// including the 24-byte nonce that precedes it on the wire.
pub const KEY_SEALED_SIZE: usize = WSESSION_DATA_SIZE + AEAD_TAG_SIZE;

/// Long-term keypair file size (receiver secret ‖ transmitter public).
pub const KEYPAIR_FILE_SIZE: usize = 64;

/// Fixed 24-byte 802.11 header template preceding the wfb payload.
pub const IEEE80211_HEADER_SIZE: usize = 24;

/// Frame check sequence trailer stripped before session-layer processing.
pub const FCS_SIZE: usize = 4;

/// Upper bound on a single fragment's plaintext payload.
pub const MAX_FRAGMENT_PAYLOAD: usize = 4000;

/// Packet-type byte values at offset 0 of the 802.11 payload.
pub mod packet_type {
    /// DATA packet: dispatched to the block aggregator.
    pub const DATA: u8 = 0x01;
    /// KEY packet: establishes or rotates the session.
    pub const KEY: u8 = 0x02;
}

/// Plaintext fragment flag bits.
pub mod fragment_flags {
    /// Fragment contributed only to parity; never delivered downstream.
    pub const FEC_ONLY: u8 = 0x01;
}

/// Default adaptive-link uplink endpoint.
pub const DEFAULT_ALINK_ADDR: &str = "127.0.0.1:8001";

/// Default outbound RTP port.
pub const DEFAULT_RTP_PORT: u16 = 52356;

/// Adaptive-link telemetry tick period, in milliseconds (10 Hz).
pub const ALINK_TICK_MS: u64 = 100;

/// Signal-quality sliding-window retention, in milliseconds.
pub const SIGNAL_WINDOW_MS: u64 = 1000;
