//! Engine configuration (spec §10.3): device selection, channel, keypair
//! path, RTP sink, SDP output, and adaptive-link settings. The CLI binary
//! builds one of these from `clap::Parser` arguments; it can also be
//! loaded from or saved to a JSON sidecar with `serde_json`, the same way
//! the teacher persists structured data.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ALINK_ADDR, DEFAULT_RTP_PORT};
use crate::error::Result;

/// Everything needed to stand up one channel's receive pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// USB vendor:product id of the radio adapter, e.g. `"0bda:8812"`.
    /// `None` selects the first enumerated device.
    pub device: Option<String>,

    /// 802.11 channel number.
    pub channel: u8,

    /// Channel width in MHz (20, 40, ...).
    pub channel_width: u32,

    /// wfb link ID; combined with the radio port byte to form the
    /// channel ID matched against inbound frames.
    pub link_id: u32,

    /// Path to the 64-byte receiver/transmitter keypair file.
    pub keypair_path: PathBuf,

    /// Host the RTP sink forwards decoded packets to (combined with
    /// `rtp_port` to form the destination socket address).
    pub rtp_dest: String,

    /// Port reported in [`crate::events::RtpStreamReady`] and the SDP file.
    pub rtp_port: u16,

    /// Where to write the one-shot SDP announcement, if at all.
    pub sdp_path: Option<PathBuf>,

    /// Whether to start the adaptive-link telemetry thread.
    pub alink_enabled: bool,

    /// Adaptive-link uplink endpoint.
    pub alink_addr: String,

    /// Initial TX power in mW, `[1, 40]`.
    pub initial_tx_power_mw: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            channel: 161,
            channel_width: 20,
            link_id: 0x37,
            keypair_path: PathBuf::from("gs.key"),
            rtp_dest: "127.0.0.1".to_string(),
            rtp_port: DEFAULT_RTP_PORT,
            sdp_path: None,
            alink_enabled: true,
            alink_addr: DEFAULT_ALINK_ADDR.to_string(),
            initial_tx_power_mw: 25,
        }
    }
}

impl Config {
    /// Load a JSON sidecar written by [`Self::save`].
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Save as a JSON sidecar.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}
