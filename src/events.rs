//! Typed event sink replacing the source's process-wide `GuiInterface`
//! singleton (spec §9): the supervisor is constructed with an explicit
//! `Arc<dyn EventSink>` instead of reaching for global state.

use std::fmt;
use std::path::PathBuf;

/// Codec detected from the first RTP payload's NAL unit type (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Codec::H264 => "H264",
            Codec::H265 => "H265",
        })
    }
}

/// One-shot announcement emitted after the first RTP packet of a stream.
#[derive(Debug, Clone)]
pub struct RtpStreamReady {
    /// RTP payload type.
    pub pt: u8,
    /// RTP synchronization source identifier.
    pub ssrc: u32,
    /// UDP port the stream is being forwarded to.
    pub port: u16,
    /// Detected codec.
    pub codec: Codec,
}

/// A user-facing tip: a condition worth surfacing but not fatal to the
/// packet pipeline (unsupported FEC, lost signal, bad key file, ...).
#[derive(Debug, Clone)]
pub struct Tip {
    /// Short machine-stable identifier for the tip (e.g. `"unsupported_fec"`).
    pub code: &'static str,
    /// Human-readable detail.
    pub message: String,
}

impl Tip {
    /// Build a tip.
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Sink for the handful of events the engine needs to report out-of-band,
/// in place of directly-called GUI callbacks or a global singleton.
pub trait EventSink: Send + Sync {
    /// A stream became ready for the first time (or after a session reset).
    fn on_stream_ready(&self, _ready: RtpStreamReady) {}

    /// A user-facing tip occurred.
    fn on_tip(&self, _tip: Tip) {}

    /// The adaptive-link FEC level changed.
    fn on_fec_level(&self, _level: u8) {}
}

/// An [`EventSink`] that discards everything. Useful for tests and library
/// embedding where the host doesn't care.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {}

/// An [`EventSink`] that routes everything through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn on_stream_ready(&self, ready: RtpStreamReady) {
        log::info!(
            "RTP stream ready: pt={} ssrc={:#x} port={} codec={}",
            ready.pt,
            ready.ssrc,
            ready.port,
            ready.codec
        );
    }

    fn on_tip(&self, tip: Tip) {
        log::warn!("tip[{}]: {}", tip.code, tip.message);
    }

    fn on_fec_level(&self, level: u8) {
        log::debug!("fec_level -> {level}");
    }
}

/// An [`EventSink`] that logs like [`LoggingEventSink`], and additionally
/// writes the one-shot SDP announcement (spec §4.F/§6) from the first
/// `RtpStreamReady` event it sees, using that event's actual detected
/// `pt`/`codec`/`port` rather than a value guessed at startup.
#[derive(Debug, Default, Clone)]
pub struct SdpWritingEventSink {
    sdp_path: Option<PathBuf>,
}

impl SdpWritingEventSink {
    /// Write the SDP announcement to `sdp_path` on the first stream-ready
    /// event; `None` disables the write (logging still happens).
    pub fn new(sdp_path: Option<PathBuf>) -> Self {
        Self { sdp_path }
    }
}

impl EventSink for SdpWritingEventSink {
    fn on_stream_ready(&self, ready: RtpStreamReady) {
        log::info!(
            "RTP stream ready: pt={} ssrc={:#x} port={} codec={}",
            ready.pt,
            ready.ssrc,
            ready.port,
            ready.codec
        );
        if let Some(path) = &self.sdp_path {
            match crate::sdp::write(path, ready.port, ready.pt, ready.codec) {
                Ok(()) => log::info!("wrote SDP announcement to {}", path.display()),
                Err(e) => log::warn!("failed to write SDP announcement to {}: {e}", path.display()),
            }
        }
    }

    fn on_tip(&self, tip: Tip) {
        log::warn!("tip[{}]: {}", tip.code, tip.message);
    }

    fn on_fec_level(&self, level: u8) {
        log::debug!("fec_level -> {level}");
    }
}
