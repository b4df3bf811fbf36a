//! RTP sink (spec §4.F): parses just enough of the RTP header to log
//! sequence gaps and announce the stream once, then forwards the packet
//! verbatim to a UDP socket.

use std::net::UdpSocket;

use log::info;

use crate::error::{Error, Result};
use crate::events::{Codec, EventSink, RtpStreamReady};

const MIN_RTP_HEADER: usize = 12;

/// Fields pulled out of an RTP header for logging/announcement purposes.
/// The sink never re-serializes these: the original bytes are what get
/// sent onward.
struct RtpHeader {
    pt: u8,
    ssrc: u32,
    seq: u16,
}

fn parse_header(packet: &[u8]) -> Result<RtpHeader> {
    if packet.len() < MIN_RTP_HEADER {
        return Err(Error::BadFraming);
    }
    Ok(RtpHeader {
        pt: packet[1] & 0x7f,
        seq: u16::from_be_bytes([packet[2], packet[3]]),
        ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
    })
}

fn detect_codec(payload: &[u8]) -> Codec {
    match payload.first().map(|b| b & 0x1f) {
        Some(24) | Some(28) => Codec::H264,
        _ => Codec::H265,
    }
}

/// Forwards RTP packets to a UDP endpoint, logging sequence gaps and
/// announcing the stream once per session (spec §4.F).
pub struct RtpSink {
    socket: UdpSocket,
    port: u16,
    prev_seq: Option<u16>,
}

impl RtpSink {
    /// Bind a sink that forwards to `dest` and reports its own local
    /// `port` in [`RtpStreamReady`] events.
    pub fn connect(dest: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(dest)?;
        Ok(Self {
            socket,
            port,
            prev_seq: None,
        })
    }

    /// Reset the one-shot codec-detection latch, e.g. on session change.
    pub fn reset(&mut self) {
        self.prev_seq = None;
    }

    /// Process one delivered RTP packet: parse, log, announce if this is
    /// the first packet since the last reset, then forward verbatim.
    pub fn handle(&mut self, packet: &[u8], events: &dyn EventSink) -> Result<()> {
        let header = parse_header(packet)?;

        if self.prev_seq.is_none() {
            let codec = detect_codec(&packet[MIN_RTP_HEADER..]);
            events.on_stream_ready(RtpStreamReady {
                pt: header.pt,
                ssrc: header.ssrc,
                port: self.port,
                codec,
            });
        }

        if let Some(prev) = self.prev_seq {
            let gap = header.seq.wrapping_sub(prev);
            if gap > 1 && gap < u16::MAX / 2 {
                info!("RTP sequence gap: {} packets lost", gap - 1);
            }
        }
        self.prev_seq = Some(header.seq);

        self.socket.send(packet)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;

    fn rtp_packet(seq: u16, nal_type: u8) -> Vec<u8> {
        let mut p = vec![0u8; 13];
        p[0] = 0x80;
        p[1] = 96;
        p[2..4].copy_from_slice(&seq.to_be_bytes());
        p[8..12].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        p[12] = nal_type;
        p
    }

    #[test]
    fn rejects_short_packets() {
        assert!(matches!(parse_header(&[0u8; 4]), Err(Error::BadFraming)));
    }

    #[test]
    fn detects_h264_from_first_nal() {
        assert_eq!(detect_codec(&[24]), Codec::H264);
        assert_eq!(detect_codec(&[28]), Codec::H264);
    }

    #[test]
    fn detects_h265_for_other_nal_types() {
        assert_eq!(detect_codec(&[1]), Codec::H265);
    }

    #[test]
    fn gap_is_logged_but_sequence_still_advances() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut sink = RtpSink::connect(&listener.local_addr().unwrap().to_string(), 9000).unwrap();
        let events = NullEventSink;
        sink.handle(&rtp_packet(10, 1), &events).unwrap();
        sink.handle(&rtp_packet(13, 1), &events).unwrap();
        assert_eq!(sink.prev_seq, Some(13));
    }
}
