//! Frame classifier (spec §4.A): strips the radiotap header, validates the
//! fixed wfb 802.11 template, and recovers the channel ID.
//!
//! The template is a broadcast data frame whose transmitter-address and
//! BSSID fields both carry the same `channel_id`, fixed except for those
//! two copies and the trailing sequence/fragment field.

use crate::channel::ChannelId;
use crate::constants::{FCS_SIZE, IEEE80211_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::radiotap;

const FRAME_CONTROL: [u8; 4] = [0x08, 0x01, 0x00, 0x00];
const BROADCAST: [u8; 6] = [0xff; 6];
const OUI_PREFIX: [u8; 2] = [0x57, 0x42];

/// A classified frame: its channel ID and the wfb payload (KEY/DATA body,
/// with radiotap, the 802.11 header and the trailing FCS all stripped).
pub struct Classified<'a> {
    /// Channel this frame was addressed to.
    pub channel_id: ChannelId,
    /// Payload following the 802.11 header, FCS trailer removed.
    pub body: &'a [u8],
}

/// Strip radiotap and the 802.11 template, returning the channel ID and
/// wfb payload. Frames that are too short, have a malformed radiotap
/// header, or don't match the wfb template are rejected with
/// [`Error::BadFraming`] so the classifier's caller can count them as
/// silently-dropped non-wfb traffic.
pub fn classify(raw: &[u8]) -> Result<Classified<'_>> {
    let rt_len = radiotap::header_len(raw)?;
    let frame = &raw[rt_len..];
    if frame.len() < IEEE80211_HEADER_SIZE + FCS_SIZE {
        return Err(Error::BadFraming);
    }
    let hdr = &frame[..IEEE80211_HEADER_SIZE];

    if hdr[0..4] != FRAME_CONTROL || hdr[4..10] != BROADCAST {
        return Err(Error::BadFraming);
    }
    if hdr[10..12] != OUI_PREFIX || hdr[16..18] != OUI_PREFIX {
        return Err(Error::BadFraming);
    }
    let channel_a: [u8; 4] = hdr[12..16].try_into().unwrap();
    let channel_b: [u8; 4] = hdr[18..22].try_into().unwrap();
    if channel_a != channel_b {
        return Err(Error::BadFraming);
    }

    let with_fcs = &frame[IEEE80211_HEADER_SIZE..];
    let body = &with_fcs[..with_fcs.len() - FCS_SIZE];
    Ok(Classified {
        channel_id: ChannelId::from_be_bytes(channel_a),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RadioPort;

    fn wfb_frame(channel_id: ChannelId, body: &[u8]) -> Vec<u8> {
        let mut radiotap = vec![0x00, 0x00, 0x08, 0x00, 0, 0, 0, 0];
        let mut hdr = Vec::with_capacity(IEEE80211_HEADER_SIZE);
        hdr.extend_from_slice(&FRAME_CONTROL);
        hdr.extend_from_slice(&BROADCAST);
        hdr.extend_from_slice(&OUI_PREFIX);
        hdr.extend_from_slice(&channel_id.to_be_bytes());
        hdr.extend_from_slice(&OUI_PREFIX);
        hdr.extend_from_slice(&channel_id.to_be_bytes());
        hdr.extend_from_slice(&[0, 0]);
        assert_eq!(hdr.len(), IEEE80211_HEADER_SIZE);
        radiotap.append(&mut hdr);
        radiotap.extend_from_slice(body);
        radiotap.extend_from_slice(&[0, 0, 0, 0]); // FCS
        radiotap
    }

    #[test]
    fn classifies_a_well_formed_frame() {
        let channel = ChannelId::new(3, RadioPort::Video);
        let frame = wfb_frame(channel, b"hello");
        let classified = classify(&frame).unwrap();
        assert_eq!(classified.channel_id, channel);
        assert_eq!(classified.body, b"hello");
    }

    #[test]
    fn rejects_mismatched_channel_id_copies() {
        let channel = ChannelId::new(3, RadioPort::Video);
        let mut frame = wfb_frame(channel, b"hello");
        // Corrupt the second channel_id copy (offset: radiotap 8 + hdr 18).
        frame[8 + 18] ^= 0xff;
        assert!(matches!(classify(&frame), Err(Error::BadFraming)));
    }

    #[test]
    fn rejects_non_wfb_frame_control() {
        let channel = ChannelId::new(3, RadioPort::Video);
        let mut frame = wfb_frame(channel, b"hello");
        frame[8] = 0xAA;
        assert!(matches!(classify(&frame), Err(Error::BadFraming)));
    }

    #[test]
    fn rejects_too_short_frame() {
        assert!(matches!(classify(&[0x00, 0x00, 0x08, 0x00]), Err(Error::BadFraming)));
    }
}
