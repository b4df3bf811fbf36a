//! Per-channel engine (spec §5): ties the frame classifier, session layer,
//! block aggregator and RTP sink together, run synchronously on the RX
//! thread. Single writer, no lock.

use std::sync::Arc;

use log::{debug, warn};

use crate::aggregator::Aggregator;
use crate::channel::ChannelId;
use crate::classifier;
use crate::constants::packet_type;
use crate::error::Result;
use crate::events::{EventSink, Tip};
use crate::rtp::RtpSink;
use crate::session::{SessionChange, SessionLayer};
use crate::signal_quality::SignalQualityCalculator;

/// State and collaborators for one `channel_id`.
pub struct ChannelEngine {
    channel_id: ChannelId,
    session: SessionLayer,
    aggregator: Aggregator,
    rtp: RtpSink,
    quality: Arc<SignalQualityCalculator>,
    events: Arc<dyn EventSink>,
}

impl ChannelEngine {
    /// Build an engine bound to `channel_id`, forwarding decoded RTP to
    /// `rtp`.
    pub fn new(
        channel_id: ChannelId,
        session: SessionLayer,
        rtp: RtpSink,
        quality: Arc<SignalQualityCalculator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            channel_id,
            session,
            aggregator: Aggregator::new(channel_id),
            rtp,
            quality,
            events,
        }
    }

    /// The channel this engine handles.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Aggregator counters, for the supervisor's `get_packet_loss`.
    pub fn counters(&self) -> crate::aggregator::AggregatorCounters {
        self.aggregator.counters()
    }

    /// Process one raw radiotap+802.11 frame already routed to this
    /// channel. Never propagates an error past the RX thread (spec §7):
    /// failures are logged/counted and the packet is dropped.
    pub fn on_frame(&mut self, body: &[u8], rssi: [u8; 2], snr: [i8; 2]) {
        if body.is_empty() {
            return;
        }
        match body[0] {
            packet_type::KEY => self.on_key(&body[1..]),
            packet_type::DATA => self.on_data(&body[1..], rssi, snr),
            other => debug!("channel {}: unknown packet type {other:#x}", self.channel_id),
        }
    }

    fn on_key(&mut self, key_body: &[u8]) {
        match self.session.on_key(key_body) {
            Ok(SessionChange::New) => {
                self.aggregator.reset();
                self.rtp.reset();
                debug!(
                    "channel {}: session (re)established, epoch {}",
                    self.channel_id,
                    self.session.session().epoch()
                );
            }
            Ok(SessionChange::Unchanged) => {}
            Err(crate::error::Error::UnsupportedFec) => {
                if self.session.take_unsupported_fec_tip() {
                    self.events.on_tip(Tip::new(
                        "unsupported_fec",
                        "transmitter announced an unsupported FEC scheme",
                    ));
                }
            }
            Err(e) => debug!("channel {}: KEY rejected: {e}", self.channel_id),
        }
    }

    fn on_data(&mut self, data_body: &[u8], rssi: [u8; 2], snr: [i8; 2]) {
        if data_body.len() < 8 {
            return;
        }
        let data_nonce = u64::from_be_bytes(data_body[0..8].try_into().unwrap());
        let ciphertext = &data_body[8..];
        let outcome = match self.aggregator.admit(&self.session, data_nonce, ciphertext) {
            Ok(o) => o,
            Err(e) => {
                debug!("channel {}: DATA dropped: {e}", self.channel_id);
                return;
            }
        };
        // Only packets that cleared AEAD auth (and an established session)
        // reach here, per spec §8 testable property 4: a forged/garbage
        // DATA packet must never pollute the RSSI/SNR window.
        self.quality.add_rssi(rssi[0], rssi[1]);
        self.quality.add_snr(snr[0], snr[1]);
        for batch in &outcome.fec_batches {
            self.quality.add_fec(batch.total, batch.recovered, batch.lost);
        }
        for fragment in outcome.delivered {
            if let Err(e) = self.rtp.handle(&fragment.payload, self.events.as_ref()) {
                warn!("channel {}: RTP forward failed: {e}", self.channel_id);
            }
        }
    }
}

/// Route one captured frame to the channel engine it belongs to, after
/// stripping radiotap and validating the 802.11 wfb template (spec §4.A).
pub fn dispatch(raw: &[u8], attrs: &crate::device::RxAttributes, engines: &mut [ChannelEngine]) -> Result<()> {
    let classified = classifier::classify(raw)?;
    let rssi = [attrs.rssi[0].unsigned_abs(), attrs.rssi[1].unsigned_abs()];
    for engine in engines.iter_mut() {
        if engine.channel_id() == classified.channel_id {
            engine.on_frame(classified.body, rssi, attrs.snr);
            return Ok(());
        }
    }
    Ok(())
}
