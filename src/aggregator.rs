//! Block aggregator (spec §4.C): decrypts DATA fragments, places them in
//! the [`Ring`], drives Reed-Solomon recovery, and produces an in-order
//! stream of RTP-bearing fragments plus FEC telemetry counters.

use crate::channel::ChannelId;
use crate::constants::fragment_flags;
use crate::error::{Error, Result};
use crate::fec::FecDecoder;
use crate::ring::{decompose_nonce, Finalized, Ring};
use crate::session::SessionLayer;

/// One decrypted, un-padded fragment payload ready for the RTP sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFragment {
    /// Block this fragment belonged to.
    pub block_idx: u64,
    /// Fragment index within the block (`0..k`).
    pub fragment_idx: u8,
    /// Payload bytes, with the fragment header and shard padding removed.
    pub payload: Vec<u8>,
}

/// Per-block FEC outcome, fed to the signal-quality estimator (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FecBatch {
    /// Total fragments making up the block (`n`).
    pub total: u32,
    /// Data fragments produced by Reed-Solomon reconstruction.
    pub recovered: u32,
    /// Data fragments never delivered (0 unless the whole block was lost).
    pub lost: u32,
}

/// Outcome of admitting one DATA packet.
#[derive(Debug, Default)]
pub struct AdmitOutcome {
    /// Fragments ready for the RTP sink, oldest first.
    pub delivered: Vec<DeliveredFragment>,
    /// One entry per block that finalized as a result of this packet.
    pub fec_batches: Vec<FecBatch>,
}

/// Running counters across the aggregator's lifetime, for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregatorCounters {
    /// DATA packets that failed AEAD authentication.
    pub bad_mac: u64,
    /// DATA packets rejected because no session is established yet.
    pub no_session: u64,
    /// DATA packets for a block already evicted from the ring.
    pub stale_block: u64,
    /// DATA packets that duplicated an already-placed fragment.
    pub duplicate: u64,
    /// Blocks that could not be delivered at all.
    pub block_irrecoverable: u64,
}

/// Decrypts and reassembles DATA fragments for one channel.
pub struct Aggregator {
    channel_id: ChannelId,
    ring: Ring,
    decoder: Option<FecDecoder>,
    counters: AggregatorCounters,
}

impl Aggregator {
    /// Create an aggregator for a single channel.
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            ring: Ring::new(),
            decoder: None,
            counters: AggregatorCounters::default(),
        }
    }

    /// Snapshot of the running counters.
    pub fn counters(&self) -> AggregatorCounters {
        self.counters
    }

    /// The channel this aggregator is bound to.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Discard all in-flight blocks. Called when the session layer reports
    /// a new epoch (spec invariant 4).
    pub fn reset(&mut self) {
        self.ring.reset();
        self.decoder = None;
    }

    fn decoder_for(&mut self, k: u8, n: u8) -> Result<&FecDecoder> {
        let stale = !matches!(&self.decoder, Some(d) if d.k() == k as usize && d.n() == n as usize);
        if stale {
            self.decoder = Some(FecDecoder::new(k, n)?);
        }
        Ok(self.decoder.as_ref().unwrap())
    }

    /// Decrypt, place and (as needed) recover the DATA packet at
    /// `data_nonce` whose AEAD body is `ciphertext`.
    pub fn admit(
        &mut self,
        session: &SessionLayer,
        data_nonce: u64,
        ciphertext: &[u8],
    ) -> Result<AdmitOutcome> {
        if !session.session().is_established() {
            self.counters.no_session += 1;
            return Err(Error::NoSession);
        }
        let (k, n) = session.session().fec_params();
        let (block_idx, fragment_idx) = decompose_nonce(data_nonce);
        if self.ring.is_stale(block_idx) {
            self.counters.stale_block += 1;
            return Ok(AdmitOutcome::default());
        }

        let plaintext = match session.open_data(data_nonce, ciphertext) {
            Ok(p) => p,
            Err(e) => {
                self.counters.bad_mac += 1;
                return Err(e);
            }
        };

        let (finalized, placed) = self.ring.admit(block_idx, fragment_idx, k, n, plaintext);
        if !placed {
            self.counters.duplicate += 1;
        }

        let mut outcome = AdmitOutcome::default();
        for (idx, result) in finalized {
            self.finish_block(idx, k, n, result, &mut outcome)?;
        }
        Ok(outcome)
    }

    fn finish_block(
        &mut self,
        block_idx: u64,
        k: u8,
        n: u8,
        result: Finalized,
        outcome: &mut AdmitOutcome,
    ) -> Result<()> {
        match result {
            Finalized::Delivered { fragments } => {
                self.emit(block_idx, fragments, outcome);
                outcome.fec_batches.push(FecBatch {
                    total: n as u32,
                    recovered: 0,
                    lost: 0,
                });
            }
            Finalized::NeedsRecovery { mut shards, k: ks } => {
                let decoder = self.decoder_for(k, n)?;
                let missing_data = shards[..ks].iter().filter(|s| s.is_none()).count();
                let recovered_ok = decoder.reconstruct_data(&mut shards).is_ok()
                    && shards[..ks].iter().all(Option::is_some);
                if recovered_ok {
                    let recovered = missing_data as u32;
                    let fragments = shards.into_iter().take(ks).map(|f| f.unwrap()).collect();
                    self.emit(block_idx, fragments, outcome);
                    outcome.fec_batches.push(FecBatch {
                        total: n as u32,
                        recovered,
                        lost: 0,
                    });
                } else {
                    self.counters.block_irrecoverable += 1;
                    outcome.fec_batches.push(FecBatch {
                        total: n as u32,
                        recovered: 0,
                        lost: ks as u32,
                    });
                }
            }
            Finalized::Lost => {
                self.counters.block_irrecoverable += 1;
                outcome.fec_batches.push(FecBatch {
                    total: n as u32,
                    recovered: 0,
                    lost: k as u32,
                });
            }
        }
        Ok(())
    }

    fn emit(&self, block_idx: u64, fragments: Vec<Vec<u8>>, outcome: &mut AdmitOutcome) {
        for (fragment_idx, padded) in fragments.into_iter().enumerate() {
            let fragment_idx = fragment_idx as u8;
            match unpad_fragment(&padded) {
                Some((flags, payload)) if flags & fragment_flags::FEC_ONLY == 0 => {
                    outcome.delivered.push(DeliveredFragment {
                        block_idx,
                        fragment_idx,
                        payload,
                    });
                }
                _ => {}
            }
        }
    }
}

/// Strip the 3-byte `flags(1) ‖ len(2, BE)` header and zero padding a
/// transmitter adds so every shard in a block shares one length.
fn unpad_fragment(padded: &[u8]) -> Option<(u8, Vec<u8>)> {
    if padded.len() < 3 {
        return None;
    }
    let flags = padded[0];
    let len = u16::from_be_bytes([padded[1], padded[2]]) as usize;
    if 3 + len > padded.len() {
        return None;
    }
    Some((flags, padded[3..3 + len].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RadioPort;
    use crate::ring::compose_nonce;
    use crate::session::KeyMaterial;
    use chacha20poly1305::{ChaCha20Poly1305, Key as DataKey, aead::{Aead, KeyInit}};
    use crypto_box::{SalsaBox, SecretKey, aead::{AeadCore, OsRng}};

    const SHARD_LEN: usize = 16;

    fn pad_fragment(payload: &[u8], flags: u8) -> Vec<u8> {
        let mut v = vec![0u8; SHARD_LEN];
        v[0] = flags;
        v[1..3].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        v[3..3 + payload.len()].copy_from_slice(payload);
        v
    }

    fn seal_key(
        tx_secret: &SecretKey,
        rx_public: &crypto_box::PublicKey,
        channel_id: u32,
        epoch: u64,
        k: u8,
        n: u8,
        session_key: [u8; 32],
    ) -> Vec<u8> {
        use crate::constants::SESSION_NONCE_SIZE;
        let mut plain = Vec::with_capacity(48);
        plain.extend_from_slice(&epoch.to_be_bytes());
        plain.extend_from_slice(&channel_id.to_be_bytes());
        plain.push(0x1); // Vandermonde (WFB_FEC_VDM_RS)
        plain.push(k);
        plain.push(n);
        plain.push(0);
        plain.extend_from_slice(&session_key);
        let salsa_box = SalsaBox::new(rx_public, tx_secret);
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = salsa_box.encrypt(&nonce, plain.as_ref()).unwrap();
        let mut body = Vec::with_capacity(SESSION_NONCE_SIZE + ciphertext.len());
        body.extend_from_slice(nonce.as_slice());
        body.extend_from_slice(&ciphertext);
        body
    }

    fn seal_data(session_key: &[u8; 32], block_idx: u64, fragment_idx: u8, payload: &[u8]) -> Vec<u8> {
        let key = DataKey::from_slice(session_key);
        let cipher = ChaCha20Poly1305::new(key);
        let data_nonce = compose_nonce(block_idx, fragment_idx);
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..12].copy_from_slice(&data_nonce.to_be_bytes());
        let nonce = chacha20poly1305::Nonce::from_slice(&nonce_bytes);
        cipher.encrypt(nonce, payload).unwrap()
    }

    fn setup(k: u8, n: u8) -> (SessionLayer, Aggregator, [u8; 32]) {
        let rx_secret = SecretKey::generate(&mut OsRng);
        let tx_secret = SecretKey::generate(&mut OsRng);
        let mut file = Vec::with_capacity(64);
        file.extend_from_slice(&rx_secret.to_bytes());
        file.extend_from_slice(tx_secret.public_key().as_bytes());
        let channel = ChannelId::new(1, RadioPort::Video);
        let mut session = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        let session_key = [0x42u8; 32];
        let body = seal_key(
            &tx_secret,
            &rx_secret.public_key(),
            channel.raw(),
            1,
            k,
            n,
            session_key,
        );
        session.on_key(&body).unwrap();
        (session, Aggregator::new(channel), session_key)
    }

    #[test]
    fn happy_path_delivers_all_data_fragments_in_order() {
        let (session, mut agg, key) = setup(8, 12);
        let mut delivered = Vec::new();
        for i in 0..12u8 {
            let payload = pad_fragment(&[i; 4], 0);
            let ct = seal_data(&key, 0, i, &payload);
            let out = agg.admit(&session, compose_nonce(0, i), &ct).unwrap();
            delivered.extend(out.delivered);
        }
        assert_eq!(delivered.len(), 8);
        for (i, frag) in delivered.iter().enumerate() {
            assert_eq!(frag.fragment_idx, i as u8);
            assert_eq!(frag.payload, vec![i as u8; 4]);
        }
    }

    #[test]
    fn single_missing_data_fragment_is_recovered() {
        let (session, mut agg, key) = setup(8, 12);
        let mut batches = Vec::new();
        let mut delivered = Vec::new();
        for i in 0..12u8 {
            if i == 3 {
                continue;
            }
            let payload = pad_fragment(&[i; 4], 0);
            let ct = seal_data(&key, 0, i, &payload);
            let out = agg.admit(&session, compose_nonce(0, i), &ct).unwrap();
            delivered.extend(out.delivered);
            batches.extend(out.fec_batches);
        }
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].recovered, 1);
        assert_eq!(batches[0].lost, 0);
        assert_eq!(delivered.len(), 8);
        assert_eq!(delivered[3].payload, vec![3u8; 4]);
    }

    #[test]
    fn block_with_fewer_than_k_fragments_is_entirely_lost() {
        let (session, mut agg, key) = setup(8, 12);
        for i in 0..4u8 {
            let payload = pad_fragment(&[i; 4], 0);
            let ct = seal_data(&key, 0, i, &payload);
            agg.admit(&session, compose_nonce(0, i), &ct).unwrap();
        }
        let payload = pad_fragment(&[0; 4], 0);
        let ct = seal_data(&key, 1, 0, &payload);
        let out = agg.admit(&session, compose_nonce(1, 0), &ct).unwrap();
        assert_eq!(out.fec_batches.len(), 1);
        assert_eq!(out.fec_batches[0].lost, 8);
        assert_eq!(out.delivered.len(), 0);
        assert_eq!(agg.counters().block_irrecoverable, 1);
    }

    #[test]
    fn out_of_order_fragments_still_deliver_in_order() {
        let (session, mut agg, key) = setup(4, 6);
        let order = [3u8, 1, 0, 2];
        let mut delivered = Vec::new();
        for &i in &order {
            let payload = pad_fragment(&[i; 2], 0);
            let ct = seal_data(&key, 0, i, &payload);
            let out = agg.admit(&session, compose_nonce(0, i), &ct).unwrap();
            delivered.extend(out.delivered);
        }
        assert_eq!(delivered.len(), 4);
        for (i, frag) in delivered.iter().enumerate() {
            assert_eq!(frag.fragment_idx, i as u8);
        }
    }

    #[test]
    fn fec_only_fragment_is_never_forwarded() {
        let (session, mut agg, key) = setup(2, 4);
        let p0 = pad_fragment(&[1; 2], 0);
        let p1 = pad_fragment(&[2; 2], fragment_flags::FEC_ONLY);
        let ct0 = seal_data(&key, 0, 0, &p0);
        let ct1 = seal_data(&key, 0, 1, &p1);
        let mut delivered = Vec::new();
        delivered.extend(agg.admit(&session, compose_nonce(0, 0), &ct0).unwrap().delivered);
        delivered.extend(agg.admit(&session, compose_nonce(0, 1), &ct1).unwrap().delivered);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].fragment_idx, 0);
    }

    #[test]
    fn no_session_is_rejected() {
        let rx_secret = SecretKey::generate(&mut OsRng);
        let tx_secret = SecretKey::generate(&mut OsRng);
        let mut file = Vec::with_capacity(64);
        file.extend_from_slice(&rx_secret.to_bytes());
        file.extend_from_slice(tx_secret.public_key().as_bytes());
        let channel = ChannelId::new(1, RadioPort::Video);
        let bare_session = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        let mut bare_agg = Aggregator::new(channel);
        let err = bare_agg.admit(&bare_session, 0, &[0; 16]).unwrap_err();
        assert!(matches!(err, Error::NoSession));
    }
}
