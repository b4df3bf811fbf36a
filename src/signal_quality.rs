//! Sliding-window signal-quality estimator, spec §4.D.
//!
//! Three append-only vectors, each timestamped and pruned to the last
//! second on read, feed a per-antenna link score the adaptive-link
//! controller consumes ten times a second.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

const WINDOW: Duration = Duration::from_millis(crate::constants::SIGNAL_WINDOW_MS);

fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

struct RssiEntry {
    at: Instant,
    ant: [u8; 2],
}

struct SnrEntry {
    at: Instant,
    ant: [i8; 2],
}

struct FecEntry {
    at: Instant,
    total: u32,
    recovered: u32,
    lost: u32,
}

/// A consistent snapshot produced by [`SignalQualityCalculator::calculate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignalQuality {
    /// Per-antenna mean RSSI over the window.
    pub rssi: [f32; 2],
    /// Per-antenna mean SNR over the window.
    pub snr: [f32; 2],
    /// Per-antenna composite `[0, 100]` score.
    pub link_score: [f32; 2],
    /// FEC fragments expected over the window.
    pub total_last_s: u32,
    /// FEC fragments recovered over the window.
    pub recovered_last_s: u32,
    /// FEC fragments lost over the window.
    pub lost_last_s: u32,
    /// 4-character lowercase-alpha code, regenerated on loss.
    pub idr_code: String,
}

/// Sliding-window estimator. Shared between the RX thread (writers) and the
/// adaptive-link thread (reader); an internal mutex serializes access the
/// way the original's recursive lock did, since every public method can be
/// called independently from either thread.
pub struct SignalQualityCalculator {
    inner: Mutex<Inner>,
}

struct Inner {
    rssi: Vec<RssiEntry>,
    snr: Vec<SnrEntry>,
    fec: Vec<FecEntry>,
    idr_code: String,
}

impl SignalQualityCalculator {
    /// Create an empty estimator.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rssi: Vec::new(),
                snr: Vec::new(),
                fec: Vec::new(),
                idr_code: "aaaa".to_string(),
            }),
        }
    }

    /// Record one DATA packet's per-antenna RSSI.
    pub fn add_rssi(&self, ant0: u8, ant1: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.rssi.push(RssiEntry {
            at: Instant::now(),
            ant: [ant0, ant1],
        });
    }

    /// Record one DATA packet's per-antenna SNR.
    pub fn add_snr(&self, ant0: i8, ant1: i8) {
        let mut inner = self.inner.lock().unwrap();
        inner.snr.push(SnrEntry {
            at: Instant::now(),
            ant: [ant0, ant1],
        });
    }

    /// Record one finalized block's FEC outcome (spec §4.C's
    /// [`crate::aggregator::FecBatch`]).
    pub fn add_fec(&self, total: u32, recovered: u32, lost: u32) {
        let mut inner = self.inner.lock().unwrap();
        if lost > 0 {
            inner.idr_code = random_code();
        }
        inner.fec.push(FecEntry {
            at: Instant::now(),
            total,
            recovered,
            lost,
        });
    }

    /// Prune stale samples and compute the current snapshot.
    pub fn calculate(&self) -> SignalQuality {
        let mut inner = self.inner.lock().unwrap();
        let cutoff = Instant::now() - WINDOW;
        inner.rssi.retain(|e| e.at >= cutoff);
        inner.snr.retain(|e| e.at >= cutoff);
        inner.fec.retain(|e| e.at >= cutoff);

        let rssi = average_u8(&inner.rssi);
        let snr = average_i8(&inner.snr);

        let (total, recovered, lost) =
            inner.fec.iter().fold((0u32, 0u32, 0u32), |(t, r, l), e| {
                (t + e.total, r + e.recovered, l + e.lost)
            });

        let link_score = [
            composite_score(rssi[0], snr[0]),
            composite_score(rssi[1], snr[1]),
        ];

        SignalQuality {
            rssi,
            snr,
            link_score,
            total_last_s: total,
            recovered_last_s: recovered,
            lost_last_s: lost,
            idr_code: inner.idr_code.clone(),
        }
    }
}

impl Default for SignalQualityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn composite_score(rssi: f32, snr: f32) -> f32 {
    let score = 0.3 * map_range(rssi, 0.0, 126.0, 0.0, 100.0)
        + 0.7 * map_range(snr, 0.0, 60.0, 0.0, 100.0);
    score.clamp(0.0, 100.0)
}

fn average_u8(entries: &[RssiEntry]) -> [f32; 2] {
    if entries.is_empty() {
        return [0.0, 0.0];
    }
    let n = entries.len() as f32;
    let sum = entries.iter().fold([0.0f32; 2], |acc, e| {
        [acc[0] + e.ant[0] as f32, acc[1] + e.ant[1] as f32]
    });
    [sum[0] / n, sum[1] / n]
}

fn average_i8(entries: &[SnrEntry]) -> [f32; 2] {
    if entries.is_empty() {
        return [0.0, 0.0];
    }
    let n = entries.len() as f32;
    let sum = entries.iter().fold([0.0f32; 2], |acc, e| {
        [acc[0] + e.ant[0] as f32, acc[1] + e.ant[1] as f32]
    });
    [sum[0] / n, sum[1] / n]
}

fn random_code() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..4)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
