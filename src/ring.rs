//! The 40-slot ring of in-flight FEC blocks, spec §3/§4.C.
//!
//! Holds exactly one open block per ring position (`block_idx mod
//! RX_RING_SIZE`). A fragment's address decomposes as
//! `(block_idx, fragment_idx)` from the 64-bit AEAD nonce.

use crate::constants::RX_RING_SIZE;

/// Split a 64-bit DATA nonce into `(block_idx, fragment_idx)` (spec §3).
pub fn decompose_nonce(data_nonce: u64) -> (u64, u8) {
    (data_nonce >> 8, (data_nonce & 0xff) as u8)
}

/// Compose a 64-bit DATA nonce from `(block_idx, fragment_idx)`.
pub fn compose_nonce(block_idx: u64, fragment_idx: u8) -> u64 {
    (block_idx << 8) | fragment_idx as u64
}

/// One in-flight FEC block: `n` fragment slots, `k` of which are data.
pub struct BlockSlot {
    block_idx: u64,
    k: usize,
    n: usize,
    fragments: Vec<Option<Vec<u8>>>,
    shard_len: Option<usize>,
    received_count: usize,
}

impl BlockSlot {
    fn new(block_idx: u64, k: usize, n: usize) -> Self {
        Self {
            block_idx,
            k,
            n,
            fragments: vec![None; n],
            shard_len: None,
            received_count: 0,
        }
    }

    /// Block index this slot currently holds.
    pub fn block_idx(&self) -> u64 {
        self.block_idx
    }

    /// Place a decrypted fragment. Returns `false` if `fragment_idx` was
    /// already filled (duplicate) or its length disagrees with the other
    /// fragments already placed in this block.
    pub fn place(&mut self, fragment_idx: u8, plaintext: Vec<u8>) -> bool {
        let idx = fragment_idx as usize;
        if idx >= self.n || self.fragments[idx].is_some() {
            return false;
        }
        match self.shard_len {
            Some(len) if len != plaintext.len() => return false,
            None => self.shard_len = Some(plaintext.len()),
            _ => {}
        }
        self.fragments[idx] = Some(plaintext);
        self.received_count += 1;
        true
    }

    /// All `k` data fragments already present, no FEC needed.
    fn data_complete(&self) -> bool {
        self.fragments[..self.k].iter().all(Option::is_some)
    }

    /// Enough fragments (data or parity) received to attempt reconstruction.
    fn recoverable(&self) -> bool {
        self.received_count >= self.k
    }
}

/// Outcome of finalizing a block (whether by normal completion or forced
/// eviction).
pub enum Finalized {
    /// All `k` data fragments were received directly; no FEC needed.
    Delivered {
        /// Decrypted data fragments, indices `0..k`.
        fragments: Vec<Vec<u8>>,
    },
    /// At least `k` fragments (data or parity) arrived, but not all `k`
    /// data fragments directly: the caller must attempt Reed-Solomon
    /// reconstruction over `shards` (length `n`, `None` for gaps) to
    /// decide between delivery and loss.
    NeedsRecovery {
        /// All `n` fragment slots, `None` where nothing arrived.
        shards: Vec<Option<Vec<u8>>>,
        /// Number of data shards among `shards`.
        k: usize,
    },
    /// Fewer than `k` fragments were ever available: nothing is delivered.
    Lost,
}

/// The fixed-capacity window of in-flight blocks.
pub struct Ring {
    slots: Vec<Option<BlockSlot>>,
    /// Oldest block not yet finalized.
    front: Option<u64>,
    /// Highest block index ever admitted.
    head: u64,
}

impl Ring {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            slots: (0..RX_RING_SIZE).map(|_| None).collect(),
            front: None,
            head: 0,
        }
    }

    /// Flush all state. Used on session epoch change (spec invariant 4).
    pub fn reset(&mut self) {
        for s in &mut self.slots {
            *s = None;
        }
        self.front = None;
        self.head = 0;
    }

    fn slot_index(block_idx: u64) -> usize {
        (block_idx % RX_RING_SIZE) as usize
    }

    /// Whether `block_idx` is old enough to have already been evicted from
    /// the window (spec §4.C admission bullet 1).
    pub fn is_stale(&self, block_idx: u64) -> bool {
        self.front.is_some() && self.head.saturating_sub(block_idx) >= RX_RING_SIZE
    }

    /// Admit a fragment, advancing the front/head and finalizing any blocks
    /// that fall out of the window as a side effect. Returns the finalized
    /// blocks produced by that advance (oldest first), plus whether the
    /// fragment was actually placed (`false` on duplicate or shard-length
    /// mismatch).
    pub fn admit(
        &mut self,
        block_idx: u64,
        fragment_idx: u8,
        k: u8,
        n: u8,
        plaintext: Vec<u8>,
    ) -> (Vec<(u64, Finalized)>, bool) {
        let mut finalized = Vec::new();

        if self.front.is_none() {
            self.front = Some(block_idx);
            self.head = block_idx;
        } else if block_idx > self.head {
            self.head = block_idx;
            // Any still-open block strictly older than the one just seen
            // has had its transmission window close: the transmitter has
            // moved on. Finalize them in order.
            while self.front.unwrap() < block_idx {
                let f = self.front.unwrap();
                finalized.push((f, self.finalize_slot(f)));
                self.front = Some(f + 1);
            }
        }

        let idx = Self::slot_index(block_idx);
        let needs_new_slot = match &self.slots[idx] {
            Some(slot) => slot.block_idx() != block_idx,
            None => true,
        };
        if needs_new_slot {
            self.slots[idx] = Some(BlockSlot::new(block_idx, k as usize, n as usize));
        }

        let placed = self.slots[idx]
            .as_mut()
            .map(|s| s.place(fragment_idx, plaintext))
            .unwrap_or(false);

        // A freshly-completed front block delivers immediately, without
        // waiting for a later block to force it out.
        while self.front == Some(block_idx) && self.slot_ready(block_idx) {
            finalized.push((block_idx, self.finalize_slot(block_idx)));
            self.front = Some(block_idx + 1);
        }

        (finalized, placed)
    }

    fn slot_ready(&self, block_idx: u64) -> bool {
        self.slots[Self::slot_index(block_idx)]
            .as_ref()
            .map(|s| s.block_idx() == block_idx && (s.data_complete() || s.recoverable()))
            .unwrap_or(false)
    }

    /// Deliver-or-declare-lost the block at `block_idx` and free its slot.
    /// When fewer than `n` fragments arrived but at least `k` did, this
    /// hands the raw shards back via [`Finalized::NeedsRecovery`] for the
    /// aggregator (which owns the FEC codec) to attempt reconstruction.
    fn finalize_slot(&mut self, block_idx: u64) -> Finalized {
        let idx = Self::slot_index(block_idx);
        let slot = match self.slots[idx].take() {
            Some(s) if s.block_idx() == block_idx => s,
            other => {
                self.slots[idx] = other;
                return Finalized::Lost;
            }
        };
        if slot.data_complete() {
            let fragments = slot
                .fragments
                .into_iter()
                .take(slot.k)
                .map(|f| f.unwrap())
                .collect();
            Finalized::Delivered { fragments }
        } else if slot.recoverable() {
            Finalized::NeedsRecovery {
                shards: slot.fragments,
                k: slot.k,
            }
        } else {
            Finalized::Lost
        }
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_roundtrip() {
        let (b, f) = decompose_nonce(compose_nonce(12345, 7));
        assert_eq!((b, f), (12345, 7));
    }

    #[test]
    fn delivers_block_once_all_data_fragments_present() {
        let mut ring = Ring::new();
        let mut last = Vec::new();
        for i in 0..8u8 {
            let (finalized, placed) = ring.admit(0, i, 8, 12, vec![i; 4]);
            assert!(placed);
            last = finalized;
        }
        assert_eq!(last.len(), 1);
        match &last[0].1 {
            Finalized::Delivered { fragments } => assert_eq!(fragments.len(), 8),
            _ => panic!("expected delivery"),
        }
    }

    #[test]
    fn duplicate_fragment_is_rejected() {
        let mut ring = Ring::new();
        let (_, first) = ring.admit(0, 0, 8, 12, vec![1; 4]);
        assert!(first);
        let (_, second) = ring.admit(0, 0, 8, 12, vec![1; 4]);
        assert!(!second);
    }

    #[test]
    fn advancing_head_finalizes_the_stalled_front_block_as_lost() {
        let mut ring = Ring::new();
        for i in 0..4u8 {
            ring.admit(0, i, 8, 12, vec![i; 4]);
        }
        let (finalized, _) = ring.admit(1, 0, 8, 12, vec![0; 4]);
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].0, 0);
        assert!(matches!(finalized[0].1, Finalized::Lost));
    }

    #[test]
    fn stale_block_rejected_once_ring_has_wrapped() {
        let mut ring = Ring::new();
        ring.admit(0, 0, 8, 12, vec![0; 4]);
        ring.admit(RX_RING_SIZE, 0, 8, 12, vec![0; 4]);
        assert!(ring.is_stale(0));
    }
}
