//! Reed-Solomon erasure decoding for the block aggregator (spec §3, §4.C).
//!
//! Only the Vandermonde-matrix scheme is supported (enforced at the session
//! layer, spec §4.B); this module wraps `reed-solomon-erasure`'s GF(2^8)
//! codec, which implements exactly that family.

use crate::error::{Error, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;

/// A decoder for one `(k, n)` parameter pair. Building the Vandermonde
/// matrix is the expensive part, so sessions construct one of these and
/// reuse it for every block.
pub struct FecDecoder {
    k: usize,
    n: usize,
    codec: ReedSolomon,
}

impl FecDecoder {
    /// Build a decoder for `k` data shards and `n` total shards.
    pub fn new(k: u8, n: u8) -> Result<Self> {
        let (k, n) = (k as usize, n as usize);
        if k == 0 || k > n {
            return Err(Error::Fec(format!("invalid fec params k={k} n={n}")));
        }
        let codec = ReedSolomon::new(k, n - k)
            .map_err(|e| Error::Fec(format!("building RS({k},{}): {e}", n - k)))?;
        Ok(Self { k, n, codec })
    }

    /// Number of data shards.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Total shards (data + parity).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Reconstruct missing data shards in place.
    ///
    /// `shards[i]` is `Some(buf)` for every fragment index `i` that was
    /// actually received, `None` for gaps. All `Some` buffers must be the
    /// same length (fragments are padded to a fixed per-block shard size
    /// before encryption). On success every data shard (`0..k`) that was
    /// reconstructable is filled in.
    pub fn reconstruct_data(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        if shards.len() != self.n {
            return Err(Error::Fec(format!(
                "expected {} shards, got {}",
                self.n,
                shards.len()
            )));
        }
        self.codec
            .reconstruct_data(shards)
            .map_err(|e| Error::Fec(format!("reconstruct failed: {e}")))
    }
}
