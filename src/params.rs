//! Tunable sizing parameters for chunk encoding.

use serde::{Deserialize, Serialize};

/// Sizing knobs for posting-list chunks.
///
/// The defaults define the stable on-disk layout; changing them only affects
/// how future writes are chunked, existing chunks remain readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Soft byte threshold after which a term chunk is split. A chunk may
    /// exceed this by the width of the entry being appended.
    pub chunk_size: usize,
    /// Minimum run length (exclusive) before consecutive doclens are emitted
    /// as a fixed-width block instead of varint pairs.
    pub doclen_min_run: usize,
    /// Minimum ratio of useful to allocated bytes for a fixed-width block;
    /// a run is cut when padding would push the ratio below this.
    pub doclen_min_good_ratio: f64,
    /// Maximum number of doclen entries per chunk.
    pub doclen_max_chunk_entries: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            doclen_min_run: 10,
            doclen_min_good_ratio: 0.6,
            doclen_max_chunk_entries: 2000,
        }
    }
}
