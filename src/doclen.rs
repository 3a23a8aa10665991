//! Document-length chunk format.
//!
//! Document lengths are a posting list under the empty term, but their body
//! uses its own encoding: docids are assigned densely and lengths are small,
//! so runs of consecutive docids are packed as fixed-width blocks. A chunk
//! body is a sequence of blocks, each either
//! ```text
//! sparse:  gap(varint >= 1) doclen(varint)
//! dense:   0(varint) gap(varint >= 1) run_len(u16) width(u8) doclen[run_len] x width
//! ```
//! Varint value 0 is reserved as the dense-block marker: every gap is
//! encoded against the docid before the block (initially `first_did - 1`),
//! and docids in a chunk are strictly increasing, so a real gap is never 0.
//! All docids inside a dense block are consecutive, which is what makes the
//! reader's random-access `jump_to` a single offset computation.
//!
//! A run only goes dense when it is long enough to pay for the block header
//! and when padding every length to the widest one wastes little enough;
//! see [`ChunkParams`](crate::params::ChunkParams).

use std::collections::BTreeMap;

use crate::chunk::{make_chunk_header, make_first_chunk_header, read_chunk_header,
    read_first_chunk_header};
use crate::codec::{pack_uint, pack_uint_in_bytes, unpack_uint, unpack_uint32,
    unpack_uint_in_bytes};
use crate::error::{Error, Result};
use crate::keys::{make_chunk_key, make_key};
use crate::params::ChunkParams;
use crate::table::Table;
use crate::{DocId, TermCount};

/// Reserved gap value marking the start of a dense block.
const SEPARATOR: u64 = 0;

/// Minimum bytes needed to hold `v` (at least one).
fn byte_width(v: TermCount) -> usize {
    if v == 0 {
        return 1;
    }
    (32 - v.leading_zeros() as usize).div_ceil(8)
}

/// Encode a sorted slice of `(docid, doclen)` entries as a chunk body.
///
/// Greedily grows a candidate run from each position while docids stay
/// consecutive, lengths fit the run's width, and the good/used byte ratio
/// stays acceptable; long enough runs are emitted dense, everything else as
/// sparse pairs.
pub fn encode_body(
    entries: &[(DocId, TermCount)],
    first_did_in_chunk: DocId,
    params: &ChunkParams,
    out: &mut Vec<u8>,
) {
    let mut did_before = first_did_in_chunk.wrapping_sub(1);
    let mut i = 0;
    while i < entries.len() {
        let (start_did, start_len) = entries[i];
        let width = byte_width(start_len);
        let mut used = 0usize;
        let mut good = 0usize;
        let mut last_did = start_did;
        let mut j = i + 1;
        while j < entries.len() && j - i < usize::from(u16::MAX) {
            let (did, len) = entries[j];
            let w = byte_width(len);
            if did != last_did + 1 || w > width {
                break;
            }
            used += width;
            good += w;
            if (good as f64) / (used as f64) < params.doclen_min_good_ratio {
                break;
            }
            last_did = did;
            j += 1;
        }

        let run_len = j - i;
        if run_len > params.doclen_min_run {
            pack_uint(out, SEPARATOR);
            pack_uint(out, u64::from(start_did - did_before));
            pack_uint_in_bytes(run_len as u32, 2, out);
            pack_uint_in_bytes(width as u32, 1, out);
            for &(_, len) in &entries[i..j] {
                pack_uint_in_bytes(len, width, out);
            }
            did_before = last_did;
        } else {
            for &(did, len) in &entries[i..j] {
                pack_uint(out, u64::from(did - did_before));
                pack_uint(out, u64::from(len));
                did_before = did;
            }
        }
        i = j;
    }
}

/// Reader over one doclen chunk body with random access by docid.
#[derive(Debug)]
pub struct DoclenReader {
    data: Vec<u8>,
    pos: usize,
    /// Docid the next gap is relative to when rewound: `first_did - 1`.
    did_base: DocId,
    did: DocId,
    len: TermCount,
    at_end: bool,
    /// Inside a dense block with entries still unread.
    in_block: bool,
    block_remaining: u32,
    block_width: usize,
    /// Offset of the current block's first byte, for rewinding into it.
    block_start: usize,
    did_before_block: DocId,
}

impl DoclenReader {
    /// `data` is the chunk tag with both headers stripped. Positions on the
    /// first entry eagerly; an empty body starts at the end.
    pub fn new(data: Vec<u8>, first_did_in_chunk: DocId) -> Result<Self> {
        let did_base = first_did_in_chunk.wrapping_sub(1);
        let mut reader = DoclenReader {
            at_end: data.is_empty(),
            data,
            pos: 0,
            did_base,
            did: did_base,
            len: 0,
            in_block: false,
            block_remaining: 0,
            block_width: 0,
            block_start: 0,
            did_before_block: did_base,
        };
        if !reader.at_end {
            reader.next()?;
        }
        Ok(reader)
    }

    pub fn docid(&self) -> DocId {
        self.did
    }

    pub fn doclen(&self) -> TermCount {
        self.len
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }


    /// Advance to the next entry; returns false once the body runs out.
    pub fn next(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(false);
        }
        if self.in_block {
            self.did += 1;
            self.block_remaining -= 1;
            if self.block_remaining == 0 {
                self.in_block = false;
            }
            let mut src = &self.data[self.pos..];
            self.len = unpack_uint_in_bytes(&mut src, self.block_width)?;
            self.pos = self.data.len() - src.len();
            return Ok(true);
        }
        if self.pos == self.data.len() {
            self.at_end = true;
            return Ok(false);
        }

        self.block_start = self.pos;
        let mut src = &self.data[self.pos..];
        let gap = unpack_uint(&mut src)?;
        if gap != SEPARATOR {
            let gap = u32::try_from(gap).map_err(|_| Error::Range("docid gap too large"))?;
            self.did = self
                .did
                .checked_add(gap)
                .ok_or(Error::Range("docid overflows"))?;
            self.len = unpack_uint32(&mut src)?;
            self.pos = self.data.len() - src.len();
            return Ok(true);
        }

        // Dense block: gap to its first docid, run length, byte width.
        let gap = unpack_uint32(&mut src)?;
        let run_len = unpack_uint_in_bytes(&mut src, 2)?;
        if run_len == 0 {
            return Err(Error::Corrupt("empty fixed-width block".into()));
        }
        let width = unpack_uint_in_bytes(&mut src, 1)? as usize;
        if !(1..=4).contains(&width) {
            return Err(Error::Corrupt("invalid fixed-width block width".into()));
        }
        self.did_before_block = self.did;
        self.did = self
            .did
            .checked_add(gap)
            .ok_or(Error::Range("docid overflows"))?;
        self.len = unpack_uint_in_bytes(&mut src, width)?;
        self.block_width = width;
        self.block_remaining = run_len - 1;
        self.in_block = self.block_remaining > 0;
        self.pos = self.data.len() - src.len();
        Ok(true)
    }

    /// Position on `desired` if it is stored in this chunk.
    ///
    /// Returns true and positions exactly on `desired` when present. When
    /// absent, leaves the reader on the next stored docid above `desired`
    /// (or at the end) and returns false. Jumping backwards rewinds to the
    /// start of the current block or of the whole body as needed.
    pub fn jump_to(&mut self, desired: DocId) -> Result<bool> {
        if self.data.is_empty() {
            return Ok(false);
        }
        if self.did == desired {
            return Ok(true);
        }

        if self.in_block {
            if self.did_before_block >= desired {
                self.rewind();
            } else {
                self.pos = self.block_start;
                self.did = self.did_before_block;
                self.in_block = false;
            }
            self.at_end = false;
        } else if self.did >= desired {
            self.rewind();
            self.at_end = false;
        }

        while self.pos < self.data.len() {
            self.block_start = self.pos;
            let mut src = &self.data[self.pos..];
            let gap = unpack_uint(&mut src)?;
            if gap != SEPARATOR {
                let gap = u32::try_from(gap).map_err(|_| Error::Range("docid gap too large"))?;
                self.in_block = false;
                self.did = self
                    .did
                    .checked_add(gap)
                    .ok_or(Error::Range("docid overflows"))?;
                self.len = unpack_uint32(&mut src)?;
                self.pos = self.data.len() - src.len();
                if self.did >= desired {
                    return Ok(self.did == desired);
                }
                continue;
            }

            let gap = unpack_uint32(&mut src)?;
            let run_len = unpack_uint_in_bytes(&mut src, 2)?;
            if run_len == 0 {
                return Err(Error::Corrupt("empty fixed-width block".into()));
            }
            let width = unpack_uint_in_bytes(&mut src, 1)? as usize;
            if !(1..=4).contains(&width) {
                return Err(Error::Corrupt("invalid fixed-width block width".into()));
            }
            self.did_before_block = self.did;
            self.block_width = width;
            self.did = self
                .did
                .checked_add(gap)
                .ok_or(Error::Range("docid overflows"))?;

            if desired < self.did {
                // Desired falls in the hole before this block; settle on the
                // block's first entry.
                self.len = unpack_uint_in_bytes(&mut src, width)?;
                self.block_remaining = run_len - 1;
                self.in_block = self.block_remaining > 0;
                self.pos = self.data.len() - src.len();
                return Ok(false);
            }
            let block_last = self
                .did
                .checked_add(run_len - 1)
                .ok_or(Error::Range("docid overflows"))?;
            if desired <= block_last {
                let skip = (desired - self.did) as usize * width;
                if src.len() < skip {
                    return Err(Error::Corrupt("posting data ran out".into()));
                }
                src = &src[skip..];
                self.len = unpack_uint_in_bytes(&mut src, width)?;
                self.block_remaining = block_last - desired;
                self.in_block = self.block_remaining > 0;
                self.did = desired;
                self.pos = self.data.len() - src.len();
                return Ok(true);
            }

            // Skip the whole block.
            let skip = run_len as usize * width;
            if src.len() < skip {
                return Err(Error::Corrupt("posting data ran out".into()));
            }
            src = &src[skip..];
            self.did = block_last;
            self.in_block = false;
            self.pos = self.data.len() - src.len();
        }

        self.at_end = true;
        Ok(false)
    }

    /// Random-access lookup: the stored length of `desired`, if any.
    pub fn find(&mut self, desired: DocId) -> Result<Option<TermCount>> {
        Ok(self.jump_to(desired)?.then_some(self.len))
    }

    fn rewind(&mut self) {
        self.pos = 0;
        self.did = self.did_base;
        self.in_block = false;
    }
}

/// Decode a whole chunk body into an ordered map.
pub fn decode_body(body: &[u8], first_did_in_chunk: DocId) -> Result<BTreeMap<DocId, TermCount>> {
    let mut map = BTreeMap::new();
    let mut reader = DoclenReader::new(body.to_vec(), first_did_in_chunk)?;
    while !reader.at_end() {
        map.insert(reader.docid(), reader.doclen());
        if !reader.next()? {
            break;
        }
    }
    Ok(map)
}

/// Merges a batch of doclen changes into one existing chunk, re-emitting it
/// as one or more size-bounded chunks.
#[derive(Debug)]
pub struct DoclenChunkWriter<'a> {
    original: &'a [u8],
    is_first_chunk: bool,
    first_did_in_chunk: DocId,
    params: ChunkParams,
}

impl<'a> DoclenChunkWriter<'a> {
    /// `original` is the full stored tag of the chunk being rewritten (the
    /// caller deletes its key; this writer only adds the replacements).
    pub fn new(
        original: &'a [u8],
        is_first_chunk: bool,
        first_did_in_chunk: DocId,
        params: ChunkParams,
    ) -> Self {
        DoclenChunkWriter {
            original,
            is_first_chunk,
            first_did_in_chunk,
            params,
        }
    }

    /// Apply `changes` (`None` deletes a docid) and write the result back.
    ///
    /// An emptied chunk writes nothing. A chunk that grew past the entry
    /// bound splits into consecutive chunks; the last one inherits the
    /// original's last-chunk flag, and the first keeps the original's
    /// first-chunk status (with zero freq counts, which the doclen list
    /// never uses).
    pub fn merge<T, I>(&self, table: &mut T, changes: I) -> Result<()>
    where
        T: Table,
        I: IntoIterator<Item = (DocId, Option<TermCount>)>,
    {
        let mut src = self.original;
        if self.is_first_chunk {
            read_first_chunk_header(&mut src)?;
        }
        let (was_last_chunk, _) = read_chunk_header(&mut src, self.first_did_in_chunk)?;

        let mut doclens = decode_body(src, self.first_did_in_chunk)?;
        for (did, change) in changes {
            match change {
                Some(len) => {
                    doclens.insert(did, len);
                }
                None => {
                    doclens.remove(&did);
                }
            }
        }
        if doclens.is_empty() {
            log::debug!("doclen chunk emptied, leaving it deleted");
            return Ok(());
        }

        let entries: Vec<(DocId, TermCount)> = doclens.into_iter().collect();
        let runs: Vec<&[(DocId, TermCount)]> =
            entries.chunks(self.params.doclen_max_chunk_entries).collect();
        for (idx, run) in runs.iter().enumerate() {
            let first = run[0].0;
            let last = run[run.len() - 1].0;
            let is_first = self.is_first_chunk && idx == 0;
            let is_last = was_last_chunk && idx == runs.len() - 1;

            let mut tag = Vec::new();
            if is_first {
                make_first_chunk_header(0, 0, first, &mut tag);
            }
            make_chunk_header(is_last, first, last, &mut tag);
            encode_body(run, first, &self.params, &mut tag);

            let key = if is_first {
                make_key(b"")
            } else {
                make_chunk_key(b"", first)
            };
            table.add(&key, &tag)?;
        }
        Ok(())
    }
}
