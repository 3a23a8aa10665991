//! Standard posting chunk format: headers, body reader, body writer.
//!
//! A posting list is split into chunks, each one table entry:
//! ```text
//! first chunk   (key = term):
//!   entries(varint) collfreq(varint) first_did-1(varint)   <- first-chunk header
//!   is_last(bool) last_did-first_did(varint)               <- chunk header
//!   wdf0(varint) [gap(varint) wdf(varint)]...              <- body
//! continuation  (key = term + sortable(first_did)):
//!   is_last(bool) last_did-first_did(varint)
//!   wdf0(varint) [gap(varint) wdf(varint)]...
//! ```
//! `gap` is `next_did - prev_did - 1`; the first entry's docid comes from
//! the header (first chunk) or the key (continuation), so the body starts
//! directly with its wdf. Exactly one chunk per term carries `is_last`.

use crate::codec::{pack_bool, pack_uint, unpack_bool, unpack_uint32};
use crate::error::{Error, Result};
use crate::keys::{first_did_from_suffix, make_chunk_key, make_key};
use crate::params::ChunkParams;
use crate::table::Table;
use crate::{DocCount, DocId, TermCount};

/// Append the header carried only by a term's first chunk.
///
/// Docids are 1-based, so `first_did - 1` keeps the common case short; the
/// subtraction wraps for the doclen list's placeholder chunk (`first_did`
/// of 0) and unwraps on read.
pub fn make_first_chunk_header(
    entries: DocCount,
    collfreq: TermCount,
    first_did: DocId,
    out: &mut Vec<u8>,
) {
    pack_uint(out, u64::from(entries));
    pack_uint(out, u64::from(collfreq));
    pack_uint(out, u64::from(first_did.wrapping_sub(1)));
}

/// Read the termfreq and collfreq fields of a first-chunk header.
pub fn read_freqs(src: &mut &[u8]) -> Result<(DocCount, TermCount)> {
    let entries = unpack_uint32(src)?;
    let collfreq = unpack_uint32(src)?;
    Ok((entries, collfreq))
}

/// Read a full first-chunk header, returning `(entries, collfreq, first_did)`.
pub fn read_first_chunk_header(src: &mut &[u8]) -> Result<(DocCount, TermCount, DocId)> {
    let (entries, collfreq) = read_freqs(src)?;
    let first_did = unpack_uint32(src)?.wrapping_add(1);
    Ok((entries, collfreq, first_did))
}

/// Append the header every chunk carries.
pub fn make_chunk_header(is_last: bool, first_did: DocId, last_did: DocId, out: &mut Vec<u8>) {
    debug_assert!(last_did >= first_did);
    pack_bool(out, is_last);
    pack_uint(out, u64::from(last_did - first_did));
}

/// Read a chunk header, returning `(is_last, last_did)`.
pub fn read_chunk_header(src: &mut &[u8], first_did: DocId) -> Result<(bool, DocId)> {
    let is_last = unpack_bool(src)?;
    let span = unpack_uint32(src)?;
    let last_did = first_did
        .checked_add(span)
        .ok_or(Error::Range("last docid overflows"))?;
    Ok((is_last, last_did))
}

fn did_after_gap(did: DocId, gap: u32) -> Result<DocId> {
    did.checked_add(gap)
        .and_then(|d| d.checked_add(1))
        .ok_or(Error::Range("docid overflows"))
}

/// Forward iterator over one standard chunk body.
#[derive(Debug)]
pub struct ChunkReader {
    data: Vec<u8>,
    pos: usize,
    at_end: bool,
    did: DocId,
    wdf: TermCount,
}

impl ChunkReader {
    /// `data` is the chunk tag with both headers stripped; `first_did` is
    /// the first docid in the chunk. The first entry's wdf is read eagerly.
    pub fn new(first_did: DocId, data: Vec<u8>) -> Result<Self> {
        let mut reader = ChunkReader {
            at_end: data.is_empty(),
            data,
            pos: 0,
            did: first_did,
            wdf: 0,
        };
        if !reader.at_end {
            reader.wdf = reader.read_u32()?;
        }
        Ok(reader)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut src = &self.data[self.pos..];
        let v = unpack_uint32(&mut src)?;
        self.pos = self.data.len() - src.len();
        Ok(v)
    }

    pub fn docid(&self) -> DocId {
        self.did
    }

    pub fn wdf(&self) -> TermCount {
        self.wdf
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    /// Advance to the next entry; sets the end flag when the body runs out.
    pub fn next(&mut self) -> Result<()> {
        if self.pos == self.data.len() {
            self.at_end = true;
            return Ok(());
        }
        let gap = self.read_u32()?;
        self.did = did_after_gap(self.did, gap)?;
        self.wdf = self.read_u32()?;
        Ok(())
    }
}

/// Rewrites one chunk of a posting list, splitting when the body reaches the
/// size threshold and reconciling neighbour chunks on flush.
///
/// Intended for deletion and replacement of entries; plain appends to the
/// end of a list go through it too but never trigger the messy flush cases.
#[derive(Debug)]
pub struct ChunkWriter {
    orig_key: Vec<u8>,
    term: Vec<u8>,
    is_first_chunk: bool,
    is_last_chunk: bool,
    started: bool,
    first_did: DocId,
    current_did: DocId,
    body: Vec<u8>,
    chunk_size: usize,
}

impl ChunkWriter {
    pub fn new(
        orig_key: Vec<u8>,
        is_first_chunk: bool,
        term: &[u8],
        is_last_chunk: bool,
        params: &ChunkParams,
    ) -> Self {
        ChunkWriter {
            orig_key,
            term: term.to_vec(),
            is_first_chunk,
            is_last_chunk,
            started: false,
            first_did: 0,
            current_did: 0,
            body: Vec::new(),
            chunk_size: params.chunk_size,
        }
    }

    /// Append one entry. Entries must arrive in strictly ascending docid
    /// order. When the body has reached the size threshold the current
    /// chunk is flushed as a non-last chunk and a fresh one is started.
    pub fn append<T: Table>(&mut self, table: &mut T, did: DocId, wdf: TermCount) -> Result<()> {
        if !self.started {
            self.started = true;
            self.first_did = did;
        } else {
            debug_assert!(did > self.current_did);
            if self.body.len() >= self.chunk_size {
                let tail_is_last = self.is_last_chunk;
                self.is_last_chunk = false;
                self.flush(table)?;
                self.is_last_chunk = tail_is_last;
                self.is_first_chunk = false;
                self.first_did = did;
                self.body.clear();
                self.orig_key = make_chunk_key(&self.term, did);
            } else {
                pack_uint(&mut self.body, u64::from(did - self.current_did - 1));
            }
        }
        self.current_did = did;
        pack_uint(&mut self.body, u64::from(wdf));
        Ok(())
    }

    /// Adopt a complete pre-encoded body wholesale; used when edits do not
    /// overlap the existing chunk and its bytes can be copied untouched.
    pub fn raw_append(&mut self, first_did: DocId, current_did: DocId, body: &[u8]) {
        debug_assert!(!self.started);
        self.first_did = first_did;
        self.current_did = current_did;
        if !body.is_empty() {
            self.body.extend_from_slice(body);
            self.started = true;
        }
    }

    /// Write the chunk back to the table.
    ///
    /// Depending on what the rewrite left behind this deletes the chunk,
    /// overwrites it, files it under a new key, promotes the next chunk to
    /// first, or moves the last-chunk flag to the previous chunk. The tag
    /// may land under a different key than the one the writer was opened
    /// with when the first entry changed.
    pub fn flush<T: Table>(&mut self, table: &mut T) -> Result<()> {
        if !self.started {
            return self.flush_empty(table);
        }

        if self.is_first_chunk {
            // Recover the freq counts from the stored first chunk; the
            // merge driver keeps them up to date ahead of the body rewrite.
            let key = make_key(&self.term);
            let (entries, collfreq) = match table.get_exact(&key)? {
                Some(tag) => read_freqs(&mut &tag[..])?,
                None => (0, 0),
            };
            let mut tag = Vec::with_capacity(self.body.len() + 16);
            make_first_chunk_header(entries, collfreq, self.first_did, &mut tag);
            make_chunk_header(self.is_last_chunk, self.first_did, self.current_did, &mut tag);
            tag.extend_from_slice(&self.body);
            return table.add(&key, &tag);
        }

        // Continuation chunk. If the first entry changed, the key embedding
        // it must change too.
        let prefix = make_key(&self.term);
        if !self.orig_key.starts_with(&prefix) {
            return Err(Error::Corrupt("chunk key does not match its term".into()));
        }
        let initial_did = first_did_from_suffix(&self.orig_key[prefix.len()..])?;
        let new_key = if initial_did != self.first_did {
            table.del(&self.orig_key)?;
            make_chunk_key(&self.term, self.first_did)
        } else {
            self.orig_key.clone()
        };

        let mut tag = Vec::with_capacity(self.body.len() + 8);
        make_chunk_header(self.is_last_chunk, self.first_did, self.current_did, &mut tag);
        tag.extend_from_slice(&self.body);
        table.add(&new_key, &tag)
    }

    /// The rewrite left nothing in this chunk: it disappears, and a
    /// neighbour may need its header fixed up.
    fn flush_empty<T: Table>(&mut self, table: &mut T) -> Result<()> {
        debug_assert!(!self.orig_key.is_empty());

        if self.is_first_chunk {
            if self.is_last_chunk {
                // Only chunk; the whole posting list goes away.
                log::trace!("dropping only chunk of posting list");
                return table.del(&self.orig_key);
            }
            return self.promote_next_chunk(table);
        }

        table.del(&self.orig_key)?;
        if self.is_last_chunk {
            self.move_last_flag_back(table)?;
        }
        Ok(())
    }

    /// The first chunk emptied but continuation chunks remain: rewrite the
    /// next chunk as the first chunk, under the bare term key.
    fn promote_next_chunk<T: Table>(&mut self, table: &mut T) -> Result<()> {
        log::trace!("promoting next chunk to first");
        let first_tag = table
            .get_exact(&self.orig_key)?
            .ok_or_else(|| Error::Corrupt("first chunk vanished during rewrite".into()))?;
        let (entries, collfreq) = read_freqs(&mut &first_tag[..])?;

        let (next_key, next_tag) = table
            .seek_next(&self.orig_key)?
            .ok_or_else(|| Error::Corrupt("expected a continuation chunk but found none".into()))?;
        let prefix = make_key(&self.term);
        if !next_key.starts_with(&prefix) {
            return Err(Error::Corrupt(
                "continuation chunk belongs to a different term".into(),
            ));
        }
        let new_first_did = first_did_from_suffix(&next_key[prefix.len()..])?;

        let mut src = &next_tag[..];
        let (next_is_last, next_last_did) = read_chunk_header(&mut src, new_first_did)?;

        let mut tag = Vec::with_capacity(src.len() + 16);
        make_first_chunk_header(entries, collfreq, new_first_did, &mut tag);
        make_chunk_header(next_is_last, new_first_did, next_last_did, &mut tag);
        tag.extend_from_slice(src);

        table.del(&next_key)?;
        table.add(&self.orig_key, &tag)
    }

    /// The last chunk was deleted; the chunk before it becomes the last.
    fn move_last_flag_back<T: Table>(&mut self, table: &mut T) -> Result<()> {
        let (prev_key, prev_tag) = table
            .seek_floor(&self.orig_key)?
            .ok_or_else(|| Error::Corrupt("no chunk precedes the deleted last chunk".into()))?;
        let prefix = make_key(&self.term);
        if !prev_key.starts_with(&prefix) {
            return Err(Error::Corrupt(
                "chunk before the deleted last chunk has a different term".into(),
            ));
        }

        let mut src = &prev_tag[..];
        let first_did = if prev_key.len() == prefix.len() {
            read_first_chunk_header(&mut src)?.2
        } else {
            first_did_from_suffix(&prev_key[prefix.len()..])?
        };
        let header_start = prev_tag.len() - src.len();
        let (_, last_did) = read_chunk_header(&mut src, first_did)?;
        let header_end = prev_tag.len() - src.len();

        let mut tag = Vec::with_capacity(prev_tag.len());
        tag.extend_from_slice(&prev_tag[..header_start]);
        make_chunk_header(true, first_did, last_did, &mut tag);
        tag.extend_from_slice(&prev_tag[header_end..]);
        table.add(&prev_key, &tag)
    }
}
