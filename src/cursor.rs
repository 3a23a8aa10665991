//! Cursor over one term's posting list, walking its chunks in docid order.
//!
//! The cursor keeps no reference to the table; every operation that may
//! move between chunks takes the table as an argument, so a cursor can be
//! cached by a longer-lived owner without borrowing it.

use crate::chunk::{read_chunk_header, read_first_chunk_header};
use crate::codec::unpack_uint32;
use crate::doclen::DoclenReader;
use crate::error::{Error, Result};
use crate::keys::{first_did_from_suffix, make_chunk_key, make_key};
use crate::table::Table;
use crate::{DocCount, DocId, TermCount};

/// Stateful forward iterator with `skip_to` (term lists) and random-access
/// `jump_to` (doclen list) over all chunks of one posting list.
///
/// Construct with [`PostingListCursor::open`]; the first [`next`] positions
/// on the first entry. For the doclen list (empty term) the entry value is
/// the document length rather than a wdf.
///
/// [`next`]: PostingListCursor::next
#[derive(Debug)]
pub struct PostingListCursor {
    term: Vec<u8>,
    key_prefix: Vec<u8>,
    is_doclen_list: bool,
    exists: bool,
    /// Key of the chunk currently loaded.
    cursor_key: Vec<u8>,
    body: Vec<u8>,
    pos: usize,
    number_of_entries: DocCount,
    collection_freq: TermCount,
    first_did_in_chunk: DocId,
    last_did_in_chunk: DocId,
    did: DocId,
    wdf: TermCount,
    is_first_chunk: bool,
    is_last_chunk: bool,
    is_at_end: bool,
    have_started: bool,
    doclen: Option<DoclenReader>,
}

impl PostingListCursor {
    /// Open the posting list for `term`; the empty term opens the doclen
    /// list. A missing list yields a cursor that is already at the end.
    pub fn open<T: Table>(table: &T, term: &[u8]) -> Result<Self> {
        let key_prefix = make_key(term);
        let mut pl = PostingListCursor {
            term: term.to_vec(),
            is_doclen_list: term.is_empty(),
            exists: false,
            cursor_key: key_prefix.clone(),
            key_prefix,
            body: Vec::new(),
            pos: 0,
            number_of_entries: 0,
            collection_freq: 0,
            first_did_in_chunk: 0,
            last_did_in_chunk: 0,
            did: 0,
            wdf: 0,
            is_first_chunk: true,
            is_last_chunk: true,
            is_at_end: false,
            have_started: false,
            doclen: None,
        };

        let Some(tag) = table.get_exact(&pl.key_prefix)? else {
            log::trace!("posting list not found");
            pl.is_at_end = true;
            return Ok(pl);
        };
        pl.exists = true;

        let mut src = &tag[..];
        let (entries, collfreq, first_did) = read_first_chunk_header(&mut src)?;
        pl.number_of_entries = entries;
        pl.collection_freq = collfreq;
        let (is_last, last_did) = read_chunk_header(&mut src, first_did)?;
        pl.is_last_chunk = is_last;
        pl.first_did_in_chunk = first_did;
        pl.last_did_in_chunk = last_did;
        pl.did = first_did;
        pl.load_body(src, first_did)?;
        Ok(pl)
    }

    /// Load a chunk body (already past the headers) and position on its
    /// first entry.
    fn load_body(&mut self, src: &[u8], first_did: DocId) -> Result<()> {
        if self.is_doclen_list {
            let reader = DoclenReader::new(src.to_vec(), first_did)?;
            self.did = reader.docid();
            self.wdf = reader.doclen();
            self.is_at_end = reader.at_end();
            self.doclen = Some(reader);
        } else {
            self.body = src.to_vec();
            self.pos = 0;
            if self.body.is_empty() {
                // Header-only chunk (freshly created list).
                self.is_at_end = true;
            } else {
                self.wdf = self.read_u32()?;
            }
        }
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut src = &self.body[self.pos..];
        let v = unpack_uint32(&mut src)?;
        self.pos = self.body.len() - src.len();
        Ok(v)
    }

    pub fn docid(&self) -> DocId {
        self.did
    }

    /// Current wdf, or the document length on the doclen list.
    pub fn wdf(&self) -> TermCount {
        self.wdf
    }

    pub fn at_end(&self) -> bool {
        self.is_at_end
    }

    /// Number of documents in this posting list (from the first chunk
    /// header).
    pub fn doc_count(&self) -> DocCount {
        self.number_of_entries
    }

    pub fn collection_freq(&self) -> TermCount {
        self.collection_freq
    }

    /// Advance to the next entry; the first call positions on the first
    /// entry. Returns false once the end is reached.
    pub fn next<T: Table>(&mut self, table: &T) -> Result<bool> {
        if !self.have_started {
            self.have_started = true;
        } else if !self.next_in_chunk()? {
            self.next_chunk(table)?;
        }
        Ok(!self.is_at_end)
    }

    fn next_in_chunk(&mut self) -> Result<bool> {
        if let Some(reader) = &mut self.doclen {
            if reader.next()? {
                self.did = reader.docid();
                self.wdf = reader.doclen();
                self.is_at_end = reader.at_end();
                return Ok(true);
            }
            return Ok(false);
        }
        if self.pos == self.body.len() {
            return Ok(false);
        }
        let gap = self.read_u32()?;
        self.did = self
            .did
            .checked_add(gap)
            .and_then(|d| d.checked_add(1))
            .ok_or(Error::Range("docid overflows"))?;
        self.wdf = self.read_u32()?;
        debug_assert!(self.did <= self.last_did_in_chunk);
        Ok(true)
    }

    fn next_chunk<T: Table>(&mut self, table: &T) -> Result<()> {
        if self.is_last_chunk {
            self.is_at_end = true;
            return Ok(());
        }

        let Some((key, tag)) = table.seek_next(&self.cursor_key)? else {
            self.is_at_end = true;
            return Err(Error::Corrupt("posting list ends without a last chunk".into()));
        };
        if !key.starts_with(&self.key_prefix) {
            self.is_at_end = true;
            return Err(Error::Corrupt("posting list ends without a last chunk".into()));
        }
        let new_did = first_did_from_suffix(&key[self.key_prefix.len()..])?;
        if new_did <= self.did {
            return Err(Error::Corrupt(format!(
                "first docid {} of next chunk not above previous docid {}",
                new_did, self.did
            )));
        }

        self.is_first_chunk = false;
        self.cursor_key = key;
        self.did = new_did;
        let mut src = &tag[..];
        let (is_last, last_did) = read_chunk_header(&mut src, new_did)?;
        self.is_last_chunk = is_last;
        self.first_did_in_chunk = new_did;
        self.last_did_in_chunk = last_did;
        self.load_body(src, new_did)
    }

    fn current_chunk_contains(&self, did: DocId) -> bool {
        did >= self.first_did_in_chunk && did <= self.last_did_in_chunk
    }

    /// Seek the chunk whose key range covers `desired`; lands on the next
    /// chunk when `desired` falls in the gap between two chunks.
    fn move_to_chunk_containing<T: Table>(&mut self, table: &T, desired: DocId) -> Result<()> {
        let target = make_chunk_key(&self.term, desired);
        let found = table.seek_floor(&target)?;
        let Some((key, tag)) = found else {
            self.at_missing_list();
            return Ok(());
        };
        if !key.starts_with(&self.key_prefix) {
            self.at_missing_list();
            return Ok(());
        }
        self.is_at_end = false;

        let suffix_len = key.len() - self.key_prefix.len();
        self.is_first_chunk = suffix_len == 0;
        let mut src = &tag[..];
        if self.is_first_chunk {
            let (entries, _, first_did) = read_first_chunk_header(&mut src)?;
            debug_assert_eq!(entries, self.number_of_entries);
            self.did = first_did;
        } else {
            self.did = first_did_from_suffix(&key[self.key_prefix.len()..])?;
        }
        self.cursor_key = key;
        self.first_did_in_chunk = self.did;
        let (is_last, last_did) = read_chunk_header(&mut src, self.did)?;
        self.is_last_chunk = is_last;
        self.last_did_in_chunk = last_did;
        self.load_body(src, self.did)?;

        // The target may sit in the hole between this chunk and the next.
        if desired > self.last_did_in_chunk {
            self.next_chunk(table)?;
        }
        Ok(())
    }

    fn at_missing_list(&mut self) {
        self.is_at_end = true;
        self.is_last_chunk = true;
    }

    /// Move forward to the first entry with docid `>= desired`.
    ///
    /// On the doclen list this degrades to [`jump_to`](Self::jump_to).
    pub fn skip_to<T: Table>(&mut self, table: &T, desired: DocId) -> Result<()> {
        if self.is_doclen_list {
            self.jump_to(table, desired)?;
            return Ok(());
        }
        self.have_started = true;
        if self.is_at_end || desired <= self.did {
            return Ok(());
        }

        if !self.current_chunk_contains(desired) {
            self.move_to_chunk_containing(table, desired)?;
            if self.is_at_end {
                return Ok(());
            }
        }
        self.move_forward_in_chunk_to_at_least(desired)
    }

    fn move_forward_in_chunk_to_at_least(&mut self, desired: DocId) -> Result<()> {
        if self.did >= desired {
            return Ok(());
        }
        if desired > self.last_did_in_chunk {
            self.pos = self.body.len();
            return Ok(());
        }
        while self.pos < self.body.len() {
            let gap = self.read_u32()?;
            self.did = self
                .did
                .checked_add(gap)
                .and_then(|d| d.checked_add(1))
                .ok_or(Error::Range("docid overflows"))?;
            let wdf = self.read_u32()?;
            if self.did >= desired {
                self.wdf = wdf;
                return Ok(());
            }
        }
        Err(Error::Corrupt(
            "chunk ended before its recorded last docid".into(),
        ))
    }

    /// Position exactly on `desired` if it is present (doclen list).
    ///
    /// Returns true when found; on a miss the cursor rests on the next
    /// stored docid (or at the end) and false is returned. Term posting
    /// lists fall back to [`skip_to`](Self::skip_to) and report whether the
    /// exact docid was hit.
    pub fn jump_to<T: Table>(&mut self, table: &T, desired: DocId) -> Result<bool> {
        if !self.is_doclen_list {
            self.skip_to(table, desired)?;
            return Ok(!self.is_at_end && self.did == desired);
        }
        self.have_started = true;
        if !self.exists {
            return Ok(false);
        }

        if self.is_at_end || !self.current_chunk_contains(desired) || desired < self.did {
            self.is_at_end = false;
            self.move_to_chunk_containing(table, desired)?;
            if self.is_at_end {
                return Ok(false);
            }
        }

        let reader = self
            .doclen
            .as_mut()
            .ok_or_else(|| Error::Internal("doclen list without doclen reader".into()))?;
        let found = reader.jump_to(desired)?;
        self.did = reader.docid();
        self.wdf = reader.doclen();
        self.is_at_end = reader.at_end();
        Ok(found)
    }
}
