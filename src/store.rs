//! Top-level posting-list store over an ordered table.
//!
//! Reads go through [`PostingListCursor`]; writes arrive as per-term change
//! batches and rewrite the minimum set of chunks. A cached doclen cursor
//! serves `get_doclength` / `document_exists` without reopening the doclen
//! list on every call.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::changes::PostingChanges;
use crate::chunk::{
    ChunkReader, ChunkWriter, make_chunk_header, make_first_chunk_header, read_chunk_header,
    read_first_chunk_header, read_freqs,
};
use crate::cursor::PostingListCursor;
use crate::doclen::DoclenChunkWriter;
use crate::error::{Error, Result};
use crate::keys::{first_did_from_suffix, make_chunk_key, make_key};
use crate::params::ChunkParams;
use crate::table::Table;
use crate::{DocCount, DocId, TermCount};

/// Posting-list storage engine over an ordered key-value table.
pub struct PostingStore<T: Table> {
    table: T,
    params: ChunkParams,
    /// Lazily opened cursor on the doclen list; invalidated whenever doclen
    /// chunks are rewritten.
    doclen_cursor: Mutex<Option<PostingListCursor>>,
}

impl<T: Table> PostingStore<T> {
    pub fn new(table: T) -> Self {
        Self::with_params(table, ChunkParams::default())
    }

    pub fn with_params(table: T, params: ChunkParams) -> Self {
        PostingStore {
            table,
            params,
            doclen_cursor: Mutex::new(None),
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn into_table(self) -> T {
        self.table
    }

    /// Term frequency and collection frequency of `term`; `(0, 0)` for a
    /// term with no postings.
    pub fn get_freqs(&self, term: &[u8]) -> Result<(DocCount, TermCount)> {
        match self.table.get_exact(&make_key(term))? {
            None => Ok((0, 0)),
            Some(tag) => read_freqs(&mut &tag[..]),
        }
    }

    /// Length of document `did`, from the doclen list.
    pub fn get_doclength(&self, did: DocId) -> Result<TermCount> {
        let mut cached = self.doclen_cursor.lock();
        if cached.is_none() {
            *cached = Some(PostingListCursor::open(&self.table, b"")?);
        }
        let pl = cached.as_mut().expect("cursor just opened");
        if pl.jump_to(&self.table, did)? {
            Ok(pl.wdf())
        } else {
            Err(Error::DocNotFound(did))
        }
    }

    /// Whether document `did` has an entry in the doclen list.
    pub fn document_exists(&self, did: DocId) -> Result<bool> {
        match self.get_doclength(did) {
            Ok(_) => Ok(true),
            Err(Error::DocNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open a cursor over `term`'s postings (the empty term reads the
    /// doclen list).
    pub fn postings(&self, term: &[u8]) -> Result<PostingListCursor> {
        PostingListCursor::open(&self.table, term)
    }

    /// Apply one term's batch of posting changes, rewriting the chunks it
    /// touches.
    pub fn merge_changes(&mut self, term: &[u8], changes: &PostingChanges) -> Result<()> {
        if term.is_empty() {
            return Err(Error::Internal(
                "doclen changes must go through merge_doclen_changes".into(),
            ));
        }

        // Bring the first-chunk header up to date (or zap the whole list)
        // before touching any bodies.
        let key = make_key(term);
        let tag = self.table.get_exact(&key)?;
        let (termfreq, collfreq, first_did, last_did, is_last) = match &tag {
            None => (0, 0, 0, 0, true),
            Some(tag) => {
                let mut src = &tag[..];
                let (tf, cf, first_did) = read_first_chunk_header(&mut src)?;
                let (is_last, last_did) = read_chunk_header(&mut src, first_did)?;
                (tf, cf, first_did, last_did, is_last)
            }
        };

        let termfreq = checked_count(i64::from(termfreq) + changes.tf_delta())?;
        if termfreq == 0 {
            log::debug!("all postings deleted, dropping posting list");
            self.delete_list(&key, is_last)?;
            return Ok(());
        }
        let collfreq = checked_count(i64::from(collfreq) + changes.cf_delta())?;

        let mut newtag = Vec::new();
        make_first_chunk_header(termfreq, collfreq, first_did, &mut newtag);
        make_chunk_header(is_last, first_did, last_did, &mut newtag);
        match &tag {
            None => self.table.add(&key, &newtag)?,
            Some(tag) => {
                let mut src = &tag[..];
                read_first_chunk_header(&mut src)?;
                read_chunk_header(&mut src, first_did)?;
                newtag.extend_from_slice(src);
                self.table.add(&key, &newtag)?;
            }
        }

        let Some((&first_change, _)) = changes.entries().iter().next() else {
            return Ok(());
        };
        let (mut reader, mut writer, mut max_did) = self.get_chunk(term, first_change, false)?;

        for (&did, &new_wdf) in changes.entries() {
            loop {
                // Copy untouched entries below the change point.
                if let Some(r) = reader.as_mut() {
                    while !r.at_end() {
                        let copy_did = r.docid();
                        if copy_did >= did {
                            if copy_did == did {
                                r.next()?;
                            }
                            break;
                        }
                        let wdf = r.wdf();
                        writer.append(&mut self.table, copy_did, wdf)?;
                        r.next()?;
                    }
                }
                let drained = reader.as_ref().is_none_or(|r| r.at_end());
                if drained && did > max_did {
                    writer.flush(&mut self.table)?;
                    let next = self.get_chunk(term, did, false)?;
                    reader = next.0;
                    writer = next.1;
                    max_did = next.2;
                    continue;
                }
                break;
            }
            if let Some(wdf) = new_wdf {
                writer.append(&mut self.table, did, wdf)?;
            }
        }

        if let Some(r) = reader.as_mut() {
            while !r.at_end() {
                let (did, wdf) = (r.docid(), r.wdf());
                writer.append(&mut self.table, did, wdf)?;
                r.next()?;
            }
        }
        writer.flush(&mut self.table)
    }

    /// Apply a batch of doclen changes, walking the doclen chunks that
    /// cover them and rebuilding each in turn.
    pub fn merge_doclen_changes(
        &mut self,
        doclens: &BTreeMap<DocId, Option<TermCount>>,
    ) -> Result<()> {
        // Chunks are about to move; the cached cursor would go stale.
        *self.doclen_cursor.get_mut() = None;

        if doclens.is_empty() {
            return Ok(());
        }

        let bare_key = make_key(b"");
        if !self.table.key_exists(&bare_key)? {
            log::debug!("creating placeholder first doclen chunk");
            let mut tag = Vec::new();
            make_first_chunk_header(0, 0, 0, &mut tag);
            make_chunk_header(true, 0, 0, &mut tag);
            self.table.add(&bare_key, &tag)?;
        }

        let mut next_change = *doclens.keys().next().expect("batch not empty");
        loop {
            let target = make_chunk_key(b"", next_change);
            let (key, tag) = self
                .table
                .seek_floor(&target)?
                .filter(|(k, _)| k.starts_with(&bare_key))
                .ok_or_else(|| Error::Corrupt("doclen list has no covering chunk".into()))?;

            let is_first_chunk = key.len() == bare_key.len();
            let mut src = &tag[..];
            let first_did_in_chunk = if is_first_chunk {
                read_first_chunk_header(&mut src)?.2
            } else {
                first_did_from_suffix(&key[bare_key.len()..])?
            };
            let (is_last_chunk, _) = read_chunk_header(&mut src, first_did_in_chunk)?;

            // Everything below the next chunk's first docid belongs here.
            let boundary = if is_last_chunk {
                None
            } else {
                let (next_key, _) = self
                    .table
                    .seek_next(&key)?
                    .filter(|(k, _)| k.starts_with(&bare_key))
                    .ok_or_else(|| {
                        Error::Corrupt("doclen list ends without a last chunk".into())
                    })?;
                Some(first_did_from_suffix(&next_key[bare_key.len()..])?)
            };

            let batch: Vec<(DocId, Option<TermCount>)> = match boundary {
                None => doclens.range(next_change..).map(|(&d, &v)| (d, v)).collect(),
                Some(b) => doclens.range(next_change..b).map(|(&d, &v)| (d, v)).collect(),
            };

            self.table.del(&key)?;
            DoclenChunkWriter::new(&tag, is_first_chunk, first_did_in_chunk, self.params)
                .merge(&mut self.table, batch)?;

            let Some(boundary) = boundary else { break };
            match doclens.range(boundary..).next() {
                None => break,
                Some((&did, _)) => next_change = did,
            }
        }
        Ok(())
    }

    /// Delete every chunk of the posting list whose first chunk is at
    /// `key`.
    fn delete_list(&mut self, key: &[u8], is_last: bool) -> Result<()> {
        self.table.del(key)?;
        if is_last {
            return Ok(());
        }
        let mut cursor = key.to_vec();
        while let Some((next, _)) = self.table.seek_next(&cursor)? {
            if !next.starts_with(key) {
                break;
            }
            self.table.del(&next)?;
            cursor = next;
        }
        Ok(())
    }

    /// Locate the chunk that should hold `did` and prepare its rewrite.
    ///
    /// Returns the reader over the existing body (`None` when the chunk's
    /// range lies entirely below `did`, in which case the body has already
    /// been adopted wholesale by the writer), the writer, and the largest
    /// docid this chunk may hold before the next chunk begins.
    fn get_chunk(
        &self,
        term: &[u8],
        did: DocId,
        adding: bool,
    ) -> Result<(Option<ChunkReader>, ChunkWriter, DocId)> {
        let prefix = make_key(term);
        let found = self
            .table
            .seek_floor(&make_chunk_key(term, did))?
            .filter(|(k, _)| k.starts_with(&prefix));
        let Some((key, tag)) = found else {
            if !adding {
                return Err(Error::Corrupt(
                    "attempted to modify a non-existent posting list".into(),
                ));
            }
            let writer = ChunkWriter::new(prefix, true, term, true, &self.params);
            return Ok((None, writer, DocId::MAX));
        };

        let is_first_chunk = key.len() == prefix.len();
        let mut src = &tag[..];
        let first_did_in_chunk = if is_first_chunk {
            read_first_chunk_header(&mut src)?.2
        } else {
            first_did_from_suffix(&key[prefix.len()..])?
        };
        let (is_last_chunk, last_did_in_chunk) = read_chunk_header(&mut src, first_did_in_chunk)?;

        let mut writer = ChunkWriter::new(key.clone(), is_first_chunk, term, is_last_chunk, &self.params);
        let reader = if did > last_did_in_chunk {
            // Wholesale copy: nothing in this chunk needs decoding.
            writer.raw_append(first_did_in_chunk, last_did_in_chunk, src);
            None
        } else {
            Some(ChunkReader::new(first_did_in_chunk, src.to_vec())?)
        };

        if is_last_chunk {
            return Ok((reader, writer, DocId::MAX));
        }
        let (next_key, _) = self
            .table
            .seek_next(&key)?
            .filter(|(k, _)| k.starts_with(&prefix))
            .ok_or_else(|| Error::Corrupt("posting list ends without a last chunk".into()))?;
        let next_first = first_did_from_suffix(&next_key[prefix.len()..])?;
        if next_first == 0 {
            return Err(Error::Corrupt("continuation chunk with docid 0".into()));
        }
        Ok((reader, writer, next_first - 1))
    }
}

fn checked_count(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        if value < 0 {
            Error::Corrupt("posting list frequency went negative".into())
        } else {
            Error::Range("posting list frequency too large")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemTable;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn batch(entries: &[(DocId, Option<TermCount>)]) -> BTreeMap<DocId, Option<TermCount>> {
        entries.iter().copied().collect()
    }

    fn collect(store: &PostingStore<MemTable>, term: &[u8]) -> Vec<(DocId, TermCount)> {
        let mut pl = store.postings(term).unwrap();
        let mut out = Vec::new();
        while pl.next(store.table()).unwrap() {
            out.push((pl.docid(), pl.wdf()));
        }
        out
    }

    /// Walk every chunk of `term` and check the structural invariants the
    /// format promises.
    fn check_invariants(store: &PostingStore<MemTable>, term: &[u8]) {
        let prefix = make_key(term);
        let chunks: Vec<(Vec<u8>, Vec<u8>)> = store
            .table()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        if chunks.is_empty() {
            return;
        }
        assert_eq!(chunks[0].0, prefix, "first chunk must use the bare key");

        let mut all_docids: Vec<DocId> = Vec::new();
        let mut total_wdf: u64 = 0;
        let mut last_flags = Vec::new();
        for (idx, (key, tag)) in chunks.iter().enumerate() {
            let mut src = &tag[..];
            let first_did = if idx == 0 {
                read_first_chunk_header(&mut src).unwrap().2
            } else {
                first_did_from_suffix(&key[prefix.len()..]).unwrap()
            };
            let (is_last, last_did) = read_chunk_header(&mut src, first_did).unwrap();
            last_flags.push(is_last);
            assert!(src.len() <= store.params.chunk_size + 32, "chunk body too large");

            let mut r = ChunkReader::new(first_did, src.to_vec()).unwrap();
            let mut chunk_docids = Vec::new();
            while !r.at_end() {
                chunk_docids.push(r.docid());
                total_wdf += u64::from(r.wdf());
                r.next().unwrap();
            }
            if !chunk_docids.is_empty() {
                assert_eq!(*chunk_docids.first().unwrap(), first_did);
                assert_eq!(*chunk_docids.last().unwrap(), last_did);
            }
            all_docids.extend(chunk_docids);
        }
        assert!(all_docids.windows(2).all(|w| w[0] < w[1]), "docids not ascending");
        assert_eq!(
            last_flags.iter().filter(|&&l| l).count(),
            1,
            "exactly one last chunk"
        );
        assert!(*last_flags.last().unwrap(), "last flag must be on the final chunk");

        let (tf, cf) = store.get_freqs(term).unwrap();
        assert_eq!(tf as usize, all_docids.len(), "termfreq mismatch");
        assert_eq!(u64::from(cf), total_wdf, "collfreq mismatch");
    }

    #[test]
    fn single_term_insert() {
        let mut store = PostingStore::new(MemTable::new());
        let changes = PostingChanges::from_parts(
            3,
            6,
            batch(&[(1, Some(2)), (4, Some(1)), (9, Some(3))]),
        );
        store.merge_changes(b"cat", &changes).unwrap();

        assert!(store.table().get_exact(&make_key(b"cat")).unwrap().is_some());
        assert_eq!(store.table().len(), 1);
        assert_eq!(store.get_freqs(b"cat").unwrap(), (3, 6));
        assert_eq!(collect(&store, b"cat"), vec![(1, 2), (4, 1), (9, 3)]);
        check_invariants(&store, b"cat");
    }

    #[test]
    fn deletion_shrinks_to_empty() {
        let mut store = PostingStore::new(MemTable::new());
        store
            .merge_changes(
                b"cat",
                &PostingChanges::from_parts(3, 6, batch(&[(1, Some(2)), (4, Some(1)), (9, Some(3))])),
            )
            .unwrap();
        store
            .merge_changes(
                b"cat",
                &PostingChanges::from_parts(-3, -6, batch(&[(1, None), (4, None), (9, None)])),
            )
            .unwrap();
        assert!(store.table().is_empty());
        assert_eq!(store.get_freqs(b"cat").unwrap(), (0, 0));
    }

    #[test]
    fn large_insert_splits_into_chunks() {
        let mut store = PostingStore::new(MemTable::new());
        let mut changes = PostingChanges::new();
        for did in 1..=10_000u32 {
            changes.add(did, 1);
        }
        store.merge_changes(b"cat", &changes).unwrap();

        assert!(store.table().len() > 1, "expected several chunks");
        let expect: Vec<(DocId, TermCount)> = (1..=10_000).map(|d| (d, 1)).collect();
        assert_eq!(collect(&store, b"cat"), expect);
        check_invariants(&store, b"cat");
    }

    #[test]
    fn doclen_dense_run() {
        let mut store = PostingStore::new(MemTable::new());
        let entries: Vec<(DocId, Option<TermCount>)> = (1..=100).map(|d| (d, Some(5))).collect();
        store.merge_doclen_changes(&batch(&entries)).unwrap();

        assert_eq!(store.table().len(), 1);
        let tag = store.table().get_exact(&make_key(b"")).unwrap().unwrap();
        let mut src = &tag[..];
        read_first_chunk_header(&mut src).unwrap();
        read_chunk_header(&mut src, 1).unwrap();
        // Body opens with the dense-block marker.
        assert_eq!(src[0], 0);

        let expect: Vec<(DocId, TermCount)> = (1..=100).map(|d| (d, 5)).collect();
        assert_eq!(collect(&store, b""), expect);
        assert_eq!(store.get_doclength(50).unwrap(), 5);
        assert!(store.document_exists(100).unwrap());
        assert!(!store.document_exists(101).unwrap());
    }

    #[test]
    fn doclen_sparse_entries() {
        let mut store = PostingStore::new(MemTable::new());
        store
            .merge_doclen_changes(&batch(&[
                (1, Some(2)),
                (100, Some(300_000)),
                (101, Some(1)),
            ]))
            .unwrap();

        let tag = store.table().get_exact(&make_key(b"")).unwrap().unwrap();
        let mut src = &tag[..];
        read_first_chunk_header(&mut src).unwrap();
        read_chunk_header(&mut src, 1).unwrap();
        assert_ne!(src[0], 0, "short runs must stay sparse");

        let mut pl = store.postings(b"").unwrap();
        assert!(!pl.jump_to(store.table(), 50).unwrap());
        assert_eq!(pl.docid(), 100);
        assert_eq!(store.get_doclength(100).unwrap(), 300_000);
        assert!(matches!(store.get_doclength(50), Err(Error::DocNotFound(50))));
    }

    #[test]
    fn emptied_first_chunk_promotes_the_next() {
        let params = ChunkParams {
            chunk_size: 40,
            ..ChunkParams::default()
        };
        let mut store = PostingStore::with_params(MemTable::new(), params);
        let mut changes = PostingChanges::new();
        for did in 1..=100u32 {
            changes.add(did, 1);
        }
        store.merge_changes(b"cat", &changes).unwrap();
        let chunk_count = store.table().len();
        assert!(chunk_count >= 2);

        // First docid of the second chunk tells us what the first chunk holds.
        let bare = make_key(b"cat");
        let (second_key, _) = store.table().seek_next(&bare).unwrap().unwrap();
        let boundary = first_did_from_suffix(&second_key[bare.len()..]).unwrap();

        let mut removal = PostingChanges::new();
        for did in 1..boundary {
            removal.remove(did, 1);
        }
        store.merge_changes(b"cat", &removal).unwrap();

        // The bare key survives and now holds the old second chunk; the
        // second chunk's own key is gone.
        let tag = store.table().get_exact(&bare).unwrap().unwrap();
        let mut src = &tag[..];
        let (_, _, first_did) = read_first_chunk_header(&mut src).unwrap();
        assert_eq!(first_did, boundary);
        assert!(store.table().get_exact(&second_key).unwrap().is_none());

        let expect: Vec<(DocId, TermCount)> = (boundary..=100).map(|d| (d, 1)).collect();
        assert_eq!(collect(&store, b"cat"), expect);
        check_invariants(&store, b"cat");
    }

    #[test]
    fn merge_is_idempotent_with_zero_deltas() {
        let mut store = PostingStore::new(MemTable::new());
        let mut changes = PostingChanges::new();
        changes.add(1, 2);
        changes.add(4, 1);
        changes.add(9, 3);
        store.merge_changes(b"cat", &changes).unwrap();
        let before: Vec<_> = store.table().iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();

        let again = PostingChanges::from_parts(
            0,
            0,
            batch(&[(1, Some(2)), (4, Some(1)), (9, Some(3))]),
        );
        store.merge_changes(b"cat", &again).unwrap();
        let after: Vec<_> = store.table().iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn deleting_from_missing_list_is_corrupt() {
        let mut store = PostingStore::new(MemTable::new());
        let changes = PostingChanges::from_parts(-1, -2, batch(&[(3, None)]));
        assert!(matches!(
            store.merge_changes(b"ghost", &changes),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn doclen_merges_go_through_their_own_entry_point() {
        let mut store = PostingStore::new(MemTable::new());
        let changes = PostingChanges::from_parts(1, 1, batch(&[(1, Some(1))]));
        assert!(matches!(
            store.merge_changes(b"", &changes),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn appending_beyond_the_last_chunk_copies_wholesale() {
        let mut store = PostingStore::new(MemTable::new());
        let mut changes = PostingChanges::new();
        for did in 1..=50u32 {
            changes.add(did, 2);
        }
        store.merge_changes(b"cat", &changes).unwrap();

        let mut tail = PostingChanges::new();
        for did in 100..=120u32 {
            tail.add(did, 1);
        }
        store.merge_changes(b"cat", &tail).unwrap();

        let mut expect: Vec<(DocId, TermCount)> = (1..=50).map(|d| (d, 2)).collect();
        expect.extend((100..=120).map(|d| (d, 1)));
        assert_eq!(collect(&store, b"cat"), expect);
        check_invariants(&store, b"cat");
    }

    #[test]
    fn get_chunk_adding_creates_a_fresh_writer() {
        let mut store = PostingStore::new(MemTable::new());
        let (reader, mut writer, max_did) = store.get_chunk(b"new", 1, true).unwrap();
        assert!(reader.is_none());
        assert_eq!(max_did, DocId::MAX);

        let mut table = std::mem::take(&mut store.table);
        writer.append(&mut table, 1, 4).unwrap();
        writer.append(&mut table, 7, 2).unwrap();
        writer.flush(&mut table).unwrap();
        store.table = table;

        assert_eq!(collect(&store, b"new"), vec![(1, 4), (7, 2)]);
    }

    #[test]
    fn doclen_updates_split_and_delete_chunks() {
        let params = ChunkParams {
            doclen_max_chunk_entries: 100,
            ..ChunkParams::default()
        };
        let mut store = PostingStore::with_params(MemTable::new(), params);
        let entries: Vec<(DocId, Option<TermCount>)> =
            (1..=250).map(|d| (d, Some(d % 9 + 1))).collect();
        store.merge_doclen_changes(&batch(&entries)).unwrap();
        assert_eq!(store.table().len(), 3);

        // Wipe out the middle chunk (docids 101..=200).
        let removals: Vec<(DocId, Option<TermCount>)> = (101..=200).map(|d| (d, None)).collect();
        store.merge_doclen_changes(&batch(&removals)).unwrap();
        assert_eq!(store.table().len(), 2);

        assert_eq!(store.get_doclength(100).unwrap(), 100 % 9 + 1);
        assert_eq!(store.get_doclength(250).unwrap(), 250 % 9 + 1);
        assert!(!store.document_exists(150).unwrap());

        let seen = collect(&store, b"");
        assert_eq!(seen.len(), 150);
    }

    #[test]
    fn doclen_cache_is_invalidated_by_updates() {
        let mut store = PostingStore::new(MemTable::new());
        store
            .merge_doclen_changes(&batch(&[(1, Some(4))]))
            .unwrap();
        assert_eq!(store.get_doclength(1).unwrap(), 4);

        store
            .merge_doclen_changes(&batch(&[(1, Some(9)), (2, Some(3))]))
            .unwrap();
        assert_eq!(store.get_doclength(1).unwrap(), 9);
        assert_eq!(store.get_doclength(2).unwrap(), 3);
    }

    #[test]
    fn inverter_flush_applies_everything() {
        use crate::changes::Inverter;

        let mut store = PostingStore::new(MemTable::new());
        let mut inv = Inverter::new();
        inv.add_posting(b"cat", 1, 2);
        inv.add_posting(b"cat", 3, 1);
        inv.add_posting(b"dog", 1, 1);
        inv.set_doclength(1, 3);
        inv.set_doclength(3, 1);
        inv.flush(&mut store).unwrap();
        assert!(inv.is_empty());

        assert_eq!(store.get_freqs(b"cat").unwrap(), (2, 3));
        assert_eq!(store.get_freqs(b"dog").unwrap(), (1, 1));
        assert_eq!(store.get_doclength(1).unwrap(), 3);
        assert_eq!(collect(&store, b"cat"), vec![(1, 2), (3, 1)]);
    }

    #[test]
    fn randomized_edits_match_a_model() {
        let mut rng = StdRng::seed_from_u64(0x9e3779b9);
        let params = ChunkParams {
            chunk_size: 64,
            ..ChunkParams::default()
        };
        let mut store = PostingStore::with_params(MemTable::new(), params);
        let mut model: BTreeMap<DocId, TermCount> = BTreeMap::new();

        for _round in 0..30 {
            let mut edits: BTreeMap<DocId, Option<TermCount>> = BTreeMap::new();
            for _ in 0..rng.gen_range(1..40) {
                let did = rng.gen_range(1..400u32);
                if edits.contains_key(&did) {
                    continue;
                }
                if model.contains_key(&did) {
                    let delete = rng.gen_bool(0.5);
                    edits.insert(did, if delete { None } else { Some(rng.gen_range(1..10)) });
                } else if rng.gen_bool(0.8) {
                    edits.insert(did, Some(rng.gen_range(1..10)));
                }
            }
            if edits.is_empty() {
                continue;
            }

            let mut changes = PostingChanges::new();
            for (&did, &edit) in &edits {
                match (model.get(&did).copied(), edit) {
                    (Some(old), None) => {
                        changes.remove(did, old);
                        model.remove(&did);
                    }
                    (Some(old), Some(new)) => {
                        changes.update(did, old, new);
                        model.insert(did, new);
                    }
                    (None, Some(new)) => {
                        changes.add(did, new);
                        model.insert(did, new);
                    }
                    (None, None) => unreachable!(),
                }
            }
            store.merge_changes(b"term", &changes).unwrap();

            let expect: Vec<(DocId, TermCount)> = model.iter().map(|(&d, &w)| (d, w)).collect();
            assert_eq!(collect(&store, b"term"), expect);
            check_invariants(&store, b"term");
            if model.is_empty() {
                assert!(store.table().is_empty());
            }
        }
    }

    #[test]
    fn randomized_doclen_edits_match_a_model() {
        let mut rng = StdRng::seed_from_u64(42);
        let params = ChunkParams {
            doclen_max_chunk_entries: 50,
            ..ChunkParams::default()
        };
        let mut store = PostingStore::with_params(MemTable::new(), params);
        let mut model: BTreeMap<DocId, TermCount> = BTreeMap::new();

        for _round in 0..20 {
            let mut edits: BTreeMap<DocId, Option<TermCount>> = BTreeMap::new();
            for _ in 0..rng.gen_range(1..60) {
                let did = rng.gen_range(1..300u32);
                if model.contains_key(&did) && rng.gen_bool(0.3) {
                    edits.insert(did, None);
                } else {
                    edits.insert(did, Some(rng.gen_range(1..100_000)));
                }
            }
            for (&did, &edit) in &edits {
                match edit {
                    Some(len) => {
                        model.insert(did, len);
                    }
                    None => {
                        model.remove(&did);
                    }
                }
            }
            store.merge_doclen_changes(&edits).unwrap();

            let expect: Vec<(DocId, TermCount)> = model.iter().map(|(&d, &l)| (d, l)).collect();
            assert_eq!(collect(&store, b""), expect);
            for (&did, &len) in model.iter().take(20) {
                assert_eq!(store.get_doclength(did).unwrap(), len);
            }
        }
    }
}
