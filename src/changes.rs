//! In-memory accumulation of posting changes between commits.
//!
//! Indexing does not touch the table per document; it batches changes per
//! term and applies each batch in one pass over the affected chunks.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::store::PostingStore;
use crate::table::Table;
use crate::{DocId, TermCount};

/// Pending changes to one term's posting list.
///
/// `entries` maps docid to the new wdf, or to `None` for a deletion. The
/// termfreq/collfreq deltas are tracked alongside so the first-chunk header
/// can be updated without re-reading the whole list.
#[derive(Debug, Default, Clone)]
pub struct PostingChanges {
    tf_delta: i64,
    cf_delta: i64,
    entries: BTreeMap<DocId, Option<TermCount>>,
}

impl PostingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble from raw parts; the caller keeps the deltas consistent with
    /// the entry map.
    pub fn from_parts(
        tf_delta: i64,
        cf_delta: i64,
        entries: BTreeMap<DocId, Option<TermCount>>,
    ) -> Self {
        PostingChanges {
            tf_delta,
            cf_delta,
            entries,
        }
    }

    /// Record a posting for a document the term was not in before.
    pub fn add(&mut self, did: DocId, wdf: TermCount) {
        self.tf_delta += 1;
        self.cf_delta += i64::from(wdf);
        self.entries.insert(did, Some(wdf));
    }

    /// Record removal of a posting; `wdf` is the stored value being removed.
    pub fn remove(&mut self, did: DocId, wdf: TermCount) {
        self.tf_delta -= 1;
        self.cf_delta -= i64::from(wdf);
        self.entries.insert(did, None);
    }

    /// Record a wdf change for a document the term already indexes.
    pub fn update(&mut self, did: DocId, old_wdf: TermCount, new_wdf: TermCount) {
        self.cf_delta += i64::from(new_wdf) - i64::from(old_wdf);
        self.entries.insert(did, Some(new_wdf));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.tf_delta == 0 && self.cf_delta == 0
    }

    pub fn tf_delta(&self) -> i64 {
        self.tf_delta
    }

    pub fn cf_delta(&self) -> i64 {
        self.cf_delta
    }

    pub fn entries(&self) -> &BTreeMap<DocId, Option<TermCount>> {
        &self.entries
    }
}

/// Batches posting and doclen changes across terms until flushed.
#[derive(Debug, Default)]
pub struct Inverter {
    postings: FxHashMap<Box<[u8]>, PostingChanges>,
    doclens: BTreeMap<DocId, Option<TermCount>>,
}

impl Inverter {
    pub fn new() -> Self {
        Self::default()
    }

    fn term_changes(&mut self, term: &[u8]) -> &mut PostingChanges {
        self.postings.entry(term.into()).or_default()
    }

    pub fn add_posting(&mut self, term: &[u8], did: DocId, wdf: TermCount) {
        debug_assert!(!term.is_empty());
        self.term_changes(term).add(did, wdf);
    }

    pub fn remove_posting(&mut self, term: &[u8], did: DocId, wdf: TermCount) {
        debug_assert!(!term.is_empty());
        self.term_changes(term).remove(did, wdf);
    }

    pub fn update_posting(&mut self, term: &[u8], did: DocId, old_wdf: TermCount, new_wdf: TermCount) {
        debug_assert!(!term.is_empty());
        self.term_changes(term).update(did, old_wdf, new_wdf);
    }

    pub fn set_doclength(&mut self, did: DocId, doclen: TermCount) {
        self.doclens.insert(did, Some(doclen));
    }

    pub fn delete_doclength(&mut self, did: DocId) {
        self.doclens.insert(did, None);
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty() && self.doclens.is_empty()
    }

    /// Apply and clear every pending batch. Terms are flushed in sorted
    /// order so table writes land in key order.
    pub fn flush<T: Table>(&mut self, store: &mut PostingStore<T>) -> Result<()> {
        let mut batches: Vec<(Box<[u8]>, PostingChanges)> = self.postings.drain().collect();
        batches.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for (term, changes) in batches {
            store.merge_changes(&term, &changes)?;
        }
        let doclens = std::mem::take(&mut self.doclens);
        if !doclens.is_empty() {
            store.merge_doclen_changes(&doclens)?;
        }
        Ok(())
    }
}
