//! Chunked posting-list storage over an ordered key-value table.
//!
//! Postings for each term are stored as a sequence of delta-compressed
//! chunks, each small enough to live comfortably in one table entry:
//! - The first chunk is keyed by the term alone and additionally carries the
//!   term frequency and collection frequency in its header.
//! - Continuation chunks are keyed by `(term, first_docid_in_chunk)` so that
//!   a table seek lands directly on the chunk covering a target docid.
//!
//! Document lengths are a special posting list under the empty term, with a
//! second body encoding (fixed-width runs) tuned for densely assigned docids
//! and a random-access `jump_to`.
//!
//! Updates are applied as per-term batches of `(docid, wdf)` changes which
//! rewrite only the affected chunks, splitting or renaming them as needed.

pub mod changes;
pub mod chunk;
pub mod codec;
pub mod cursor;
pub mod doclen;
pub mod error;
pub mod keys;
pub mod params;
pub mod store;
pub mod table;

pub use changes::{Inverter, PostingChanges};
pub use cursor::PostingListCursor;
pub use error::{Error, Result};
pub use params::ChunkParams;
pub use store::PostingStore;
pub use table::{MemTable, Table};

/// 1-based document identifier; 0 is reserved as a sentinel.
pub type DocId = u32;
/// Within-document frequency, or a document length in the doclen list.
pub type TermCount = u32;
/// Number of documents (term frequency).
pub type DocCount = u32;
