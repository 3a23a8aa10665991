//! Key layout for posting-list chunks.
//!
//! The first chunk of a term's posting list is keyed by the term alone; every
//! continuation chunk appends the sort-preserving encoding of its first
//! docid. Because the term encoding is self-terminating, the bare key is a
//! strict prefix of (and sorts before) every continuation key, and all keys
//! of one term are contiguous in the table.
//!
//! The doclen list lives under the empty term, whose key is the two bytes
//! `\x00\xe0`.

use crate::DocId;
use crate::codec::{
    pack_string_preserving_sort, pack_uint_preserving_sort, unpack_uint_preserving_sort,
};
use crate::error::{Error, Result};

/// Key of the first chunk for `term`; also the common prefix of every chunk
/// key for `term`.
pub fn make_key(term: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(term.len() + 2);
    pack_string_preserving_sort(&mut key, term);
    key
}

/// Key of the continuation chunk whose first docid is `did`.
pub fn make_chunk_key(term: &[u8], did: DocId) -> Vec<u8> {
    let mut key = make_key(term);
    pack_uint_preserving_sort(&mut key, did);
    key
}

/// Decode the first docid embedded in a continuation-chunk key suffix (the
/// bytes after the term prefix). The suffix must be exactly one docid.
pub fn first_did_from_suffix(suffix: &[u8]) -> Result<DocId> {
    let mut src = suffix;
    let did = unpack_uint_preserving_sort(&mut src)?;
    if !src.is_empty() {
        return Err(Error::Corrupt("trailing bytes after docid in key".into()));
    }
    Ok(did)
}
