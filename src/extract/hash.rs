//! Content identity for extracted tables.
//!
//! The hash is a pure function of the canonicalized cell matrix: stable across
//! repeated extraction of unchanged input, independent of page numbers,
//! header flags, and extraction-run group ids. Canonicalization collapses all
//! interior whitespace so OCR spacing jitter between runs does not shift
//! identity.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Separators between cells and rows in the hash input. Control characters
/// cannot occur in canonicalized cell text, so the encoding is unambiguous.
const CELL_SEP: u8 = 0x1f;
const ROW_SEP: u8 = 0x1e;

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Trim a cell and collapse interior whitespace runs to a single space.
pub fn canonicalize_cell(text: &str) -> String {
    whitespace_run().replace_all(text.trim(), " ").into_owned()
}

/// Compute the content hash of a cell matrix.
///
/// Callers pass an already-canonicalized structure (the extractor
/// canonicalizes before storing `original_structure`, so hashing the stored
/// structure reproduces the same identity).
pub fn table_hash(structure: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    for row in structure {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([CELL_SEP]);
        }
        hasher.update([ROW_SEP]);
    }
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}
