//! Dense-first merge of the two index hit lists.
//!
//! ```text
//!   dense:  d1 d2 x  d3          merged: d1 d2 x d3 s1 s2
//!   sparse: s1 x  s2                     (sparse "x" dropped)
//! ```
//!
//! The merged list is the input to reranking; a hit's position in it is
//! the tie-break for equal rerank scores.

use std::collections::HashSet;

use crate::models::SearchHit;

/// Concatenate dense then sparse hits, keeping the first entry per chunk id.
///
/// A chunk found by both indexes is therefore kept once, from the dense
/// side. Order within each list is preserved.
pub fn merge_hits(dense: &[SearchHit], sparse: &[SearchHit]) -> Vec<SearchHit> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(dense.len() + sparse.len());
    dense
        .iter()
        .chain(sparse)
        .filter(|h| seen.insert(h.chunk_id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexKind, LineRange, RecordFields};

    fn hit(id: &str, kind: IndexKind) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            score: 1.0,
            source_index: kind,
            fields: RecordFields {
                text: String::new(),
                raw_text: String::new(),
                sequence_index: 0,
                line_range: LineRange { from: 1, to: 1 },
                heading: None,
                file_name: "f.md".to_string(),
                owner_id: "o".to_string(),
                email: "o@x".to_string(),
                document_summary: None,
            },
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_dense_first_and_deduped() {
        let dense = vec![hit("d1", IndexKind::Dense), hit("x", IndexKind::Dense)];
        let sparse = vec![hit("x", IndexKind::Sparse), hit("s1", IndexKind::Sparse)];
        let merged = merge_hits(&dense, &sparse);
        assert_eq!(ids(&merged), vec!["d1", "x", "s1"]);
        let x = merged.iter().find(|h| h.chunk_id == "x").unwrap();
        assert_eq!(x.source_index, IndexKind::Dense);
    }

    #[test]
    fn test_union_without_duplicates() {
        let dense: Vec<SearchHit> = ["a", "b", "c"].iter().map(|i| hit(i, IndexKind::Dense)).collect();
        let sparse: Vec<SearchHit> = ["c", "d", "a", "e"].iter().map(|i| hit(i, IndexKind::Sparse)).collect();
        let merged = merge_hits(&dense, &sparse);

        let mut got: Vec<&str> = ids(&merged);
        got.sort();
        assert_eq!(got, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_duplicates_within_one_list_collapse() {
        let sparse = vec![hit("a", IndexKind::Sparse), hit("a", IndexKind::Sparse)];
        assert_eq!(ids(&merge_hits(&[], &sparse)), vec!["a"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_hits(&[], &[]).is_empty());
    }
}
