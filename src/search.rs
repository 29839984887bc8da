//! Exact top-k cosine similarity search over a [`VectorStore`].
//!
//! Every stored vector is scored against the query (O(N·D) per query, no
//! index). Results come back in descending score order; rows with exactly
//! equal scores keep their insertion order.

use serde::Serialize;

use crate::db::{EMBEDDING_DIM, VectorStore};
use crate::error::{Error, Result};
use crate::vector::{cosine_with_norm, is_rankable, norm};

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub text: String,
    pub score: f32,
}

/// Returns the `top_k` stored texts most similar to `query`.
///
/// An empty store or `top_k == 0` gives an empty result for any query. If the
/// store holds fewer than `top_k` rows, all of them are returned.
///
/// # Errors
///
/// * `DimensionMismatch` - `query` is not `EMBEDDING_DIM` long
/// * `ZeroVector` - `query` has zero magnitude or non-finite components
pub fn find_similar(query: &[f32], store: &VectorStore, top_k: usize) -> Result<Vec<Match>> {
    if store.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }

    if query.len() != EMBEDDING_DIM {
        return Err(Error::DimensionMismatch { expected: EMBEDDING_DIM, actual: query.len() });
    }
    if !is_rankable(query) {
        return Err(Error::ZeroVector);
    }

    let query_norm = norm(query);
    let keep = top_k.min(store.len());

    // (row, score), sorted by score descending, never longer than `keep`
    let mut best: Vec<(usize, f32)> = Vec::with_capacity(keep + 1);
    for (row, record) in store.records().enumerate() {
        // Same scoring as cosine_similarity; stored rows are rankable, so never NaN
        let sim = cosine_with_norm(record.vector, query, query_norm)?;

        if best.len() == keep && best.last().is_some_and(|&(_, worst)| sim <= worst) {
            continue;
        }
        let insert_index = best.partition_point(|&(_, score)| score >= sim);
        best.insert(insert_index, (row, sim));
        best.truncate(keep);
    }

    Ok(best
        .into_iter()
        .filter_map(|(row, score)| store.row(row).map(|record| Match { text: record.text.to_string(), score }))
        .collect())
}

/// Like [`find_similar`], keeping only the texts.
pub fn find_similar_texts(query: &[f32], store: &VectorStore, top_k: usize) -> Result<Vec<String>> {
    Ok(find_similar(query, store, top_k)?
        .into_iter()
        .map(|m| m.text)
        .collect())
}
