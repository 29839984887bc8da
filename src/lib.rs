//! # embedstore - text embeddings with exact similarity search
//!
//! embedstore keeps short texts together with their 768-dimensional
//! embeddings in an append-only table that is written to a snapshot file on
//! every insert. Records are keyed by the SHA-256 of their text, so the same
//! text can only be stored once. Queries are ranked by cosine similarity
//! against every stored row.
//!
//! Embeddings come from an [`EmbeddingProvider`], usually the
//! [`HttpEmbeddingProvider`]. [`RetryingEmbedder`] absorbs its transient
//! failures and [`IngestPipeline`] ties the embedder to the store.
//!
//! ## Example
//!
//! ```
//! use embedstore::{EMBEDDING_DIM, VectorStore, find_similar_texts};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut store = VectorStore::open(dir.path().join("embeddings.json")).unwrap();
//!
//! let axis = |i: usize| {
//!     let mut v = vec![0.0; EMBEDDING_DIM];
//!     v[i] = 1.0;
//!     v
//! };
//! store.insert("first", axis(0)).unwrap();
//! store.insert("second", axis(1)).unwrap();
//!
//! // Same text again is rejected
//! assert!(store.insert("first", axis(2)).is_err());
//!
//! let results = find_similar_texts(&axis(1), &store, 1).unwrap();
//! assert_eq!(results, vec!["second"]);
//! ```

pub mod config;
mod db;
pub mod embedder;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod search;
pub mod server;
pub mod vector;

pub use db::{EMBEDDING_DIM, Record, SnapshotFormat, VectorStore, content_id};
pub use embedder::{EmbeddingProvider, RetryPolicy, RetryingEmbedder};
pub use error::{Error, ProviderError, Result};
pub use pipeline::{BatchSummary, IngestPipeline};
pub use provider::HttpEmbeddingProvider;
pub use search::{Match, find_similar, find_similar_texts};
