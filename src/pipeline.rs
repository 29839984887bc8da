//! Text in, durable record out: the glue between the embedder and the store.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::db::{VectorStore, content_id};
use crate::embedder::RetryingEmbedder;
use crate::error::{Error, Result};
use crate::search::{Match, find_similar};

/// Outcome of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped_blank: usize,
}

/// Embeds texts and stores or ranks them.
///
/// The store sits behind a read-write lock. Inserts hold the write lock for
/// the whole check, append and save sequence, which runs on tokio's blocking
/// pool; searches hold the read lock while ranking. Provider calls happen
/// before any lock is taken.
pub struct IngestPipeline {
    embedder: RetryingEmbedder,
    store: Arc<RwLock<VectorStore>>,
}

impl IngestPipeline {
    /// `store` should already be [set up](VectorStore::setup).
    pub fn new(embedder: RetryingEmbedder, store: VectorStore) -> Self {
        Self {
            embedder,
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Embeds `text` and inserts it, returning the new record's id.
    ///
    /// Texts already in the store are rejected as `DuplicateEntry` without
    /// calling the provider. Errors from the embedder and the store are
    /// passed through unchanged.
    pub async fn process_text(&self, text: &str) -> Result<String> {
        if self.store.read().await.contains_text(text) {
            return Err(Error::DuplicateEntry { id: content_id(text) });
        }

        let vector = self.embedder.embed(text).await?;

        // The snapshot write blocks, so it leaves the async worker along with the write guard
        let mut store = self.store.clone().write_owned().await;
        let path = store.path().to_path_buf();
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || store.insert(&text, vector))
            .await
            .map_err(|e| Error::io(path, std::io::Error::other(format!("snapshot task failed: {e}"))))?
    }

    /// Embeds `text` and returns the `top_k` most similar stored texts.
    pub async fn search(&self, text: &str, top_k: usize) -> Result<Vec<Match>> {
        let query = self.embedder.embed(text).await?;
        let store = self.store.read().await;
        let matches = find_similar(&query, &store, top_k)?;
        debug!(top_k, results = matches.len(), "similarity search done");
        Ok(matches)
    }

    /// Feeds texts through [`process_text`](IngestPipeline::process_text) one
    /// at a time.
    ///
    /// Blank texts are skipped and texts already stored are counted as
    /// duplicates, so loading the same corpus twice is harmless. Any other
    /// error stops the batch; rows inserted before it stay stored.
    pub async fn load_batch<I, S>(&self, texts: I) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = BatchSummary::default();

        for text in texts {
            let text = text.as_ref();
            if text.trim().is_empty() {
                summary.skipped_blank += 1;
                continue;
            }

            match self.process_text(text).await {
                Ok(_) => summary.inserted += 1,
                Err(Error::DuplicateEntry { id }) => {
                    debug!(%id, "skipping duplicate text");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(error = %e, inserted = summary.inserted, "bulk load aborted");
                    return Err(e);
                }
            }
        }

        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped_blank = summary.skipped_blank,
            "bulk load finished"
        );
        Ok(summary)
    }

    /// Bulk loads a newline-separated text file.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<BatchSummary> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io { path: path.to_path_buf(), source: e })?;

        let lines: Vec<&str> = content.lines().collect();
        info!(path = %path.display(), lines = lines.len(), "loading texts");
        self.load_batch(lines).await
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn contains_text(&self, text: &str) -> bool {
        self.store.read().await.contains_text(text)
    }
}
