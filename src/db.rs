//! The store module
//! Append-only text/embedding table persisted to a single snapshot file

use crate::error::{Error, Result};
use crate::vector::is_rankable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Every stored embedding has exactly this many components.
pub const EMBEDDING_DIM: usize = 768;

/// Deterministic record id: lowercase hex SHA-256 of the text.
///
/// Identical text always maps to the identical id, which is what makes
/// re-inserting a text detectable as a duplicate.
///
/// ```
/// let id = embedstore::content_id("hello");
/// assert_eq!(id.len(), 64);
/// assert_eq!(id, embedstore::content_id("hello"));
/// ```
pub fn content_id(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// On-disk encoding of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// Column-oriented JSON: `{"ID": [..], "Text": [..], "Embeddings": [..]}`.
    Json,
    /// The same three columns encoded with bincode.
    Bincode,
}

impl SnapshotFormat {
    /// `.bin` snapshots use bincode, anything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bin") => SnapshotFormat::Bincode,
            _ => SnapshotFormat::Json,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Snapshot {
    #[serde(rename = "ID")]
    ids: Vec<String>,
    #[serde(rename = "Text")]
    texts: Vec<String>,
    #[serde(rename = "Embeddings")]
    embeddings: Vec<Vec<f32>>,
}

// Borrowing twin of `Snapshot` so saving never clones the table.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(rename = "ID")]
    ids: &'a [String],
    #[serde(rename = "Text")]
    texts: &'a [String],
    #[serde(rename = "Embeddings")]
    embeddings: Vec<&'a [f32]>,
}

/// A borrowed view of one stored row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub vector: &'a [f32],
}

/// Append-only table of (id, text, embedding) rows backed by one snapshot file.
///
/// Rows are kept column-wise: `ids[i]`, `texts[i]` and the `i`-th
/// `EMBEDDING_DIM` slice of `vectors` belong together.
#[derive(Debug)]
pub struct VectorStore {
    path: PathBuf,
    format: SnapshotFormat,
    ids: Vec<String>,
    texts: Vec<String>,
    vectors: Vec<f32>,
    // id -> row
    index: HashMap<String, usize>,
}

impl VectorStore {
    /// Creates an empty store bound to `path`. Nothing is read or written
    /// until [`setup`](VectorStore::setup).
    pub fn new(path: impl Into<PathBuf>) -> VectorStore {
        let path = path.into();
        VectorStore {
            format: SnapshotFormat::from_path(&path),
            path,
            ids: Vec::new(),
            texts: Vec::new(),
            vectors: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Creates a store for `path` and runs [`setup`](VectorStore::setup) on it.
    pub fn open(path: impl Into<PathBuf>) -> Result<VectorStore> {
        let mut store = VectorStore::new(path);
        store.setup()?;
        Ok(store)
    }

    /// Loads the snapshot if one exists, otherwise starts empty, then saves
    /// straight away so the file on disk is always in the current format.
    ///
    /// # Errors
    ///
    /// * `StorageCorrupt` - the existing snapshot does not have the expected shape
    /// * `Io` - the snapshot directory or file cannot be created or read
    pub fn setup(&mut self) -> Result<()> {
        info!(path = %self.path.display(), "initializing vector store");

        if let Some(parent) = parent_dir(&self.path) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        if self.path.exists() {
            let loaded = VectorStore::load(&self.path)?;
            *self = loaded;
        } else {
            self.ids.clear();
            self.texts.clear();
            self.vectors.clear();
            self.index.clear();
        }

        self.save()?;
        info!(records = self.len(), "vector store is ready");
        Ok(())
    }

    /// Appends a row and persists the whole table before returning.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - the content id of the new row
    ///
    /// # Errors
    ///
    /// * `DuplicateEntry` - the same text is already stored
    /// * `DimensionMismatch` - `vector` does not have `EMBEDDING_DIM` components
    /// * `ZeroVector` - `vector` has zero magnitude or non-finite components
    /// * `Io` - the snapshot could not be written; the row is not kept
    pub fn insert(&mut self, text: &str, vector: Vec<f32>) -> Result<String> {
        let id = content_id(text);
        debug!(%id, "inserting entry");

        if self.index.contains_key(&id) {
            debug!(%id, "rejecting duplicate entry");
            return Err(Error::DuplicateEntry { id });
        }

        if vector.len() != EMBEDDING_DIM {
            debug!(%id, dimensions = vector.len(), "rejecting embedding with wrong dimensions");
            return Err(Error::DimensionMismatch { expected: EMBEDDING_DIM, actual: vector.len() });
        }

        if !is_rankable(&vector) {
            return Err(Error::ZeroVector);
        }

        self.index.insert(id.clone(), self.ids.len());
        self.ids.push(id.clone());
        self.texts.push(text.to_string());
        self.vectors.extend(vector);

        if let Err(e) = self.save() {
            self.rollback_last();
            return Err(e);
        }

        debug!(%id, "entry inserted");
        Ok(id)
    }

    /// Writes the full table to a temporary file next to the snapshot and
    /// renames it over the snapshot, so readers see either the old or the
    /// new file.
    pub fn save(&self) -> Result<()> {
        debug!(path = %self.path.display(), records = self.len(), "saving snapshot");

        let dir = parent_dir(&self.path).unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.encode(&mut writer)?;
            writer.flush().map_err(|e| Error::io(&self.path, e))?;
        }
        tmp.as_file().sync_all().map_err(|e| Error::io(&self.path, e))?;
        tmp.persist(&self.path).map_err(|e| Error::io(&self.path, e.error))?;

        Ok(())
    }

    /// Reads a snapshot previously written by [`save`](VectorStore::save).
    ///
    /// The snapshot must have exactly the `ID`, `Text` and `Embeddings`
    /// columns, all the same length, every embedding `EMBEDDING_DIM` long and
    /// rankable, and every id equal to the hash of its text. Anything else is
    /// `StorageCorrupt`; nothing is coerced.
    pub fn load(path: impl AsRef<Path>) -> Result<VectorStore> {
        let path = path.as_ref();
        let format = SnapshotFormat::from_path(path);
        debug!(path = %path.display(), ?format, "reading snapshot");

        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = BufReader::new(file);

        let snapshot: Snapshot = match format {
            SnapshotFormat::Json => serde_json::from_reader(reader)
                .map_err(|e| Error::corrupt(path, e.to_string()))?,
            SnapshotFormat::Bincode => bincode::deserialize_from(reader)
                .map_err(|e| Error::corrupt(path, e.to_string()))?,
        };

        let mut store = VectorStore::new(path);
        store.restore(snapshot)?;
        Ok(store)
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn contains_text(&self, text: &str) -> bool {
        self.contains_id(&content_id(text))
    }

    pub fn get(&self, id: &str) -> Option<Record<'_>> {
        self.index.get(id).map(|&row| self.record(row))
    }

    /// The row at `index` in insertion order.
    pub fn row(&self, index: usize) -> Option<Record<'_>> {
        (index < self.len()).then(|| self.record(index))
    }

    /// All rows in insertion order.
    pub fn records(&self) -> impl ExactSizeIterator<Item = Record<'_>> + '_ {
        (0..self.ids.len()).map(|i| self.record(i))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    fn record(&self, index: usize) -> Record<'_> {
        Record {
            id: &self.ids[index],
            text: &self.texts[index],
            vector: self.get_vector(index),
        }
    }

    /// Slices the flat vector array; rows are laid out as
    /// `[v1_d1, v1_d2, ..., v2_d1, v2_d2, ...]`.
    fn get_vector(&self, index: usize) -> &[f32] {
        let start = index * EMBEDDING_DIM;
        &self.vectors[start..start + EMBEDDING_DIM]
    }

    fn encode<W: Write>(&self, writer: W) -> Result<()> {
        let snapshot = SnapshotRef {
            ids: &self.ids,
            texts: &self.texts,
            embeddings: (0..self.ids.len()).map(|i| self.get_vector(i)).collect(),
        };

        match self.format {
            SnapshotFormat::Json => serde_json::to_writer(writer, &snapshot)
                .map_err(|e| Error::io(&self.path, e.into())),
            SnapshotFormat::Bincode => bincode::serialize_into(writer, &snapshot)
                .map_err(|e| Error::io(&self.path, std::io::Error::other(e))),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        let Snapshot { ids, texts, embeddings } = snapshot;

        if ids.len() != texts.len() || ids.len() != embeddings.len() {
            return Err(Error::corrupt(
                &self.path,
                format!(
                    "column lengths differ: {} ids, {} texts, {} embeddings",
                    ids.len(),
                    texts.len(),
                    embeddings.len()
                ),
            ));
        }

        self.vectors.reserve(ids.len() * EMBEDDING_DIM);
        for (row, ((id, text), vector)) in ids.into_iter().zip(texts).zip(embeddings).enumerate() {
            if vector.len() != EMBEDDING_DIM {
                return Err(Error::corrupt(
                    &self.path,
                    format!("row {row} has {} dimensions, expected {EMBEDDING_DIM}", vector.len()),
                ));
            }
            if !is_rankable(&vector) {
                return Err(Error::corrupt(&self.path, format!("row {row} has a zero or non-finite embedding")));
            }
            if content_id(&text) != id {
                return Err(Error::corrupt(&self.path, format!("row {row} id does not match its text")));
            }
            if self.index.insert(id.clone(), row).is_some() {
                return Err(Error::corrupt(&self.path, format!("row {row} repeats id {id}")));
            }

            self.ids.push(id);
            self.texts.push(text);
            self.vectors.extend(vector);
        }

        Ok(())
    }

    fn rollback_last(&mut self) {
        if let Some(id) = self.ids.pop() {
            self.index.remove(&id);
            self.texts.pop();
            self.vectors.truncate(self.ids.len() * EMBEDDING_DIM);
        }
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
