//! A single collection: documents, their indexes, and on-disk files
//!
//! Layout inside the collection directory:
//!
//! ```text
//! <collection>/
//!   docs.msgpack    -- id -> document map (MessagePack)
//!   indexes.json    -- list of dotted index paths (JSON)
//! ```

use crate::error::{DocError, DocResult};
use crate::index::{HashIndex, IndexPath};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Documents file name inside a collection directory
pub const DOCS_FILE: &str = "docs.msgpack";
/// Index definitions file name inside a collection directory
pub const INDEXES_FILE: &str = "indexes.json";

pub(crate) struct Collection {
    name: String,
    dir: PathBuf,
    docs: BTreeMap<u64, Value>,
    indexes: Vec<HashIndex>,
    dirty: bool,
}

impl Collection {
    /// Create a fresh, empty collection directory
    pub(crate) fn create(dir: PathBuf, name: &str) -> DocResult<Self> {
        fs::create_dir(&dir)?;
        let collection = Self {
            name: name.to_string(),
            dir,
            docs: BTreeMap::new(),
            indexes: Vec::new(),
            dirty: false,
        };
        collection.write_docs()?;
        collection.write_indexes()?;
        Ok(collection)
    }

    /// Load an existing collection and rebuild its indexes
    pub(crate) fn open(dir: PathBuf, name: &str) -> DocResult<Self> {
        let docs = match fs::read(dir.join(DOCS_FILE)) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => rmp_serde::from_slice::<BTreeMap<u64, Value>>(&bytes).map_err(|e| {
                DocError::Corruption {
                    collection: name.to_string(),
                    reason: format!("{}: {}", DOCS_FILE, e),
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let paths: Vec<String> = match fs::read_to_string(dir.join(INDEXES_FILE)) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| DocError::Corruption {
                collection: name.to_string(),
                reason: format!("{}: {}", INDEXES_FILE, e),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut indexes = Vec::with_capacity(paths.len());
        for path in paths {
            let mut index = HashIndex::new(IndexPath::parse(&path)?);
            for (id, doc) in &docs {
                index.insert(*id, doc);
            }
            indexes.push(index);
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            docs,
            indexes,
            dirty: false,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn index_paths(&self) -> Vec<String> {
        self.indexes.iter().map(|i| i.path().to_string()).collect()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.docs.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }

    pub(crate) fn insert(&mut self, id: u64, doc: Value) {
        for index in &mut self.indexes {
            index.insert(id, &doc);
        }
        self.docs.insert(id, doc);
        self.dirty = true;
    }

    pub(crate) fn read(&self, id: u64) -> DocResult<Value> {
        self.docs
            .get(&id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    pub(crate) fn update(&mut self, id: u64, doc: Value) -> DocResult<()> {
        let old = self.docs.get(&id).ok_or_else(|| self.not_found(id))?;
        for index in &mut self.indexes {
            index.remove(id, old);
            index.insert(id, &doc);
        }
        self.docs.insert(id, doc);
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: u64) -> DocResult<()> {
        let old = self.docs.remove(&id).ok_or_else(|| self.not_found(id))?;
        for index in &mut self.indexes {
            index.remove(id, &old);
        }
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn lookup(&self, path: &str, value: &Value) -> DocResult<Vec<u64>> {
        let parsed = IndexPath::parse(path)?;
        self.indexes
            .iter()
            .find(|i| i.path() == &parsed)
            .map(|i| i.lookup(value))
            .ok_or_else(|| DocError::IndexNotFound {
                collection: self.name.clone(),
                path: path.to_string(),
            })
    }

    pub(crate) fn create_index(&mut self, path: &str) -> DocResult<()> {
        let parsed = IndexPath::parse(path)?;
        if self.indexes.iter().any(|i| i.path() == &parsed) {
            return Err(DocError::IndexExists {
                collection: self.name.clone(),
                path: path.to_string(),
            });
        }
        let mut index = HashIndex::new(parsed);
        for (id, doc) in &self.docs {
            index.insert(*id, doc);
        }
        self.indexes.push(index);
        self.write_indexes()
    }

    pub(crate) fn drop_index(&mut self, path: &str) -> DocResult<()> {
        let parsed = IndexPath::parse(path)?;
        let before = self.indexes.len();
        self.indexes.retain(|i| i.path() != &parsed);
        if self.indexes.len() == before {
            return Err(DocError::IndexNotFound {
                collection: self.name.clone(),
                path: path.to_string(),
            });
        }
        self.write_indexes()
    }

    /// Write documents to disk if anything changed since the last flush
    pub(crate) fn flush(&mut self) -> DocResult<()> {
        if self.dirty {
            self.write_docs()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn not_found(&self, id: u64) -> DocError {
        DocError::DocumentNotFound {
            collection: self.name.clone(),
            id,
        }
    }

    fn write_docs(&self) -> DocResult<()> {
        let bytes = rmp_serde::to_vec(&self.docs)?;
        write_atomic(&self.dir.join(DOCS_FILE), &bytes)
    }

    fn write_indexes(&self) -> DocResult<()> {
        let text = serde_json::to_string_pretty(&self.index_paths())?;
        write_atomic(&self.dir.join(INDEXES_FILE), text.as_bytes())
    }
}

/// Write via a temp file and rename so readers never see a torn file
fn write_atomic(path: &Path, bytes: &[u8]) -> DocResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
