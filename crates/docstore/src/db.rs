//! Database handle: open/close and collection-level operations
//!
//! A `DocDb` owns one directory. Every subdirectory is a collection.
//! Schema-changing operations (create/drop/rename collection, create/drop
//! index) write through to disk immediately; document writes are buffered in
//! memory and persisted by `flush()` or `close()`.

use crate::collection::Collection;
use crate::error::{DocError, DocResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Handle to an open document database
pub struct DocDb {
    path: PathBuf,
    collections: RwLock<BTreeMap<String, Collection>>,
    closed: AtomicBool,
}

impl DocDb {
    /// Open (creating if necessary) the database directory at `path`
    ///
    /// Fails if the directory cannot be created or any collection's files
    /// are unreadable.
    pub fn open(path: impl AsRef<Path>) -> DocResult<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let mut collections = BTreeMap::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(target: "strata::docstore", name = ?raw, "Skipping non UTF-8 collection directory");
                    continue;
                }
            };
            let collection = Collection::open(entry.path(), &name)?;
            collections.insert(name, collection);
        }

        debug!(target: "strata::docstore", path = %path.display(), collections = collections.len(), "Database opened");

        Ok(Self {
            path,
            collections: RwLock::new(collections),
            closed: AtomicBool::new(false),
        })
    }

    /// Directory backing this database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Persist buffered writes and close the handle
    ///
    /// The handle is marked closed even if persisting fails. A second call
    /// returns `DocError::AlreadyClosed`.
    pub fn close(&self) -> DocResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DocError::AlreadyClosed);
        }
        let mut collections = self.collections.write();
        for collection in collections.values_mut() {
            collection.flush()?;
        }
        debug!(target: "strata::docstore", path = %self.path.display(), "Database closed");
        Ok(())
    }

    /// Persist buffered document writes of every collection
    pub fn flush(&self) -> DocResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        for collection in collections.values_mut() {
            collection.flush()?;
        }
        Ok(())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Collection names in sorted order
    pub fn collections(&self) -> DocResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.collections.read().keys().cloned().collect())
    }

    /// Dotted index paths of one collection
    pub fn index_paths(&self, collection: &str) -> DocResult<Vec<String>> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let found = collections
            .get(collection)
            .ok_or_else(|| DocError::CollectionNotFound(collection.to_string()))?;
        Ok(found.index_paths())
    }

    // =========================================================================
    // Schema changes
    // =========================================================================

    /// Create an empty collection
    pub fn create_collection(&self, name: &str) -> DocResult<()> {
        self.ensure_open()?;
        validate_name(name)?;
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(DocError::CollectionExists(name.to_string()));
        }
        let collection = Collection::create(self.path.join(name), name)?;
        collections.insert(name.to_string(), collection);
        Ok(())
    }

    /// Remove a collection and all of its files
    pub fn drop_collection(&self, name: &str) -> DocResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let collection = collections
            .remove(name)
            .ok_or_else(|| DocError::CollectionNotFound(name.to_string()))?;
        fs::remove_dir_all(collection.dir())?;
        Ok(())
    }

    /// Rename a collection, keeping its documents and indexes
    pub fn rename_collection(&self, from: &str, to: &str) -> DocResult<()> {
        self.ensure_open()?;
        validate_name(to)?;
        let mut collections = self.collections.write();
        if collections.contains_key(to) {
            return Err(DocError::CollectionExists(to.to_string()));
        }
        let mut collection = collections
            .remove(from)
            .ok_or_else(|| DocError::CollectionNotFound(from.to_string()))?;
        collection.flush()?;

        let target = self.path.join(to);
        if let Err(e) = fs::rename(collection.dir(), &target) {
            collections.insert(from.to_string(), collection);
            return Err(e.into());
        }
        let renamed = Collection::open(target, to)?;
        collections.insert(to.to_string(), renamed);
        Ok(())
    }

    /// Add a hash index on a dotted path
    pub fn create_index(&self, collection: &str, path: &str) -> DocResult<()> {
        self.with_collection_mut(collection, |c| c.create_index(path))
    }

    /// Remove the index on a dotted path
    pub fn drop_index(&self, collection: &str, path: &str) -> DocResult<()> {
        self.with_collection_mut(collection, |c| c.drop_index(path))
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Insert a document and return its new id
    ///
    /// Documents must be JSON objects. Ids are random, non-zero, and unique
    /// within the collection.
    pub fn insert(&self, collection: &str, doc: Value) -> DocResult<u64> {
        validate_document(&doc)?;
        self.with_collection_mut(collection, |c| {
            let id = loop {
                let candidate: u64 = rand::random();
                if candidate != 0 && !c.contains(candidate) {
                    break candidate;
                }
            };
            c.insert(id, doc);
            Ok(id)
        })
    }

    /// Read a document by id
    pub fn read(&self, collection: &str, id: u64) -> DocResult<Value> {
        self.with_collection(collection, |c| c.read(id))
    }

    /// Replace a document by id
    pub fn update(&self, collection: &str, id: u64, doc: Value) -> DocResult<()> {
        validate_document(&doc)?;
        self.with_collection_mut(collection, |c| c.update(id, doc))
    }

    /// Delete a document by id
    pub fn delete(&self, collection: &str, id: u64) -> DocResult<()> {
        self.with_collection_mut(collection, |c| c.delete(id))
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> DocResult<u64> {
        self.with_collection(collection, |c| Ok(c.len() as u64))
    }

    /// Ids of documents whose value at `path` equals `value`
    ///
    /// Requires an index on `path`.
    pub fn lookup(&self, collection: &str, path: &str, value: &Value) -> DocResult<Vec<u64>> {
        self.with_collection(collection, |c| c.lookup(path, value))
    }

    fn ensure_open(&self) -> DocResult<()> {
        if self.is_closed() {
            return Err(DocError::Closed);
        }
        Ok(())
    }

    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Collection) -> DocResult<T>,
    ) -> DocResult<T> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let collection = collections
            .get(name)
            .ok_or_else(|| DocError::CollectionNotFound(name.to_string()))?;
        f(collection)
    }

    fn with_collection_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Collection) -> DocResult<T>,
    ) -> DocResult<T> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| DocError::CollectionNotFound(name.to_string()))?;
        debug_assert_eq!(collection.name(), name);
        f(collection)
    }
}

impl Drop for DocDb {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        for collection in self.collections.get_mut().values_mut() {
            if let Err(e) = collection.flush() {
                warn!(target: "strata::docstore", collection = collection.name(), error = %e, "Failed to flush collection on drop");
            }
        }
    }
}

fn validate_name(name: &str) -> DocResult<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        return Err(DocError::InvalidInput(format!(
            "invalid collection name '{}'",
            name
        )));
    }
    Ok(())
}

fn validate_document(doc: &Value) -> DocResult<()> {
    if !doc.is_object() {
        return Err(DocError::InvalidInput(
            "documents must be JSON objects".to_string(),
        ));
    }
    Ok(())
}
