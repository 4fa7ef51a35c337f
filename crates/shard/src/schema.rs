//! Versioned mirror of the database layout
//!
//! A `Schema` is an immutable snapshot: `refresh` builds a new one from the
//! live database with the next revision, it never edits the current one. The
//! server swaps snapshots wholesale during reload.

use std::collections::BTreeMap;
use strata_docstore::{DocDb, DocResult};
use strata_wire::SchemaInfo;

/// Collection/index layout at one revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    revision: u32,
    collections: BTreeMap<String, Vec<String>>,
}

impl Schema {
    /// Empty schema at revision 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the next revision from the database's current metadata
    pub fn refresh(&self, db: &DocDb) -> DocResult<Schema> {
        let mut collections = BTreeMap::new();
        for name in db.collections()? {
            let paths = db.index_paths(&name)?;
            collections.insert(name, paths);
        }
        Ok(Schema {
            revision: self.revision.wrapping_add(1),
            collections,
        })
    }

    /// Revision number, bumped on every refresh
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Whether a collection exists at this revision
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Indexed paths of a collection, if it exists
    pub fn index_paths(&self, collection: &str) -> Option<&[String]> {
        self.collections.get(collection).map(Vec::as_slice)
    }

    /// Collection names in sorted order
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Wire representation
    pub fn to_info(&self) -> SchemaInfo {
        SchemaInfo {
            revision: self.revision,
            collections: self.collections.clone(),
        }
    }
}
