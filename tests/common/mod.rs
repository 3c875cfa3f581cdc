#![allow(dead_code)]

use lsif_bundle::cache::DataCache;
use lsif_bundle::db::BundleDb;
use lsif_bundle::merge::LoadedBundle;
use lsif_bundle::model::{
    DocumentIdRangeId, Id, Location, Meta, MonikerLocations, Position, Range, RangeId,
};
use lsif_bundle::persistence::Writer;
use lsif_bundle::sharding::chunk_index;
use std::collections::BTreeMap;
use std::path::Path;

/// Builds in-memory bundles with human-readable result set ids.
pub struct BundleBuilder {
    bundle: LoadedBundle,
}

impl BundleBuilder {
    pub fn new(num_result_chunks: usize) -> Self {
        Self {
            bundle: LoadedBundle {
                meta: Meta { num_result_chunks },
                documents: BTreeMap::new(),
                result_chunks: BTreeMap::new(),
                definitions: Vec::new(),
                references: Vec::new(),
            },
        }
    }

    pub fn document(mut self, path: &str) -> Self {
        self.bundle.documents.entry(path.to_string()).or_default();
        self
    }

    /// Adds a single-line range to `path`.
    pub fn range(
        mut self,
        path: &str,
        range_id: RangeId,
        (line, start, end): (u32, u32, u32),
        definition: Option<&str>,
        references: Option<&str>,
    ) -> Self {
        let mut range = span(line, start, end);
        range.definition_result_id = definition.map(Id::from);
        range.reference_result_id = references.map(Id::from);
        self.bundle
            .documents
            .entry(path.to_string())
            .or_default()
            .ranges
            .insert(range_id, range);
        self
    }

    /// Registers a result set whose entries point at `(path, range id)` pairs.
    pub fn result_set(mut self, id: &str, entries: &[(&str, RangeId)]) -> Self {
        let id = Id::from(id);
        let index = chunk_index(&id, self.bundle.meta.num_result_chunks);
        let chunk = self.bundle.result_chunks.entry(index).or_default();
        let mut list = Vec::new();
        for (path, range_id) in entries {
            let existing = chunk
                .document_paths
                .iter()
                .find(|(_, known)| known.as_str() == *path)
                .map(|(document_id, _)| *document_id);
            let document_id = match existing {
                Some(document_id) => document_id,
                None => {
                    let next = chunk.document_paths.keys().next_back().map_or(0, |max| max + 1);
                    chunk.document_paths.insert(next, path.to_string());
                    next
                }
            };
            list.push(DocumentIdRangeId::new(document_id, *range_id));
        }
        chunk.document_id_range_ids.insert(id, list);
        self
    }

    pub fn definition_moniker(mut self, scheme: &str, identifier: &str, locations: Vec<Location>) -> Self {
        self.bundle.definitions.push(MonikerLocations {
            scheme: scheme.to_string(),
            identifier: identifier.to_string(),
            locations,
        });
        self
    }

    pub fn reference_moniker(mut self, scheme: &str, identifier: &str, locations: Vec<Location>) -> Self {
        self.bundle.references.push(MonikerLocations {
            scheme: scheme.to_string(),
            identifier: identifier.to_string(),
            locations,
        });
        self
    }

    pub fn build(self) -> LoadedBundle {
        self.bundle
    }
}

pub fn span(line: u32, start: u32, end: u32) -> Range {
    Range::new(Position::new(line, start), Position::new(line, end))
}

pub fn location(path: &str, line: u32, start: u32, end: u32) -> Location {
    Location::from_range(path, &span(line, start, end))
}

/// Persists `bundle` as a new bundle file at `path`.
pub fn write_bundle(path: &Path, bundle: &LoadedBundle) {
    let mut db = BundleDb::create(path, DataCache::new(16)).unwrap();
    let result = (|| -> anyhow::Result<()> {
        db.write_meta(&bundle.meta)?;
        db.write_documents(&bundle.documents)?;
        db.write_result_chunks(&bundle.result_chunks)?;
        db.write_definitions(&bundle.definitions)?;
        db.write_references(&bundle.references)?;
        Ok(())
    })();
    db.close(result).unwrap();
}
