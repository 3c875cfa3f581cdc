use crate::changes::ChangeSet;
use crate::merge::{IdGenerator, MergeStats};
use crate::model::{Document, Location, Meta, MonikerKind, MonikerLocations, ResultChunk};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read access to a bundle. Absence is reported as `None`, never as an error.
pub trait Reader {
    fn read_meta(&self) -> Result<Meta>;

    /// Document paths starting with `prefix`, in lexicographic order.
    fn paths_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    fn read_document(&self, path: &str) -> Result<Option<Arc<Document>>>;

    fn read_result_chunk(&self, index: usize) -> Result<Option<Arc<ResultChunk>>>;

    fn read_definitions(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>>;

    fn read_references(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>>;

    /// Every moniker entry of one table, ordered by scheme then identifier.
    fn read_moniker_locations(&self, kind: MonikerKind) -> Result<Vec<MonikerLocations>>;
}

/// Bulk writes. Nothing written is visible to other connections until `close`
/// commits.
pub trait Writer {
    fn write_meta(&mut self, meta: &Meta) -> Result<()>;

    fn write_documents(&mut self, documents: &BTreeMap<String, Document>) -> Result<()>;

    fn write_result_chunks(&mut self, chunks: &BTreeMap<usize, ResultChunk>) -> Result<()>;

    fn write_definitions(&mut self, monikers: &[MonikerLocations]) -> Result<()>;

    fn write_references(&mut self, monikers: &[MonikerLocations]) -> Result<()>;

    /// Commits when `result` is `Ok`, rolls back otherwise, and releases the
    /// underlying connections. Returns `result` combined with any close failure.
    fn close(self, result: Result<()>) -> Result<()>
    where
        Self: Sized;
}

pub trait Patcher {
    /// Applies `patch` to the receiver according to `changes`.
    fn patch_database(
        &mut self,
        patch: &dyn Reader,
        changes: &ChangeSet,
        ids: &mut dyn IdGenerator,
    ) -> Result<MergeStats>;
}
