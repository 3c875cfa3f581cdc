//! Reconciles a base bundle with an incrementally indexed patch bundle.
//!
//! Documents and result chunks of both bundles are loaded wholesale, stale
//! edges are purged from the base graph, patch documents are adopted, and every
//! result set id on an adopted range is translated into the base id space.
//! Definitions are matched across bundles by source position because range
//! and result set ids are local to the bundle that produced them.

use crate::changes::{ChangeSet, PathStatus};
use crate::error::MergeError;
use crate::model::{
    Document, DocumentIdRangeId, Id, Location, Meta, MonikerKind, MonikerLocations, Range,
    RangeId, ResultChunk,
};
use crate::persistence::Reader;
use crate::sharding::chunk_index;
use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

mod directory;
mod ids;
mod pairing;

use directory::ChunkDirectory;
pub use ids::{IdGenerator, UuidGenerator};
pub use pairing::pair_by_position;

/// A bundle fully materialized in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBundle {
    pub meta: Meta,
    pub documents: BTreeMap<String, Document>,
    pub result_chunks: BTreeMap<usize, ResultChunk>,
    pub definitions: Vec<MonikerLocations>,
    pub references: Vec<MonikerLocations>,
}

impl LoadedBundle {
    pub fn load(reader: &dyn Reader) -> Result<Self> {
        let meta = reader.read_meta()?;

        let mut documents = BTreeMap::new();
        for path in reader.paths_with_prefix("")? {
            let Some(document) = reader.read_document(&path)? else {
                bail!("document {path} is listed but cannot be read");
            };
            documents.insert(path, Arc::unwrap_or_clone(document));
        }

        let mut result_chunks = BTreeMap::new();
        for index in 0..meta.num_result_chunks {
            if let Some(chunk) = reader.read_result_chunk(index)? {
                result_chunks.insert(index, Arc::unwrap_or_clone(chunk));
            }
        }

        Ok(Self {
            meta,
            documents,
            result_chunks,
            definitions: reader.read_moniker_locations(MonikerKind::Definitions)?,
            references: reader.read_moniker_locations(MonikerKind::References)?,
        })
    }

    fn chunk_for(&self, id: &Id) -> (usize, Option<&ResultChunk>) {
        let index = chunk_index(id, self.meta.num_result_chunks);
        (index, self.result_chunks.get(&index))
    }

    fn entries_of(&self, id: &Id) -> Result<(usize, &ResultChunk, &[DocumentIdRangeId]), MergeError> {
        let (index, chunk) = self.chunk_for(id);
        let missing = || MergeError::MissingResultSet {
            id: id.clone(),
            chunk: index,
        };
        let chunk = chunk.ok_or_else(missing)?;
        let entries = chunk.document_id_range_ids.get(id).ok_or_else(missing)?;
        Ok((index, chunk, entries))
    }
}

/// In-memory bundles answer reads directly, which lets queries and merges
/// run without a database.
impl Reader for LoadedBundle {
    fn read_meta(&self) -> Result<Meta> {
        Ok(self.meta)
    }

    fn paths_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .documents
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn read_document(&self, path: &str) -> Result<Option<Arc<Document>>> {
        Ok(self.documents.get(path).cloned().map(Arc::new))
    }

    fn read_result_chunk(&self, index: usize) -> Result<Option<Arc<ResultChunk>>> {
        Ok(self.result_chunks.get(&index).cloned().map(Arc::new))
    }

    fn read_definitions(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        Ok(find_locations(&self.definitions, scheme, identifier))
    }

    fn read_references(&self, scheme: &str, identifier: &str) -> Result<Vec<Location>> {
        Ok(find_locations(&self.references, scheme, identifier))
    }

    fn read_moniker_locations(&self, kind: MonikerKind) -> Result<Vec<MonikerLocations>> {
        Ok(match kind {
            MonikerKind::Definitions => self.definitions.clone(),
            MonikerKind::References => self.references.clone(),
        })
    }
}

fn find_locations(monikers: &[MonikerLocations], scheme: &str, identifier: &str) -> Vec<Location> {
    monikers
        .iter()
        .find(|moniker| moniker.scheme == scheme && moniker.identifier == identifier)
        .map(|moniker| moniker.locations.clone())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub purged_entries: usize,
    pub dropped_documents: usize,
    pub adopted_documents: usize,
    pub reused_result_sets: usize,
    pub minted_result_sets: usize,
    pub appended_entries: usize,
}

/// Applies `patch` to `base` according to `changes` and returns the merged bundle.
///
/// Any inconsistency in either graph aborts the merge; nothing is skipped.
pub fn merge(
    mut base: LoadedBundle,
    patch: &LoadedBundle,
    changes: &ChangeSet,
    ids: &mut dyn IdGenerator,
) -> Result<(LoadedBundle, MergeStats)> {
    validate_changes(&base, patch, changes)?;
    let mut stats = MergeStats::default();

    let adopted: BTreeSet<&str> = changes.adopted().collect();
    let stale: BTreeSet<String> = changes
        .iter()
        .map(|(path, _)| path)
        .filter(|path| base.documents.contains_key(*path))
        .map(str::to_string)
        .collect();

    stats.purged_entries = purge_stale_entries(&mut base.result_chunks, &stale)?;

    let mut previous = BTreeMap::new();
    for path in &stale {
        if let Some(document) = base.documents.remove(path) {
            previous.insert(path.clone(), document);
        }
    }
    stats.dropped_documents = previous.len();

    for path in &adopted {
        base.documents
            .insert(path.to_string(), patch.documents[*path].clone());
    }
    stats.adopted_documents = adopted.len();
    tracing::debug!(
        purged = stats.purged_entries,
        dropped = stats.dropped_documents,
        adopted = stats.adopted_documents,
        "purged stale edges"
    );

    let mut relinker = Relinker {
        base: &base,
        patch,
        adopted: &adopted,
        ids,
        translation: BTreeMap::new(),
        base_range_updates: Vec::new(),
        stats: &mut stats,
    };
    relinker.link_definitions(&previous)?;
    relinker.translate_remaining()?;
    let Relinker {
        translation,
        base_range_updates,
        ..
    } = relinker;

    append_translated_entries(&mut base, patch, &adopted, &translation, &mut stats)?;
    rewrite_adopted_ranges(&mut base.documents, &adopted, &translation);
    for (path, range_id, id) in base_range_updates {
        if let Some(range) = base
            .documents
            .get_mut(&path)
            .and_then(|document| document.ranges.get_mut(&range_id))
        {
            range.reference_result_id = Some(id);
        }
    }

    base.definitions = reconcile_monikers(
        std::mem::take(&mut base.definitions),
        &patch.definitions,
        &stale,
        &adopted,
    );
    base.references = reconcile_monikers(
        std::mem::take(&mut base.references),
        &patch.references,
        &stale,
        &adopted,
    );

    Ok((base, stats))
}

fn validate_changes(
    base: &LoadedBundle,
    patch: &LoadedBundle,
    changes: &ChangeSet,
) -> Result<(), MergeError> {
    let invalid = |path: &str, reason: &str| MergeError::Classification {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    for (path, status) in changes.iter() {
        let in_base = base.documents.contains_key(path);
        let in_patch = patch.documents.contains_key(path);
        match status {
            PathStatus::Added | PathStatus::Modified if !in_patch => {
                return Err(invalid(path, "the patch has no document for it"));
            }
            PathStatus::Deleted if in_patch => {
                return Err(invalid(path, "deleted but the patch has a document for it"));
            }
            PathStatus::Modified if !in_base => {
                tracing::warn!("{path} is classified modified but absent from base, adopting it");
            }
            PathStatus::Deleted if !in_base => {
                tracing::warn!("{path} is classified deleted but absent from base");
            }
            _ => {}
        }
    }

    for path in patch.documents.keys() {
        if changes.status(path).is_none() && !base.documents.contains_key(path) {
            return Err(invalid(path, "only the patch has it but it is not classified"));
        }
    }
    Ok(())
}

/// Removes every entry sourced from a stale path and drops stale paths from
/// the chunk directories. Result set keys are kept even when emptied.
fn purge_stale_entries(
    chunks: &mut BTreeMap<usize, ResultChunk>,
    stale: &BTreeSet<String>,
) -> Result<usize, MergeError> {
    let mut purged = 0;
    for (index, chunk) in chunks.iter_mut() {
        for entries in chunk.document_id_range_ids.values() {
            if let Some(entry) = entries
                .iter()
                .find(|entry| !chunk.document_paths.contains_key(&entry.document_id))
            {
                return Err(MergeError::UnknownChunkDocument {
                    chunk: *index,
                    document_id: entry.document_id,
                });
            }
        }

        let stale_ids: HashSet<u64> = chunk
            .document_paths
            .iter()
            .filter(|(_, path)| stale.contains(path.as_str()))
            .map(|(id, _)| *id)
            .collect();
        if stale_ids.is_empty() {
            continue;
        }

        for entries in chunk.document_id_range_ids.values_mut() {
            let before = entries.len();
            entries.retain(|entry| !stale_ids.contains(&entry.document_id));
            purged += before - entries.len();
        }
        chunk.document_paths.retain(|id, _| !stale_ids.contains(id));
    }
    Ok(purged)
}

/// Builds the patch id → base id translation table.
struct Relinker<'a> {
    base: &'a LoadedBundle,
    patch: &'a LoadedBundle,
    adopted: &'a BTreeSet<&'a str>,
    ids: &'a mut dyn IdGenerator,
    translation: BTreeMap<Id, Id>,
    base_range_updates: Vec<(String, RangeId, Id)>,
    stats: &'a mut MergeStats,
}

impl Relinker<'_> {
    /// Maps each definition used by an adopted range onto the base result sets
    /// of the same definition, found by position.
    fn link_definitions(
        &mut self,
        previous: &BTreeMap<String, Document>,
    ) -> Result<(), MergeError> {
        let (base, patch, adopted) = (self.base, self.patch, self.adopted);
        let mut sites: BTreeMap<String, Vec<(RangeId, Id)>> = BTreeMap::new();
        let mut seen = HashSet::new();
        for path in adopted {
            for range in patch.documents[*path].ranges.values() {
                let Some(definition_id) = &range.definition_result_id else {
                    continue;
                };
                if !seen.insert(definition_id.clone()) {
                    continue;
                }
                let (def_path, def_range) = self.resolve_definition(definition_id)?;
                sites
                    .entry(def_path)
                    .or_default()
                    .push((def_range, definition_id.clone()));
            }
        }

        for (def_path, group) in &sites {
            let def_adopted = adopted.contains(def_path.as_str());
            let counterpart_document = if def_adopted {
                previous.get(def_path)
            } else {
                Some(base.documents.get(def_path).ok_or_else(|| {
                    MergeError::UnknownDefinitionDocument {
                        path: def_path.clone(),
                    }
                })?)
            };

            let patch_document = &patch.documents[def_path];
            let wanted: Vec<&Range> = group
                .iter()
                .map(|(range_id, _)| &patch_document.ranges[range_id])
                .collect();
            let pairs = match counterpart_document {
                Some(document) => pair_by_position(&document.ranges, &wanted),
                None => vec![None; wanted.len()],
            };

            for (((range_id, definition_id), site), pair) in group.iter().zip(&wanted).zip(pairs) {
                let missing = || MergeError::MissingCounterpart {
                    path: def_path.clone(),
                    range_id: *range_id,
                };
                let (definition_target, reference_target) = match pair {
                    Some((base_range_id, counterpart)) => {
                        let definition_target = match &counterpart.definition_result_id {
                            Some(id) => self.reuse(id)?,
                            None if def_adopted => self.mint()?,
                            None => return Err(missing()),
                        };
                        let reference_target = match (&site.reference_result_id, &counterpart.reference_result_id) {
                            (None, _) => None,
                            (Some(_), Some(id)) => Some(self.reuse(id)?),
                            (Some(_), None) => {
                                let id = self.mint()?;
                                if !def_adopted {
                                    self.base_range_updates.push((def_path.clone(), base_range_id, id.clone()));
                                }
                                Some(id)
                            }
                        };
                        (definition_target, reference_target)
                    }
                    None if def_adopted => {
                        let definition_target = self.mint()?;
                        let reference_target = match site.reference_result_id {
                            Some(_) => Some(self.mint()?),
                            None => None,
                        };
                        (definition_target, reference_target)
                    }
                    None => return Err(missing()),
                };

                self.translation
                    .entry(definition_id.clone())
                    .or_insert(definition_target);
                if let (Some(patch_id), Some(target)) = (&site.reference_result_id, reference_target) {
                    self.translation.entry(patch_id.clone()).or_insert(target);
                }
            }
        }
        Ok(())
    }

    /// Gives every result set id on adopted ranges not reached through a
    /// definition a fresh base id.
    fn translate_remaining(&mut self) -> Result<(), MergeError> {
        let (patch, adopted) = (self.patch, self.adopted);
        for path in adopted {
            for range in patch.documents[*path].ranges.values() {
                for id in [&range.definition_result_id, &range.reference_result_id]
                    .into_iter()
                    .flatten()
                {
                    if !self.translation.contains_key(id) {
                        let fresh = self.mint()?;
                        self.translation.insert(id.clone(), fresh);
                    }
                }
            }
        }
        Ok(())
    }

    /// The defining site of `id` in the patch: the first entry of its result set.
    fn resolve_definition(&self, id: &Id) -> Result<(String, RangeId), MergeError> {
        let (index, chunk, entries) = self.patch.entries_of(id)?;
        let Some(first) = entries.first() else {
            return Err(MergeError::MissingResultSet {
                id: id.clone(),
                chunk: index,
            });
        };
        let path = chunk
            .path_of(first.document_id)
            .ok_or(MergeError::UnknownChunkDocument {
                chunk: index,
                document_id: first.document_id,
            })?;
        let document = self.patch.documents.get(path).ok_or_else(|| {
            MergeError::UnknownDefinitionDocument {
                path: path.to_string(),
            }
        })?;
        if !document.ranges.contains_key(&first.range_id) {
            return Err(MergeError::UnknownRange {
                path: path.to_string(),
                range_id: first.range_id,
            });
        }
        Ok((path.to_string(), first.range_id))
    }

    /// Reuses a base result set id, which must be backed by a chunk entry.
    fn reuse(&mut self, id: &Id) -> Result<Id, MergeError> {
        self.base.entries_of(id)?;
        self.stats.reused_result_sets += 1;
        Ok(id.clone())
    }

    fn mint(&mut self) -> Result<Id, MergeError> {
        let id = self.ids.next_id()?;
        self.stats.minted_result_sets += 1;
        Ok(id)
    }
}

/// Copies the patch entries sourced from adopted paths into the base chunks
/// under their translated ids.
fn append_translated_entries(
    base: &mut LoadedBundle,
    patch: &LoadedBundle,
    adopted: &BTreeSet<&str>,
    translation: &BTreeMap<Id, Id>,
    stats: &mut MergeStats,
) -> Result<(), MergeError> {
    let num_chunks = base.meta.num_result_chunks;
    let mut directories: BTreeMap<usize, ChunkDirectory> = BTreeMap::new();

    for (patch_id, base_id) in translation {
        let (patch_index, patch_chunk, entries) = patch.entries_of(patch_id)?;
        let base_index = chunk_index(base_id, num_chunks);
        let base_chunk = base.result_chunks.entry(base_index).or_default();
        let directory = directories
            .entry(base_index)
            .or_insert_with(|| ChunkDirectory::new(base_chunk));

        let mut translated = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = patch_chunk.path_of(entry.document_id).ok_or(
                MergeError::UnknownChunkDocument {
                    chunk: patch_index,
                    document_id: entry.document_id,
                },
            )?;
            if !adopted.contains(path) {
                continue;
            }
            if !patch.documents[path].ranges.contains_key(&entry.range_id) {
                return Err(MergeError::UnknownRange {
                    path: path.to_string(),
                    range_id: entry.range_id,
                });
            }
            let document_id = directory.document_id(path, base_chunk);
            translated.push(DocumentIdRangeId::new(document_id, entry.range_id));
        }

        let list = base_chunk
            .document_id_range_ids
            .entry(base_id.clone())
            .or_default();
        let mut present: HashSet<DocumentIdRangeId> = list.iter().copied().collect();
        for entry in translated {
            if present.insert(entry) {
                list.push(entry);
                stats.appended_entries += 1;
            }
        }
    }
    Ok(())
}

fn rewrite_adopted_ranges(
    documents: &mut BTreeMap<String, Document>,
    adopted: &BTreeSet<&str>,
    translation: &BTreeMap<Id, Id>,
) {
    for path in adopted {
        let Some(document) = documents.get_mut(*path) else {
            continue;
        };
        for range in document.ranges.values_mut() {
            for slot in [
                &mut range.definition_result_id,
                &mut range.reference_result_id,
            ] {
                if let Some(id) = slot.as_ref() {
                    *slot = translation.get(id).cloned();
                }
            }
        }
    }
}

/// Drops moniker locations in stale paths and adds the patch's locations in
/// adopted paths. Only entries this merge emptied are removed; untouched
/// entries are kept as they were.
fn reconcile_monikers(
    base: Vec<MonikerLocations>,
    patch: &[MonikerLocations],
    stale: &BTreeSet<String>,
    adopted: &BTreeSet<&str>,
) -> Vec<MonikerLocations> {
    // (locations, whether any were removed)
    let mut merged: BTreeMap<(String, String), (Vec<Location>, bool)> = BTreeMap::new();
    for moniker in base {
        let before = moniker.locations.len();
        let kept: Vec<Location> = moniker
            .locations
            .into_iter()
            .filter(|location| !stale.contains(&location.path))
            .collect();
        let pruned = kept.len() < before;
        let entry = merged
            .entry((moniker.scheme, moniker.identifier))
            .or_default();
        entry.0.extend(kept);
        entry.1 |= pruned;
    }
    for moniker in patch {
        let added: Vec<Location> = moniker
            .locations
            .iter()
            .filter(|location| adopted.contains(location.path.as_str()))
            .cloned()
            .collect();
        if added.is_empty() {
            continue;
        }
        merged
            .entry((moniker.scheme.clone(), moniker.identifier.clone()))
            .or_default()
            .0
            .extend(added);
    }
    merged
        .into_iter()
        .filter(|(_, (locations, pruned))| !(*pruned && locations.is_empty()))
        .map(|((scheme, identifier), (locations, _))| MonikerLocations {
            scheme,
            identifier,
            locations,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;

    struct Counter(u32);

    impl IdGenerator for Counter {
        fn next_id(&mut self) -> Result<Id, MergeError> {
            self.0 += 1;
            Ok(Id::new(format!("new-{}", self.0)))
        }
    }

    fn range(line: u32, definition: Option<&str>, references: Option<&str>) -> Range {
        let mut range = Range::new(Position::new(line, 0), Position::new(line, 3));
        range.definition_result_id = definition.map(Id::from);
        range.reference_result_id = references.map(Id::from);
        range
    }

    fn bundle(documents: &[(&str, &[(RangeId, Range)])], sets: &[(&str, &[(&str, RangeId)])]) -> LoadedBundle {
        let meta = Meta { num_result_chunks: 2 };
        let mut result_chunks: BTreeMap<usize, ResultChunk> = BTreeMap::new();
        for (id, entries) in sets {
            let id = Id::from(*id);
            let chunk = result_chunks.entry(chunk_index(&id, 2)).or_default();
            let mut directory = ChunkDirectory::new(chunk);
            let list = entries
                .iter()
                .map(|(path, range_id)| {
                    DocumentIdRangeId::new(directory.document_id(path, chunk), *range_id)
                })
                .collect();
            chunk.document_id_range_ids.insert(id, list);
        }
        LoadedBundle {
            meta,
            documents: documents
                .iter()
                .map(|(path, ranges)| {
                    let document = Document {
                        ranges: ranges.iter().cloned().collect(),
                        ..Document::default()
                    };
                    (path.to_string(), document)
                })
                .collect(),
            result_chunks,
            definitions: Vec::new(),
            references: Vec::new(),
        }
    }

    fn entry_paths(bundle: &LoadedBundle, id: &str) -> Vec<String> {
        let (_, chunk, entries) = bundle.entries_of(&Id::from(id)).unwrap();
        entries
            .iter()
            .map(|entry| chunk.path_of(entry.document_id).unwrap().to_string())
            .collect()
    }

    #[test]
    fn deleted_path_entries_are_purged_and_others_kept() {
        let base = bundle(
            &[
                ("a", &[(1, range(0, Some("D"), Some("R")))]),
                ("b", &[(1, range(1, Some("D"), Some("R")))]),
            ],
            &[("D", &[("a", 1)]), ("R", &[("a", 1), ("b", 1)])],
        );
        let patch = bundle(&[], &[]);
        let changes = ChangeSet::new().with("b", PathStatus::Deleted);

        let (merged, stats) = merge(base, &patch, &changes, &mut Counter(0)).unwrap();
        assert_eq!(stats.purged_entries, 1);
        assert_eq!(entry_paths(&merged, "R"), vec!["a"]);
        assert!(!merged.documents.contains_key("b"));
    }

    #[test]
    fn new_file_definitions_get_fresh_ids() {
        let base = bundle(&[("a", &[])], &[]);
        let patch = bundle(
            &[("n", &[(4, range(2, Some("PD"), Some("PR")))])],
            &[("PD", &[("n", 4)]), ("PR", &[("n", 4)])],
        );
        let changes = ChangeSet::new().with("n", PathStatus::Added);

        let (merged, stats) = merge(base, &patch, &changes, &mut Counter(0)).unwrap();
        assert_eq!(stats.minted_result_sets, 2);
        let adopted = &merged.documents["n"].ranges[&4];
        assert_eq!(adopted.definition_result_id, Some(Id::from("new-1")));
        assert_eq!(adopted.reference_result_id, Some(Id::from("new-2")));
        assert_eq!(entry_paths(&merged, "new-1"), vec!["n"]);
        assert_eq!(entry_paths(&merged, "new-2"), vec!["n"]);
    }

    #[test]
    fn unchanged_definition_without_reference_set_gets_one() {
        let base = bundle(
            &[("a", &[(1, range(0, Some("D"), None))])],
            &[("D", &[("a", 1)])],
        );
        let patch = bundle(
            &[
                ("a", &[(9, range(0, Some("PD"), Some("PR")))]),
                ("n", &[(2, range(5, Some("PD"), Some("PR")))]),
            ],
            &[("PD", &[("a", 9)]), ("PR", &[("a", 9), ("n", 2)])],
        );
        let changes = ChangeSet::new().with("n", PathStatus::Added);

        let (merged, _) = merge(base, &patch, &changes, &mut Counter(0)).unwrap();
        let definition = &merged.documents["a"].ranges[&1];
        assert_eq!(definition.reference_result_id, Some(Id::from("new-1")));
        // Only the adopted path's entry is carried over.
        assert_eq!(entry_paths(&merged, "new-1"), vec!["n"]);
    }

    #[test]
    fn reused_base_id_without_result_set_is_rejected() {
        // The base range names R, but no chunk holds it.
        let base = bundle(
            &[("a", &[(1, range(0, Some("D"), Some("R")))])],
            &[("D", &[("a", 1)])],
        );
        let patch = bundle(
            &[
                ("a", &[(9, range(0, Some("PD"), Some("PR")))]),
                ("n", &[(2, range(5, Some("PD"), Some("PR")))]),
            ],
            &[("PD", &[("a", 9)]), ("PR", &[("a", 9), ("n", 2)])],
        );
        let changes = ChangeSet::new().with("n", PathStatus::Added);

        let err = merge(base, &patch, &changes, &mut Counter(0)).unwrap_err();
        match err.downcast_ref::<MergeError>() {
            Some(MergeError::MissingResultSet { id, .. }) => assert_eq!(id, &Id::from("R")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn classification_must_match_the_patch() {
        let base = bundle(&[("a", &[])], &[]);
        let patch = bundle(&[("a", &[])], &[]);
        let changes = ChangeSet::new().with("a", PathStatus::Deleted);
        let err = merge(base.clone(), &patch, &changes, &mut Counter(0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MergeError>(),
            Some(MergeError::Classification { .. })
        ));

        let changes = ChangeSet::new().with("z", PathStatus::Added);
        assert!(merge(base, &patch, &changes, &mut Counter(0)).is_err());
    }

    #[test]
    fn unknown_chunk_document_is_reported() {
        let mut base = bundle(&[("a", &[])], &[("D", &[("a", 1)])]);
        for chunk in base.result_chunks.values_mut() {
            chunk.document_paths.clear();
        }
        let err = merge(base, &bundle(&[], &[]), &ChangeSet::new(), &mut Counter(0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MergeError>(),
            Some(MergeError::UnknownChunkDocument { .. })
        ));
    }

    #[test]
    fn empty_change_set_keeps_the_bundle_identical() {
        let mut base = bundle(
            &[("a", &[(1, range(0, Some("D"), Some("R")))])],
            &[("D", &[("a", 1)]), ("R", &[("a", 1)])],
        );
        base.definitions.push(MonikerLocations {
            scheme: "npm".to_string(),
            identifier: "unused".to_string(),
            locations: Vec::new(),
        });
        base.references.push(MonikerLocations {
            scheme: "npm".to_string(),
            identifier: "left-pad".to_string(),
            locations: vec![Location::from_range("a", &range(0, None, None))],
        });

        let (merged, stats) =
            merge(base.clone(), &bundle(&[], &[]), &ChangeSet::new(), &mut Counter(0)).unwrap();
        assert_eq!(merged, base);
        assert_eq!(stats, MergeStats::default());
    }

    #[test]
    fn monikers_emptied_by_the_merge_are_dropped() {
        let location = Location::from_range("b", &range(0, None, None));
        let base = vec![
            MonikerLocations {
                scheme: "npm".to_string(),
                identifier: "gone".to_string(),
                locations: vec![location],
            },
            MonikerLocations {
                scheme: "npm".to_string(),
                identifier: "never-located".to_string(),
                locations: Vec::new(),
            },
        ];
        let stale = BTreeSet::from(["b".to_string()]);

        let merged = reconcile_monikers(base, &[], &stale, &BTreeSet::new());
        let identifiers: Vec<&str> = merged.iter().map(|m| m.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["never-located"]);
    }

    #[test]
    fn monikers_follow_their_paths() {
        let location = |path: &str| Location {
            path: path.to_string(),
            start: Position::new(0, 0),
            end: Position::new(0, 1),
        };
        let base = vec![MonikerLocations {
            scheme: "npm".to_string(),
            identifier: "left-pad".to_string(),
            locations: vec![location("a"), location("b")],
        }];
        let patch = vec![MonikerLocations {
            scheme: "npm".to_string(),
            identifier: "left-pad".to_string(),
            locations: vec![location("b"), location("ctx")],
        }];
        let stale = BTreeSet::from(["b".to_string()]);
        let adopted = BTreeSet::from(["b"]);

        let merged = reconcile_monikers(base, &patch, &stale, &adopted);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].locations, vec![location("a"), location("b")]);
    }
}
