use crate::error::MergeError;
use crate::model::{Id, Location, Position};
use crate::persistence::Reader;
use crate::sharding::chunk_index;
use anyhow::Result;
use std::collections::{BTreeSet, HashSet};

/// Locations of the definitions of the innermost range at `position`.
pub fn definitions_at(reader: &dyn Reader, path: &str, position: Position) -> Result<Vec<Location>> {
    let Some(document) = reader.read_document(path)? else {
        return Ok(Vec::new());
    };
    match document.range_at(position) {
        Some((_, range)) => match &range.definition_result_id {
            Some(id) => resolve_locations(reader, id),
            None => Ok(Vec::new()),
        },
        None => Ok(Vec::new()),
    }
}

/// Locations of the references of the innermost range at `position`.
pub fn references_at(reader: &dyn Reader, path: &str, position: Position) -> Result<Vec<Location>> {
    let Some(document) = reader.read_document(path)? else {
        return Ok(Vec::new());
    };
    match document.range_at(position) {
        Some((_, range)) => match &range.reference_result_id {
            Some(id) => resolve_locations(reader, id),
            None => Ok(Vec::new()),
        },
        None => Ok(Vec::new()),
    }
}

/// Paths containing a range whose definition points into one of `paths`.
pub fn documents_referencing(reader: &dyn Reader, paths: &[String]) -> Result<Vec<String>> {
    let targets: HashSet<&str> = paths.iter().map(String::as_str).collect();
    let meta = reader.read_meta()?;

    let mut definitions = HashSet::new();
    for index in 0..meta.num_result_chunks {
        let Some(chunk) = reader.read_result_chunk(index)? else {
            continue;
        };
        for (id, entries) in &chunk.document_id_range_ids {
            let points_into_target = entries.iter().any(|entry| {
                chunk
                    .path_of(entry.document_id)
                    .is_some_and(|path| targets.contains(path))
            });
            if points_into_target {
                definitions.insert(id.clone());
            }
        }
    }

    let mut referencing = BTreeSet::new();
    for path in reader.paths_with_prefix("")? {
        let Some(document) = reader.read_document(&path)? else {
            continue;
        };
        let links = document.ranges.values().any(|range| {
            range
                .definition_result_id
                .as_ref()
                .is_some_and(|id| definitions.contains(id))
        });
        if links {
            referencing.insert(path);
        }
    }
    Ok(referencing.into_iter().collect())
}

fn resolve_locations(reader: &dyn Reader, id: &Id) -> Result<Vec<Location>> {
    let meta = reader.read_meta()?;
    let index = chunk_index(id, meta.num_result_chunks);
    let missing = || MergeError::MissingResultSet {
        id: id.clone(),
        chunk: index,
    };
    let chunk = reader.read_result_chunk(index)?.ok_or_else(missing)?;
    let entries = chunk.document_id_range_ids.get(id).ok_or_else(missing)?;

    let mut locations = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = chunk
            .path_of(entry.document_id)
            .ok_or(MergeError::UnknownChunkDocument {
                chunk: index,
                document_id: entry.document_id,
            })?;
        let document = reader
            .read_document(path)?
            .ok_or_else(|| MergeError::UnknownDefinitionDocument {
                path: path.to_string(),
            })?;
        let range = document
            .ranges
            .get(&entry.range_id)
            .ok_or_else(|| MergeError::UnknownRange {
                path: path.to_string(),
                range_id: entry.range_id,
            })?;
        locations.push(Location::from_range(path, range));
    }
    Ok(locations)
}
