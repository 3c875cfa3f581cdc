use crate::model::{DocumentId, ResultChunk};
use std::collections::HashMap;

/// Insert-or-lookup view of one chunk's document directory, built fresh for
/// each merge and never shared between chunks.
#[derive(Debug)]
pub(crate) struct ChunkDirectory {
    by_path: HashMap<String, DocumentId>,
    next_id: DocumentId,
}

impl ChunkDirectory {
    pub(crate) fn new(chunk: &ResultChunk) -> Self {
        let mut by_path = HashMap::with_capacity(chunk.document_paths.len());
        for (id, path) in &chunk.document_paths {
            by_path.entry(path.clone()).or_insert(*id);
        }
        let next_id = chunk
            .document_paths
            .keys()
            .next_back()
            .map_or(0, |max| max + 1);
        Self { by_path, next_id }
    }

    /// Local id of `path` in `chunk`, registering the path if it is new.
    pub(crate) fn document_id(&mut self, path: &str, chunk: &mut ResultChunk) -> DocumentId {
        if let Some(id) = self.by_path.get(path) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_path.insert(path.to_string(), id);
        chunk.document_paths.insert(id, path.to_string());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_known_paths_and_allocates_past_the_maximum() {
        let mut chunk = ResultChunk::default();
        chunk.document_paths.insert(2, "a.rs".to_string());
        chunk.document_paths.insert(9, "b.rs".to_string());

        let mut directory = ChunkDirectory::new(&chunk);
        assert_eq!(directory.document_id("b.rs", &mut chunk), 9);
        assert_eq!(directory.document_id("c.rs", &mut chunk), 10);
        assert_eq!(directory.document_id("c.rs", &mut chunk), 10);
        assert_eq!(chunk.path_of(10), Some("c.rs"));
        assert_eq!(chunk.document_paths.len(), 3);
    }

    #[test]
    fn empty_chunk_starts_at_zero() {
        let mut chunk = ResultChunk::default();
        let mut directory = ChunkDirectory::new(&chunk);
        assert_eq!(directory.document_id("a.rs", &mut chunk), 0);
    }
}
