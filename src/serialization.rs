use crate::model::{Document, Location, ResultChunk};
use anyhow::{Context, Result};

/// Encodes the blobs stored in the `data` columns of a bundle.
pub trait Serializer: Send + Sync {
    fn marshal_document(&self, document: &Document) -> Result<Vec<u8>>;
    fn unmarshal_document(&self, data: &[u8]) -> Result<Document>;
    fn marshal_result_chunk(&self, chunk: &ResultChunk) -> Result<Vec<u8>>;
    fn unmarshal_result_chunk(&self, data: &[u8]) -> Result<ResultChunk>;
    fn marshal_locations(&self, locations: &[Location]) -> Result<Vec<u8>>;
    fn unmarshal_locations(&self, data: &[u8]) -> Result<Vec<Location>>;
}

/// JSON encoding. Output is deterministic because every map in the model is ordered.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn marshal_document(&self, document: &Document) -> Result<Vec<u8>> {
        serde_json::to_vec(document).context("encode document")
    }

    fn unmarshal_document(&self, data: &[u8]) -> Result<Document> {
        serde_json::from_slice(data).context("decode document")
    }

    fn marshal_result_chunk(&self, chunk: &ResultChunk) -> Result<Vec<u8>> {
        serde_json::to_vec(chunk).context("encode result chunk")
    }

    fn unmarshal_result_chunk(&self, data: &[u8]) -> Result<ResultChunk> {
        serde_json::from_slice(data).context("decode result chunk")
    }

    fn marshal_locations(&self, locations: &[Location]) -> Result<Vec<u8>> {
        serde_json::to_vec(locations).context("encode locations")
    }

    fn unmarshal_locations(&self, data: &[u8]) -> Result<Vec<Location>> {
        serde_json::from_slice(data).context("decode locations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentIdRangeId, Id, MonikerData, Position, Range};

    #[test]
    fn document_with_payload_round_trips() {
        let mut range = Range::new(Position::new(4, 2), Position::new(4, 9));
        range.definition_result_id = Some(Id::from("def-1"));
        range.reference_result_id = Some(Id::from("ref-1"));
        range.hover_result_id = Some(Id::from("hover-1"));
        range.moniker_ids = vec![Id::from("m-1")];

        let mut document = Document::default();
        document.ranges.insert(3, range);
        document
            .hover_results
            .insert(Id::from("hover-1"), "fn foo()".to_string());
        document.monikers.insert(
            Id::from("m-1"),
            MonikerData {
                kind: "export".to_string(),
                scheme: "cargo".to_string(),
                identifier: "crate::foo".to_string(),
            },
        );

        let serializer = JsonSerializer;
        let data = serializer.marshal_document(&document).unwrap();
        assert_eq!(serializer.unmarshal_document(&data).unwrap(), document);
    }

    #[test]
    fn result_chunk_encoding_is_deterministic() {
        let mut chunk = ResultChunk::default();
        for i in (0..20u64).rev() {
            chunk.document_paths.insert(i, format!("src/file{i}.rs"));
            chunk
                .document_id_range_ids
                .insert(Id::new(format!("r{i}")), vec![DocumentIdRangeId::new(i, i * 2)]);
        }
        let serializer = JsonSerializer;
        let first = serializer.marshal_result_chunk(&chunk).unwrap();
        let second = serializer
            .marshal_result_chunk(&serializer.unmarshal_result_chunk(&first).unwrap())
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_blob_is_an_error() {
        let err = JsonSerializer.unmarshal_document(b"\x00not json").unwrap_err();
        assert!(format!("{err:#}").contains("decode document"));
    }
}
