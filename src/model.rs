use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque identifier of a result set. Compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(raw: impl Into<String>) -> Self {
        Id(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(raw: &str) -> Self {
        Id(raw.to_string())
    }
}

/// Document-local range id.
pub type RangeId = u64;

/// Chunk-local document id.
pub type DocumentId = u64;

/// Zero-based; orders by line, then character.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_result_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_result_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_result_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moniker_ids: Vec<Id>,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }

    /// Orders by start position, then by end position.
    pub fn compare_span(&self, other: &Range) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }

    /// Half-open containment: `start <= position < end`.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonikerData {
    pub kind: String,
    pub scheme: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    pub ranges: BTreeMap<RangeId, Range>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hover_results: BTreeMap<Id, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub monikers: BTreeMap<Id, MonikerData>,
}

impl Document {
    /// Innermost range containing `position`, if any.
    pub fn range_at(&self, position: Position) -> Option<(RangeId, &Range)> {
        self.ranges
            .iter()
            .filter(|(_, range)| range.contains(position))
            .max_by(|(_, a), (_, b)| a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)))
            .map(|(id, range)| (*id, range))
    }
}

/// Locates one range within the scope of a single result chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentIdRangeId {
    pub document_id: DocumentId,
    pub range_id: RangeId,
}

impl DocumentIdRangeId {
    pub fn new(document_id: DocumentId, range_id: RangeId) -> Self {
        Self {
            document_id,
            range_id,
        }
    }
}

/// One shard of the reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultChunk {
    pub document_paths: BTreeMap<DocumentId, String>,
    pub document_id_range_ids: BTreeMap<Id, Vec<DocumentIdRangeId>>,
}

impl ResultChunk {
    pub fn path_of(&self, document_id: DocumentId) -> Option<&str> {
        self.document_paths.get(&document_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub num_result_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn from_range(path: &str, range: &Range) -> Self {
        Self {
            path: path.to_string(),
            start: range.start,
            end: range.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonikerLocations {
    pub scheme: String,
    pub identifier: String,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonikerKind {
    Definitions,
    References,
}

impl MonikerKind {
    pub fn table(self) -> &'static str {
        match self {
            MonikerKind::Definitions => "definitions",
            MonikerKind::References => "\"references\"",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range::new(Position::new(sl, sc), Position::new(el, ec))
    }

    #[test]
    fn new_range_carries_no_links() {
        let range = span(2, 1, 2, 4);
        assert_eq!(range.start, Position::new(2, 1));
        assert!(range.definition_result_id.is_none());
        assert!(range.reference_result_id.is_none());
        assert!(range.moniker_ids.is_empty());
        assert_eq!(Range::default().start, Position::new(0, 0));
    }

    #[test]
    fn compare_span_orders_by_start_then_end() {
        let a = span(1, 0, 1, 5);
        let b = span(1, 0, 1, 9);
        let c = span(2, 0, 2, 1);
        assert_eq!(a.compare_span(&b), Ordering::Less);
        assert_eq!(b.compare_span(&c), Ordering::Less);
        assert_eq!(a.compare_span(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn range_at_prefers_innermost() {
        let mut doc = Document::default();
        doc.ranges.insert(1, span(0, 0, 10, 0));
        doc.ranges.insert(2, span(3, 4, 3, 9));
        let (id, _) = doc.range_at(Position::new(3, 5)).unwrap();
        assert_eq!(id, 2);
        let (id, _) = doc.range_at(Position::new(5, 0)).unwrap();
        assert_eq!(id, 1);
        assert!(doc.range_at(Position::new(3, 9)).is_some_and(|(id, _)| id == 1));
        assert!(doc.range_at(Position::new(10, 0)).is_none());
    }
}
