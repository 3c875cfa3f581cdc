use crate::model::{DocumentId, Id, RangeId};
use thiserror::Error;

/// Failures that abort a merge. Wrapped in `anyhow::Error` at API boundaries;
/// callers recover the variant with `downcast_ref::<MergeError>()`.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("result set {id} has no entry in chunk {chunk}")]
    MissingResultSet { id: Id, chunk: usize },

    #[error("chunk {chunk} has no document with local id {document_id}")]
    UnknownChunkDocument { chunk: usize, document_id: DocumentId },

    #[error("document {path} has no range {range_id}")]
    UnknownRange { path: String, range_id: RangeId },

    #[error("definition document {path} is not present in the bundle")]
    UnknownDefinitionDocument { path: String },

    #[error("definition at {path} range {range_id} has no counterpart in the base bundle")]
    MissingCounterpart { path: String, range_id: RangeId },

    #[error("invalid path classification for {path}: {reason}")]
    Classification { path: String, reason: String },

    #[error("failed to generate result set id: {0}")]
    IdGeneration(String),

    #[error("merge canceled")]
    Canceled,
}

impl MergeError {
    pub fn is_consistency(&self) -> bool {
        !matches!(self, MergeError::IdGeneration(_) | MergeError::Canceled)
    }
}

/// Joins two outcomes. When both failed the primary error is kept as the
/// root (so it stays downcastable) and the secondary is attached as context.
pub fn combine(primary: anyhow::Result<()>, secondary: anyhow::Result<()>) -> anyhow::Result<()> {
    match (primary, secondary) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(primary), Err(secondary)) => {
            Err(primary.context(format!("additionally: {secondary:#}")))
        }
    }
}
