use crate::error::MergeError;
use crate::model::Id;

/// Source of globally unique result set ids minted during a merge.
pub trait IdGenerator {
    fn next_id(&mut self) -> Result<Id, MergeError>;
}

/// Random (v4) UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> Result<Id, MergeError> {
        Ok(Id::new(uuid::Uuid::new_v4().to_string()))
    }
}
