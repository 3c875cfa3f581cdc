use crate::model::Id;

/// Maps a result set id onto one of `num_chunks` result chunks.
///
/// The hash is the classic 32-bit `h * 31 + c` string hash with wrapping arithmetic,
/// so bundles written by other tools with the same scheme shard identically.
pub fn chunk_index(id: &Id, num_chunks: usize) -> usize {
    assert!(num_chunks > 0, "chunk_index called with zero chunks");
    let mut hash: i32 = 0;
    for c in id.as_str().chars() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32);
    }
    hash.unsigned_abs() as usize % num_chunks
}
