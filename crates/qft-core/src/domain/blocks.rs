//! Block geometry shared with the transfer engine.

/// Size of one transport block (1 MiB).
pub const BLOCK_SIZE: u64 = 1024 * 1024;

/// Number of blocks a file of `file_size` bytes is split into.
///
/// An empty file has zero blocks, which the registry rejects as an
/// integrity error.
pub fn block_count(file_size: u64) -> u32 {
    u32::try_from(file_size.div_ceil(BLOCK_SIZE)).unwrap_or(u32::MAX)
}
