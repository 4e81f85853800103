use thiserror::Error;

/// Failure reported by a [`Backend`](crate::Backend) that could not supply a region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Region of {size} bytes can not be described by a memory layout")]
    InvalidSize { size: usize },
    #[error("Host refused to provide a region of {size} bytes")]
    Exhausted { size: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("Zero-sized allocation was requested")]
    ZeroSized,
    #[error("Allocation of {requested} bytes exceeds the maximum chunk size of {max} bytes")]
    TooLarge { requested: usize, max: usize },
    #[error("Alignment of {align} bytes is not supported, arena memory is aligned to {supported} bytes")]
    UnsupportedAlignment { align: usize, supported: usize },
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] BackendError),
}

/// Reason an [`Allocation`](crate::Allocation) handle was not accepted by `free`.
///
/// Most of these are checked exactly. [`FreeError::TagMismatch`] is best-effort: a
/// handle that points into memory which happens to contain a live header is accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    #[error("Allocation belongs to a different arena")]
    ForeignArena,
    #[error("Allocation was made before the arena was folded")]
    StaleEpoch,
    #[error("Allocation refers to chunk {chunk} which does not exist")]
    UnknownChunk { chunk: u32 },
    #[error("Allocation offset {offset} is outside the used part of chunk {chunk}")]
    OutOfBounds { chunk: u32, offset: u32 },
    #[error("Allocation header at offset {offset} is not live (double or invalid free)")]
    TagMismatch { offset: u32 },
    #[error("Allocation header at offset {offset} points to chunk {found}, expected {expected}")]
    ChunkMismatch { offset: u32, expected: u32, found: u32 },
    #[error("Block at offset {offset} overlaps an already free block (double free)")]
    OverlapsFreeBlock { offset: u32 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("Allocation is not live: {0}")]
    NotLive(#[from] FreeError),
    #[error("Access of {len} bytes at offset {offset} exceeds allocation of {size} bytes")]
    OutOfRange { offset: usize, len: usize, size: usize },
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("File I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("File is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("Failed to store file contents in arena: {0}")]
    Alloc(#[from] AllocError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("Position {at} is past the end of the {len} byte string")]
    OutOfBounds { at: usize, len: usize },
    #[error("Position {at} is not on a character boundary")]
    NotCharBoundary { at: usize },
    #[error("Failed to grow string builder: {0}")]
    Alloc(#[from] AllocError),
}
