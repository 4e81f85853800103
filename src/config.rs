use crate::backend::{Backend, HeapBackend};
use crate::block::{align_up, MIN_BLOCK};
use crate::chunk::MAX_CHUNK_CAPACITY;
use crate::Arena;

/// Chunk size used when nothing else is configured.
pub const DEFAULT_CHUNK_CAPACITY: usize = 8 * 1024;

/// What [`Arena::free`] does with a handle that is not a live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFreePolicy {
    /// Log a warning (with the `logging` feature) and carry on.
    Ignore,
    /// Panic; meant for debugging code that frees twice.
    Panic,
}

impl Default for InvalidFreePolicy {
    fn default() -> Self {
        InvalidFreePolicy::Ignore
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Minimum size of every chunk requested from the backend.
    pub chunk_capacity: usize,
    pub invalid_free: InvalidFreePolicy,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            invalid_free: InvalidFreePolicy::default(),
        }
    }
}

/// Builds an [`Arena`].
///
/// ```
/// use memfold::{ArenaBuilder, InvalidFreePolicy};
///
/// let arena = ArenaBuilder::new()
///     .chunk_capacity(64 * 1024)
///     .invalid_free(InvalidFreePolicy::Panic)
///     .build();
/// let block = arena.allocate(100).unwrap();
/// assert_eq!(104, arena.len_of(block).unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArenaBuilder {
    config: ArenaConfig,
}

impl ArenaBuilder {
    pub fn new() -> ArenaBuilder {
        ArenaBuilder::default()
    }

    /// Sets the default chunk size. It is rounded up to a multiple of 8 and kept
    /// between the smallest block and the largest addressable chunk.
    pub fn chunk_capacity(mut self, capacity: usize) -> ArenaBuilder {
        self.config.chunk_capacity = align_up(capacity.min(MAX_CHUNK_CAPACITY)).max(MIN_BLOCK);
        self
    }

    pub fn invalid_free(mut self, policy: InvalidFreePolicy) -> ArenaBuilder {
        self.config.invalid_free = policy;
        self
    }

    pub fn config(&self) -> ArenaConfig {
        self.config
    }

    pub fn build(self) -> Arena<HeapBackend> {
        Arena::with_config(self.config, HeapBackend)
    }

    pub fn build_with<B: Backend>(self, backend: B) -> Arena<B> {
        Arena::with_config(self.config, backend)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn chunk_capacity_is_rounded_and_clamped() {
        assert_eq!(64, ArenaBuilder::new().chunk_capacity(61).config().chunk_capacity);
        assert_eq!(MIN_BLOCK, ArenaBuilder::new().chunk_capacity(0).config().chunk_capacity);
        assert_eq!(MAX_CHUNK_CAPACITY, ArenaBuilder::new().chunk_capacity(usize::MAX).config().chunk_capacity);
    }

    #[test]
    fn defaults() {
        let config = ArenaBuilder::new().config();
        assert_eq!(DEFAULT_CHUNK_CAPACITY, config.chunk_capacity);
        assert_eq!(InvalidFreePolicy::Ignore, config.invalid_free);
    }
}
