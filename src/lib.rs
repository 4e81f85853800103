//! Chunked arena allocator with block reuse.
//!
//! An [`Arena`] obtains large chunks from a [`Backend`] and hands out 8-byte aligned
//! blocks from them. Freed blocks go to a per-chunk free list, ordered by address and
//! merged with their neighbours, and are reused first-fit before new memory is bumped.
//! [`Arena::fold`] gives every chunk back at once.
//!
//! ```
//! use memfold::Arena;
//!
//! let mut arena = Arena::new();
//! let a = arena.allocate(64).unwrap();
//! arena.write(a, 0, b"hello").unwrap();
//! arena.free(a);
//! let b = arena.allocate(64).unwrap();
//! assert_eq!(a.offset(), b.offset());
//! arena.fold();
//! assert!(!arena.is_live(b));
//! ```
//!
//! The containers ([`Array`], [`HashTable`], [`ArenaStr`], [`StringBuilder`]) borrow
//! the arena, so it can not be folded while any of them is alive.

mod logging;

mod backend;
mod block;
mod chunk;
mod free_list;
mod arena;
mod config;
mod error;
mod array;
mod hash;
mod arena_str;
mod string_builder;
mod fs;
mod traits;

pub use arena::{Allocation, Arena, ChunkStats};
pub use config::{ArenaBuilder, ArenaConfig, InvalidFreePolicy, DEFAULT_CHUNK_CAPACITY};
pub use backend::{Backend, HeapBackend, Region, REGION_ALIGN};
#[cfg(unix)]
pub use backend::MmapBackend;
#[cfg(windows)]
pub use backend::WindowsHeapBackend;
pub use block::{ALIGN, HEADER_SIZE, MIN_BLOCK};
pub use chunk::MAX_CHUNK_CAPACITY;
pub use error::{AccessError, AllocError, BackendError, BuilderError, FileError, FreeError};
pub use free_list::FreeBlock;
pub use array::{Array, DEFAULT_ARRAY_CAPACITY};
pub use hash::{HashTable, Iter as HashTableIter, TableKey, DEFAULT_TABLE_CAPACITY};
pub use arena_str::ArenaStr;
pub use string_builder::{StringBuilder, DEFAULT_BUILDER_CAPACITY};
pub use fs::{read_to_arena, write_from_arena};
pub use traits::ArenaIterator;
