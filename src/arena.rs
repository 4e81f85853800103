use crate::backend::{Backend, HeapBackend};
use crate::block::{align_up, BlockRecord, HEADER_SIZE};
use crate::chunk::{ChunkList, MAX_CHUNK_CAPACITY};
use crate::config::{ArenaBuilder, ArenaConfig, InvalidFreePolicy};
use crate::error::{AccessError, AllocError, FreeError};
use crate::free_list::FreeBlock;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to a live allocation, returned by [`Arena::allocate`].
///
/// The handle is plain data. Whether it still refers to live memory is checked by the
/// arena on every use: handles from another arena, from before a [`Arena::fold`], or to
/// memory that was already freed are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    arena: u32,
    epoch: u32,
    chunk: u32,
    offset: u32,
}

impl Allocation {
    /// Index of the chunk holding this allocation, in acquisition order.
    #[inline(always)]
    pub fn chunk_index(&self) -> usize {
        self.chunk as usize
    }

    /// Offset of the payload from the start of its chunk.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}

/// Usage snapshot of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStats {
    pub capacity: usize,
    /// Bytes claimed by live allocations, headers included.
    pub used: usize,
    /// Start of the never-allocated tail.
    pub cursor: usize,
    pub free_blocks: Vec<FreeBlock>,
}

impl ChunkStats {
    pub fn free_bytes(&self) -> usize {
        self.free_blocks.iter().map(|block| block.size).sum()
    }

    pub fn untouched_bytes(&self) -> usize {
        self.capacity - self.cursor
    }
}

struct ArenaState<B> {
    backend: B,
    chunks: ChunkList,
    epoch: u32,
}

/// Live block resolved from a handle.
struct Live {
    chunk: u32,
    header: u32,
    payload_size: u32,
}

/// Region-based allocator.
///
/// Memory is taken from the backend `B` in chunks of at least
/// [`ArenaConfig::chunk_capacity`] bytes. Allocations are served first-fit from the
/// chunks' free lists, then by bumping a chunk's cursor, then from a new chunk.
/// [`Arena::free`] makes a block reusable, [`Arena::fold`] gives all chunks back.
///
/// ```text
///   chunk 0  ┌────────┬─────────┬────────┬─────────┬──────────────┐
///            │ header │ payload │  free  │ header  │  untouched   │
///            └────────┴─────────┴────────┴─────────┴──────────────┘
///                                 ▲                ▲
///                           free list head       cursor
/// ```
///
/// The arena is not thread safe; use one per thread. Containers share it by `&Arena`,
/// and folding takes `&mut Arena`, so nothing borrowed from it survives a fold.
pub struct Arena<B: Backend = HeapBackend> {
    id: u32,
    config: ArenaConfig,
    state: RefCell<ArenaState<B>>,
}

impl Arena<HeapBackend> {
    /// Empty arena on the global heap with the default configuration.
    pub fn new() -> Arena<HeapBackend> {
        Arena::with_config(ArenaConfig::default(), HeapBackend)
    }

    pub fn builder() -> ArenaBuilder {
        ArenaBuilder::new()
    }
}

impl Default for Arena<HeapBackend> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<B: Backend> Arena<B> {
    pub fn with_backend(backend: B) -> Arena<B> {
        Arena::with_config(ArenaConfig::default(), backend)
    }

    pub fn with_config(config: ArenaConfig, backend: B) -> Arena<B> {
        Arena {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            config,
            state: RefCell::new(ArenaState {
                backend,
                chunks: ChunkList::default(),
                epoch: 0,
            }),
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Allocates `size` bytes, rounded up to a multiple of 8.
    ///
    /// The payload address is 8-byte aligned. Its content is unspecified: fresh chunk
    /// memory is zeroed, reused blocks keep whatever was written to them.
    pub fn allocate(&self, size: usize) -> Result<Allocation, AllocError> {
        self.allocate_raw(size).map(|(allocation, _)| allocation)
    }

    /// Allocates and also returns the payload address.
    pub(crate) fn allocate_raw(&self, size: usize) -> Result<(Allocation, NonNull<u8>), AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSized);
        }
        let max_payload = MAX_CHUNK_CAPACITY - HEADER_SIZE;
        if size > max_payload {
            return Err(AllocError::TooLarge { requested: size, max: max_payload });
        }
        let needed = (align_up(size) + HEADER_SIZE) as u32;

        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let default_capacity = self.config.chunk_capacity;

        if state.chunks.is_empty() {
            state.chunks.new_chunk(&mut state.backend, default_capacity, default_capacity)?;
        }

        let mut claimed = state.chunks.iter_mut()
            .find_map(|(index, chunk)| chunk.take_first_fit(needed).map(|(offset, size)| (index, offset, size)));

        if claimed.is_none() {
            claimed = state.chunks.iter_mut()
                .find_map(|(index, chunk)| chunk.bump(needed).map(|offset| (index, offset, needed)));
        }

        let (index, offset, block_size) = match claimed {
            Some(claimed) => claimed,
            None => {
                let (index, offset) = state.chunks.new_chunk_with_block(&mut state.backend, needed, default_capacity)?;
                (index, offset, needed)
            },
        };

        let ptr = state.chunks.occupy(index, offset, block_size);
        let payload = offset + HEADER_SIZE as u32;
        trace!("allocated {} bytes in chunk {} at {}", block_size, index, offset);

        Ok((Allocation {
            arena: self.id,
            epoch: state.epoch,
            chunk: index,
            offset: payload,
        }, ptr))
    }

    /// Makes the block reusable. `None`, and handles that do not refer to a live
    /// allocation of this arena, are ignored (or panic, see [`InvalidFreePolicy`]).
    ///
    /// Detection of invalid handles is best-effort, see [`FreeError`].
    pub fn free<A: Into<Option<Allocation>>>(&self, allocation: A) {
        let allocation = match allocation.into() {
            Some(allocation) => allocation,
            None => return,
        };
        if let Err(e) = self.try_free(allocation) {
            match self.config.invalid_free {
                InvalidFreePolicy::Ignore => {
                    warn!("ignored invalid free of {:?}: {}", allocation, e);
                },
                InvalidFreePolicy::Panic => panic!("invalid free of {:?}: {}", allocation, e),
            }
        }
    }

    /// Like [`Arena::free`], but reports why a handle was rejected.
    pub fn try_free(&self, allocation: Allocation) -> Result<(), FreeError> {
        let mut state = self.state.borrow_mut();
        let live = self.resolve(&state, allocation)?;
        let block_size = live.payload_size + HEADER_SIZE as u32;

        let chunk = state.chunks.get_mut(live.chunk).ok_or(FreeError::UnknownChunk { chunk: live.chunk })?;
        let slot = chunk.find_slot(live.header, block_size)?;
        chunk.release_used(block_size);
        chunk.insert_free(live.header, block_size, slot);
        trace!("freed {} bytes in chunk {} at {}", block_size, live.chunk, live.header);
        Ok(())
    }

    /// Releases every chunk back to the backend. Every handle handed out so far
    /// becomes stale. Calling it on an empty arena does nothing.
    pub fn fold(&mut self) {
        let state = self.state.get_mut();
        if state.chunks.is_empty() {
            return;
        }
        state.chunks.release_all(&mut state.backend);
        state.epoch = state.epoch.wrapping_add(1);
        debug!("folded arena {}", self.id);
    }

    /// True when the arena holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.borrow().chunks.len()
    }

    pub fn chunk_stats(&self) -> Vec<ChunkStats> {
        self.state.borrow().chunks.iter()
            .map(|chunk| ChunkStats {
                capacity: chunk.capacity() as usize,
                used: chunk.used() as usize,
                cursor: chunk.cursor() as usize,
                free_blocks: chunk.free_blocks().collect(),
            })
            .collect()
    }

    /// Whether the handle refers to a live allocation of this arena.
    pub fn is_live(&self, allocation: Allocation) -> bool {
        self.resolve(&self.state.borrow(), allocation).is_ok()
    }

    /// Usable payload size, at least the size that was requested.
    pub fn len_of(&self, allocation: Allocation) -> Option<usize> {
        self.resolve(&self.state.borrow(), allocation).ok()
            .map(|live| live.payload_size as usize)
    }

    /// Address of the payload.
    ///
    /// The pointer stays valid until the allocation is freed or the arena is folded;
    /// dereferencing it is up to the caller.
    pub fn as_ptr(&self, allocation: Allocation) -> Option<NonNull<u8>> {
        let state = self.state.borrow();
        self.resolve(&state, allocation).ok()?;
        Some(state.chunks.get(allocation.chunk)?.address(allocation.offset))
    }

    /// Copies `buf.len()` payload bytes starting at `offset` into `buf`.
    pub fn read(&self, allocation: Allocation, offset: usize, buf: &mut [u8]) -> Result<(), AccessError> {
        let ptr = self.payload_range(allocation, offset, buf.len())?;
        unsafe { std::ptr::copy_nonoverlapping(ptr, buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    /// Copies `data` into the payload starting at `offset`.
    pub fn write(&self, allocation: Allocation, offset: usize, data: &[u8]) -> Result<(), AccessError> {
        let ptr = self.payload_range(allocation, offset, data.len())?;
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
        Ok(())
    }

    /// Sets the whole payload to `byte`.
    pub fn fill(&self, allocation: Allocation, byte: u8) -> Result<(), AccessError> {
        let len = self.resolve(&self.state.borrow(), allocation)?.payload_size as usize;
        let ptr = self.payload_range(allocation, 0, len)?;
        unsafe { std::ptr::write_bytes(ptr, byte, len) };
        Ok(())
    }

    /// Copies the whole payload out.
    pub fn to_vec(&self, allocation: Allocation) -> Result<Vec<u8>, AccessError> {
        let len = self.resolve(&self.state.borrow(), allocation)?.payload_size as usize;
        let mut bytes = vec![0u8; len];
        self.read(allocation, 0, &mut bytes)?;
        Ok(bytes)
    }

    fn payload_range(&self, allocation: Allocation, offset: usize, len: usize) -> Result<*mut u8, AccessError> {
        let state = self.state.borrow();
        let live = self.resolve(&state, allocation)?;
        let size = live.payload_size as usize;
        if offset > size || len > size - offset {
            return Err(AccessError::OutOfRange { offset, len, size });
        }
        let chunk = state.chunks.get(live.chunk).ok_or(FreeError::UnknownChunk { chunk: live.chunk })?;
        Ok(unsafe { chunk.base().add(allocation.offset as usize + offset) })
    }

    /// Checks the handle against this arena and reads its header.
    fn resolve(&self, state: &ArenaState<B>, allocation: Allocation) -> Result<Live, FreeError> {
        if allocation.arena != self.id {
            return Err(FreeError::ForeignArena);
        }
        if allocation.epoch != state.epoch {
            return Err(FreeError::StaleEpoch);
        }
        let chunk = state.chunks.get(allocation.chunk)
            .ok_or(FreeError::UnknownChunk { chunk: allocation.chunk })?;
        let out_of_bounds = FreeError::OutOfBounds { chunk: allocation.chunk, offset: allocation.offset };

        let header = allocation.offset.checked_sub(HEADER_SIZE as u32).ok_or(out_of_bounds)?;
        if !chunk.holds_record(header) {
            return Err(out_of_bounds);
        }
        match chunk.record(header) {
            BlockRecord::Occupied { chunk: owner, size } => {
                if owner != allocation.chunk {
                    return Err(FreeError::ChunkMismatch { offset: header, expected: allocation.chunk, found: owner });
                }
                let end = allocation.offset as u64 + size as u64;
                if size == 0 || size % 8 != 0 || end > chunk.cursor() as u64 {
                    return Err(out_of_bounds);
                }
                Ok(Live { chunk: allocation.chunk, header, payload_size: size })
            },
            _ => Err(FreeError::TagMismatch { offset: header }),
        }
    }
}

impl<B: Backend> Drop for Arena<B> {
    fn drop(&mut self) {
        trace!("drop arena {}", self.id);
        self.fold();
    }
}

impl<B: Backend> std::fmt::Debug for Arena<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("epoch", &state.epoch)
            .field("chunks", &state.chunks.len())
            .field("config", &self.config)
            .finish()
    }
}
