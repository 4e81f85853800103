use crate::backend::{Backend, Region};
use crate::block::{BlockRecord, HEADER_SIZE};
use crate::error::{AllocError, BackendError};
use std::ptr::NonNull;

/// Largest chunk the arena can address with 32-bit offsets.
pub const MAX_CHUNK_CAPACITY: usize = u32::MAX as usize & !7;

/// One region obtained from the backend, sub-allocated by bumping `cursor`
/// and by reusing blocks from its free list.
///
/// `used + free list bytes + (capacity - cursor) == capacity` holds between calls.
pub(crate) struct Chunk {
    region: Region,
    capacity: u32,
    cursor: u32,
    used: u32,
    pub(crate) free_head: Option<u32>,
}

impl Chunk {
    fn new(region: Region) -> Chunk {
        let capacity = region.len().min(MAX_CHUNK_CAPACITY) as u32;
        Chunk {
            region,
            capacity,
            cursor: 0,
            used: 0,
            free_head: None,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline(always)]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    #[inline(always)]
    pub fn used(&self) -> u32 {
        self.used
    }

    #[inline(always)]
    pub fn base(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    /// Whether a record starting at `offset` lies inside the bumped part of the chunk.
    #[inline(always)]
    pub fn holds_record(&self, offset: u32) -> bool {
        offset % 8 == 0 && offset as usize + HEADER_SIZE <= self.cursor as usize
    }

    pub fn record(&self, offset: u32) -> BlockRecord {
        if !self.holds_record(offset) {
            return BlockRecord::Unknown;
        }
        unsafe { BlockRecord::read(self.base(), offset) }
    }

    pub fn set_record(&mut self, offset: u32, record: BlockRecord) {
        debug_assert!(self.holds_record(offset), "record inside bumped area");
        if self.holds_record(offset) {
            unsafe { record.write(self.base(), offset) };
        }
    }

    /// Claims `needed` bytes from the untouched tail.
    pub fn bump(&mut self, needed: u32) -> Option<u32> {
        if self.capacity - self.cursor < needed {
            return None;
        }
        let offset = self.cursor;
        self.cursor += needed;
        Some(offset)
    }

    /// Turns the block at `offset` into a live allocation owned by chunk `index`.
    pub fn occupy(&mut self, index: u32, offset: u32, block_size: u32) {
        self.set_record(offset, BlockRecord::Occupied {
            chunk: index,
            size: block_size - HEADER_SIZE as u32,
        });
        self.used += block_size;
    }

    /// Address of `offset` inside the chunk.
    #[inline(always)]
    pub fn address(&self, offset: u32) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity, "address inside chunk");
        unsafe { NonNull::new_unchecked(self.base().add(offset as usize)) }
    }

    #[inline(always)]
    pub fn release_used(&mut self, block_size: u32) {
        debug_assert!(block_size <= self.used, "released more than used");
        self.used -= block_size;
    }

    fn into_region(self) -> Region {
        self.region
    }
}

/// The arena's chunks, in the order they were acquired.
#[derive(Default)]
pub(crate) struct ChunkList {
    chunks: Vec<Chunk>,
}

impl ChunkList {
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline(always)]
    pub fn get(&self, index: u32) -> Option<&Chunk> {
        self.chunks.get(index as usize)
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut Chunk> {
        self.chunks.get_mut(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item=&Chunk> {
        self.chunks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item=(u32, &mut Chunk)> {
        self.chunks.iter_mut().enumerate().map(|(i, chunk)| (i as u32, chunk))
    }

    /// Acquires a chunk of `max(min_size, default_capacity)` bytes and appends it.
    /// On failure the list is left untouched.
    pub fn new_chunk<B: Backend>(&mut self, backend: &mut B, min_size: usize, default_capacity: usize) -> Result<u32, AllocError> {
        let size = min_size.max(default_capacity);
        if size > MAX_CHUNK_CAPACITY {
            return Err(AllocError::TooLarge { requested: size, max: MAX_CHUNK_CAPACITY });
        }
        if self.chunks.len() >= u32::MAX as usize {
            return Err(AllocError::TooLarge { requested: size, max: 0 });
        }
        let region = backend.acquire_region(size)?;
        if region.len() < size {
            backend.release_region(region);
            return Err(BackendError::Exhausted { size }.into());
        }
        debug!("acquired chunk {} of {} bytes at {:?}", self.chunks.len(), region.len(), region.as_ptr());
        self.chunks.push(Chunk::new(region));
        Ok((self.chunks.len() - 1) as u32)
    }

    /// Acquires a chunk like [`ChunkList::new_chunk`] and claims its first `needed` bytes.
    pub fn new_chunk_with_block<B: Backend>(&mut self, backend: &mut B, needed: u32, default_capacity: usize) -> Result<(u32, u32), AllocError> {
        let index = self.new_chunk(backend, needed as usize, default_capacity)?;
        let chunk = &mut self.chunks[index as usize];
        debug_assert!(chunk.capacity() >= needed, "fresh chunk holds the block");
        chunk.cursor = needed;
        Ok((index, 0))
    }

    /// Marks the block as live and returns its payload address.
    pub fn occupy(&mut self, index: u32, offset: u32, block_size: u32) -> NonNull<u8> {
        let chunk = &mut self.chunks[index as usize];
        chunk.occupy(index, offset, block_size);
        chunk.address(offset + HEADER_SIZE as u32)
    }

    /// Gives every chunk back to the backend. No-op when empty.
    pub fn release_all<B: Backend>(&mut self, backend: &mut B) {
        for (_index, chunk) in self.chunks.drain(..).enumerate() {
            debug!("releasing chunk {} of {} bytes", _index, chunk.capacity());
            backend.release_region(chunk.into_region());
        }
    }
}

#[cfg(test)]
mod chunk_tests {
    use super::*;
    use crate::backend::HeapBackend;

    #[test]
    fn new_chunk_uses_at_least_default_capacity() {
        let mut backend = HeapBackend;
        let mut chunks = ChunkList::default();
        assert_eq!(0, chunks.new_chunk(&mut backend, 16, 64).unwrap());
        assert_eq!(1, chunks.new_chunk(&mut backend, 128, 64).unwrap());
        assert_eq!(64, chunks.get(0).unwrap().capacity());
        assert_eq!(128, chunks.get(1).unwrap().capacity());
        chunks.release_all(&mut backend);
        assert!(chunks.is_empty());
        chunks.release_all(&mut backend);
        assert!(chunks.is_empty());
    }

    /// Hands out half of what was asked for.
    struct ShortBackend;

    impl Backend for ShortBackend {
        fn acquire_region(&mut self, size: usize) -> Result<Region, BackendError> {
            HeapBackend.acquire_region(size / 2)
        }

        fn release_region(&mut self, region: Region) {
            HeapBackend.release_region(region)
        }
    }

    #[test]
    fn short_region_is_refused() {
        let mut chunks = ChunkList::default();
        assert_eq!(
            Err(AllocError::OutOfMemory(BackendError::Exhausted { size: 128 })),
            chunks.new_chunk(&mut ShortBackend, 128, 64)
        );
        assert!(chunks.is_empty());
    }

    #[test]
    fn new_chunk_with_block_claims_the_start() {
        let mut backend = HeapBackend;
        let mut chunks = ChunkList::default();
        assert_eq!((0, 0), chunks.new_chunk_with_block(&mut backend, 48, 64).unwrap());
        let ptr = chunks.occupy(0, 0, 48);
        let chunk = chunks.get(0).unwrap();
        assert_eq!(48, chunk.cursor());
        assert_eq!(48, chunk.used());
        assert_eq!(unsafe { chunk.base().add(HEADER_SIZE) }, ptr.as_ptr());
        assert_eq!(BlockRecord::Occupied { chunk: 0, size: 32 }, chunk.record(0));
        chunks.release_all(&mut backend);
    }

    #[test]
    fn bump_stops_at_capacity() {
        let mut backend = HeapBackend;
        let mut chunks = ChunkList::default();
        chunks.new_chunk(&mut backend, 64, 64).unwrap();
        let chunk = chunks.get_mut(0).unwrap();
        assert_eq!(Some(0), chunk.bump(40));
        assert_eq!(None, chunk.bump(32));
        assert_eq!(Some(40), chunk.bump(24));
        assert_eq!(64, chunk.cursor());
        chunks.release_all(&mut backend);
    }
}
