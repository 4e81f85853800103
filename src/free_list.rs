//! Per-chunk free list: address-ordered, never two adjacent nodes.
//!
//! Nodes live in the freed memory itself as [`BlockRecord::Free`] records, linked by
//! chunk-relative offsets.

use crate::block::{BlockRecord, MIN_FREE_BLOCK};
use crate::chunk::Chunk;
use crate::error::FreeError;

/// A free block as seen from outside the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Chunk-relative offset of the block start.
    pub offset: usize,
    /// Whole block size, record included.
    pub size: usize,
}

/// Neighbours of a block about to be inserted.
pub(crate) struct Slot {
    prev: Option<(u32, u32)>,
    next: Option<(u32, u32)>,
}

pub(crate) struct FreeBlocks<'a> {
    chunk: &'a Chunk,
    current: Option<u32>,
}

impl<'a> Iterator for FreeBlocks<'a> {
    type Item = (u32, u32, Option<u32>);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current?;
        match self.chunk.record(offset) {
            BlockRecord::Free { size, next } => {
                self.current = next;
                Some((offset, size, next))
            },
            _ => {
                debug_assert!(false, "free list node at {} is not a free record", offset);
                self.current = None;
                None
            },
        }
    }
}

impl Chunk {
    /// Walks the free list as `(offset, size, next)`.
    pub(crate) fn free_nodes(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            chunk: self,
            current: self.free_head,
        }
    }

    pub(crate) fn free_blocks(&self) -> impl Iterator<Item=FreeBlock> + '_ {
        self.free_nodes().map(|(offset, size, _)| FreeBlock {
            offset: offset as usize,
            size: size as usize,
        })
    }

    fn link(&mut self, prev: Option<u32>, next: Option<u32>) {
        match prev {
            None => self.free_head = next,
            Some(prev) => {
                if let BlockRecord::Free { size, .. } = self.record(prev) {
                    self.set_record(prev, BlockRecord::Free { size, next });
                }
            },
        }
    }

    /// Unlinks the first block (in address order) of at least `needed` bytes.
    ///
    /// Returns its offset and the size now claimed. A remainder big enough for a free
    /// record is split off and stays in the list in the block's place; a smaller one
    /// is claimed along with the block.
    pub(crate) fn take_first_fit(&mut self, needed: u32) -> Option<(u32, u32)> {
        let mut prev = None;
        let mut found = None;
        for (offset, size, next) in self.free_nodes() {
            if size >= needed {
                found = Some((offset, size, next));
                break;
            }
            prev = Some(offset);
        }
        let (offset, size, next) = found?;

        let remainder = size - needed;
        if remainder as usize >= MIN_FREE_BLOCK {
            let tail = offset + needed;
            self.set_record(tail, BlockRecord::Free { size: remainder, next });
            self.link(prev, Some(tail));
            trace!("split free block {}+{} at {}", offset, size, tail);
            Some((offset, needed))
        } else {
            self.link(prev, next);
            trace!("took whole free block {}+{}", offset, size);
            Some((offset, size))
        }
    }

    /// Finds where a block of `size` bytes at `offset` belongs in the list.
    ///
    /// Fails if it would overlap a block that is already free, which is what a
    /// second free of the same block looks like once its header was reused.
    pub(crate) fn find_slot(&self, offset: u32, size: u32) -> Result<Slot, FreeError> {
        let end = offset as u64 + size as u64;
        let mut prev = None;
        for (node, node_size, _) in self.free_nodes() {
            if node >= offset {
                if (node as u64) < end {
                    return Err(FreeError::OverlapsFreeBlock { offset });
                }
                return Ok(Slot { prev, next: Some((node, node_size)) });
            }
            if node as u64 + node_size as u64 > offset as u64 {
                return Err(FreeError::OverlapsFreeBlock { offset });
            }
            prev = Some((node, node_size));
        }
        Ok(Slot { prev, next: None })
    }

    /// Links the block between its address neighbours and merges it with each
    /// neighbour it touches.
    pub(crate) fn insert_free(&mut self, offset: u32, size: u32, slot: Slot) {
        let mut size = size;
        let mut next = slot.next.map(|(node, _)| node);

        if let Some((node, node_size)) = slot.next {
            if offset + size == node {
                let after = match self.record(node) {
                    BlockRecord::Free { next, .. } => next,
                    _ => None,
                };
                self.set_record(node, BlockRecord::Unknown);
                size += node_size;
                next = after;
                trace!("merged free block {} forward into {}", node, offset);
            }
        }

        match slot.prev {
            Some((node, node_size)) if node + node_size == offset => {
                self.set_record(offset, BlockRecord::Unknown);
                self.set_record(node, BlockRecord::Free { size: node_size + size, next });
                trace!("merged free block {} backward into {}", offset, node);
            },
            prev => {
                self.set_record(offset, BlockRecord::Free { size, next });
                self.link(prev.map(|(node, _)| node), Some(offset));
            },
        }
    }
}

#[cfg(test)]
mod free_list_tests {
    use crate::backend::HeapBackend;
    use crate::chunk::ChunkList;
    use super::FreeBlock;

    fn blocks(chunks: &ChunkList) -> Vec<(usize, usize)> {
        chunks.get(0).unwrap().free_blocks().map(|FreeBlock { offset, size }| (offset, size)).collect()
    }

    fn release(chunks: &mut ChunkList, offset: u32, size: u32) {
        let chunk = chunks.get_mut(0).unwrap();
        let slot = chunk.find_slot(offset, size).expect("no overlap");
        chunk.insert_free(offset, size, slot);
    }

    fn chunk_with_blocks(backend: &mut HeapBackend) -> ChunkList {
        let mut chunks = ChunkList::default();
        chunks.new_chunk(backend, 256, 256).unwrap();
        let chunk = chunks.get_mut(0).unwrap();
        for _ in 0..8 {
            chunk.bump(32).unwrap();
        }
        chunks
    }

    #[test]
    fn keeps_address_order_without_neighbours() {
        let mut backend = HeapBackend;
        let mut chunks = chunk_with_blocks(&mut backend);
        release(&mut chunks, 128, 32);
        release(&mut chunks, 0, 32);
        release(&mut chunks, 64, 32);
        assert_eq!(vec![(0, 32), (64, 32), (128, 32)], blocks(&chunks));
        chunks.release_all(&mut backend);
    }

    #[test]
    fn merges_with_both_neighbours() {
        let mut backend = HeapBackend;
        let mut chunks = chunk_with_blocks(&mut backend);
        release(&mut chunks, 32, 32);
        release(&mut chunks, 96, 32);
        release(&mut chunks, 64, 32);
        assert_eq!(vec![(32, 96)], blocks(&chunks));
        chunks.release_all(&mut backend);
    }

    #[test]
    fn merges_forward_at_list_head() {
        let mut backend = HeapBackend;
        let mut chunks = chunk_with_blocks(&mut backend);
        release(&mut chunks, 32, 32);
        release(&mut chunks, 0, 32);
        assert_eq!(vec![(0, 64)], blocks(&chunks));
        chunks.release_all(&mut backend);
    }

    #[test]
    fn refuses_overlapping_block() {
        let mut backend = HeapBackend;
        let mut chunks = chunk_with_blocks(&mut backend);
        release(&mut chunks, 32, 64);
        let chunk = chunks.get(0).unwrap();
        assert!(chunk.find_slot(32, 32).is_err(), "same start");
        assert!(chunk.find_slot(64, 32).is_err(), "inside previous");
        assert!(chunk.find_slot(0, 64).is_err(), "runs into next");
        assert!(chunk.find_slot(0, 32).is_ok(), "touching is fine");
        chunks.release_all(&mut backend);
    }

    #[test]
    fn first_fit_splits_large_remainder_and_swallows_small_one() {
        let mut backend = HeapBackend;
        let mut chunks = chunk_with_blocks(&mut backend);
        release(&mut chunks, 0, 32);
        release(&mut chunks, 64, 96);
        let chunk = chunks.get_mut(0).unwrap();

        assert_eq!(Some((0, 32)), chunk.take_first_fit(24), "8 byte remainder is swallowed");
        assert_eq!(Some((64, 48)), chunk.take_first_fit(48));
        assert_eq!(vec![(112, 48)], blocks(&chunks));

        let chunk = chunks.get_mut(0).unwrap();
        assert_eq!(None, chunk.take_first_fit(56));
        chunks.release_all(&mut backend);
    }
}
