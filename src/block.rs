//! The 16-byte record at the start of every block in a chunk.
//!
//! A block is either occupied (record is the allocation header, payload follows) or
//! free (record is a free list node). Which one is decided by the tag word.
//!
//! ```text
//!   offset      +0          +4          +8                   +16
//!   Occupied    | chunk u32 | size u32  | LIVE_TAG u64       | payload (size bytes) ...
//!   Free        | size u32  | next u32  | FREE_TAG u64       | stale bytes ...
//! ```

/// Alignment of every block and every payload.
pub const ALIGN: usize = 8;

/// Size of the record placed before each payload.
pub const HEADER_SIZE: usize = 16;

/// A free remainder smaller than this is left inside the allocation instead of split off.
pub const MIN_FREE_BLOCK: usize = HEADER_SIZE;

/// Smallest block that can hold a live allocation.
pub const MIN_BLOCK: usize = HEADER_SIZE + ALIGN;

const LIVE_TAG: u64 = 0x4C49_5645_A110_C8ED;
const FREE_TAG: u64 = 0x4652_4545_F0D1_DEAD;
const NO_NEXT: u32 = u32::MAX;

#[inline(always)]
pub const fn align_up(value: usize) -> usize {
    (value + ALIGN - 1) & !(ALIGN - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRecord {
    /// `size` is the payload size, header excluded.
    Occupied { chunk: u32, size: u32 },
    /// `size` covers the whole block, record included.
    Free { size: u32, next: Option<u32> },
    /// Neither tag: never-touched memory, payload bytes, or a cleared record.
    Unknown,
}

impl BlockRecord {
    /// Decodes the record at `offset`.
    ///
    /// # Safety
    ///
    /// `base` must be 8-byte aligned and valid for reads of `offset + HEADER_SIZE` bytes,
    /// and `offset` must be a multiple of 8.
    pub unsafe fn read(base: *const u8, offset: u32) -> BlockRecord {
        debug_assert_eq!(0, offset as usize % ALIGN, "record offset is aligned");
        let at = base.add(offset as usize);
        let first = (at as *const u32).read();
        let second = (at.add(4) as *const u32).read();
        let tag = (at.add(8) as *const u64).read();
        match tag {
            LIVE_TAG => BlockRecord::Occupied { chunk: first, size: second },
            FREE_TAG => BlockRecord::Free {
                size: first,
                next: if second == NO_NEXT { None } else { Some(second) },
            },
            _ => BlockRecord::Unknown,
        }
    }

    /// Encodes this record at `offset`. `Unknown` clears the record.
    ///
    /// # Safety
    ///
    /// Same as [`BlockRecord::read`], for writes.
    pub unsafe fn write(self, base: *mut u8, offset: u32) {
        debug_assert_eq!(0, offset as usize % ALIGN, "record offset is aligned");
        let (first, second, tag) = match self {
            BlockRecord::Occupied { chunk, size } => (chunk, size, LIVE_TAG),
            BlockRecord::Free { size, next } => (size, next.unwrap_or(NO_NEXT), FREE_TAG),
            BlockRecord::Unknown => (0, 0, 0),
        };
        let at = base.add(offset as usize);
        (at as *mut u32).write(first);
        (at.add(4) as *mut u32).write(second);
        (at.add(8) as *mut u64).write(tag);
    }
}
