//! Sources of raw chunk memory.
//!
//! Every backend hands out zero-initialized regions at a stable address and takes
//! them back whole. The arena never looks behind this trait, so which strategy is
//! used is decided once, by the type the arena is built with.

use crate::error::BackendError;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of every region handed out by the bundled backends.
pub const REGION_ALIGN: usize = 16;

/// A contiguous, zero-initialized block of memory owned by whoever holds it.
///
/// `Region` is neither `Clone` nor `Copy`: the value returned by
/// [`Backend::acquire_region`] is the one that has to be passed back to
/// [`Backend::release_region`].
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Wraps memory produced by a custom backend.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes, aligned to at least 8 bytes,
    /// zero-initialized, and must stay valid until the region is released.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Region {
        Region { ptr, len }
    }

    pub fn into_raw_parts(self) -> (NonNull<u8>, usize) {
        (self.ptr, self.len)
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Capability to acquire and release coarse memory regions.
pub trait Backend {
    /// Returns a zero-initialized region of at least `size` bytes, or an error.
    /// Never succeeds partially.
    fn acquire_region(&mut self, size: usize) -> Result<Region, BackendError>;

    /// Gives a region obtained from [`Backend::acquire_region`] of the same backend back.
    fn release_region(&mut self, region: Region);
}

fn region_layout(size: usize) -> Result<Layout, BackendError> {
    if size == 0 {
        return Err(BackendError::InvalidSize { size });
    }
    Layout::from_size_align(size, REGION_ALIGN).map_err(|_| BackendError::InvalidSize { size })
}

/// Regions from the global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapBackend;

impl Backend for HeapBackend {
    fn acquire_region(&mut self, size: usize) -> Result<Region, BackendError> {
        let layout = region_layout(size)?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(unsafe { Region::from_raw_parts(ptr, size) }),
            None => Err(BackendError::Exhausted { size }),
        }
    }

    fn release_region(&mut self, region: Region) {
        let (ptr, len) = region.into_raw_parts();
        if let Ok(layout) = region_layout(len) {
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}

/// Regions from anonymous private memory mappings.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapBackend;

#[cfg(unix)]
impl Backend for MmapBackend {
    fn acquire_region(&mut self, size: usize) -> Result<Region, BackendError> {
        if size == 0 {
            return Err(BackendError::InvalidSize { size });
        }
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(BackendError::Exhausted { size });
        }
        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Ok(unsafe { Region::from_raw_parts(ptr, size) }),
            None => Err(BackendError::Exhausted { size }),
        }
    }

    fn release_region(&mut self, region: Region) {
        let (ptr, len) = region.into_raw_parts();
        unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
    }
}

/// Regions from the process heap of the Windows heap API.
#[cfg(windows)]
#[derive(Debug)]
pub struct WindowsHeapBackend {
    heap: windows_sys::Win32::Foundation::HANDLE,
}

#[cfg(windows)]
impl WindowsHeapBackend {
    /// Looks up the process heap once; the handle lives in this instance.
    pub fn new() -> Result<WindowsHeapBackend, BackendError> {
        let heap = unsafe { windows_sys::Win32::System::Memory::GetProcessHeap() };
        if heap.is_null() {
            return Err(BackendError::Exhausted { size: 0 });
        }
        Ok(WindowsHeapBackend { heap })
    }
}

#[cfg(windows)]
impl Backend for WindowsHeapBackend {
    fn acquire_region(&mut self, size: usize) -> Result<Region, BackendError> {
        use windows_sys::Win32::System::Memory::{HeapAlloc, HEAP_ZERO_MEMORY};

        if size == 0 {
            return Err(BackendError::InvalidSize { size });
        }
        let ptr = unsafe { HeapAlloc(self.heap, HEAP_ZERO_MEMORY, size) };
        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Ok(unsafe { Region::from_raw_parts(ptr, size) }),
            None => Err(BackendError::Exhausted { size }),
        }
    }

    fn release_region(&mut self, region: Region) {
        use windows_sys::Win32::System::Memory::HeapFree;

        let (ptr, _) = region.into_raw_parts();
        unsafe { HeapFree(self.heap, 0, ptr.as_ptr() as *const _) };
    }
}

#[cfg(test)]
mod backend_tests {
    use super::*;

    fn check_zeroed_and_writable<B: Backend>(backend: &mut B) {
        let region = backend.acquire_region(4096).expect("region acquired");
        assert_eq!(4096, region.len());
        assert_eq!(0, region.as_ptr() as usize % 8, "region is 8-byte aligned");
        let bytes = unsafe { std::slice::from_raw_parts_mut(region.as_ptr(), region.len()) };
        assert!(bytes.iter().all(|b| *b == 0), "region is zero-initialized");
        bytes[4095] = 0xAB;
        assert_eq!(0xAB, bytes[4095]);
        backend.release_region(region);
    }

    #[test]
    fn heap_backend_returns_zeroed_memory() {
        check_zeroed_and_writable(&mut HeapBackend);
    }

    #[cfg(unix)]
    #[test]
    fn mmap_backend_returns_zeroed_memory() {
        check_zeroed_and_writable(&mut MmapBackend);
    }

    #[cfg(unix)]
    #[test]
    fn arena_over_mmap_backend() {
        use crate::ArenaBuilder;

        let mut arena = ArenaBuilder::new().chunk_capacity(4096).build_with(MmapBackend);
        let a = arena.allocate(100).unwrap();
        let b = arena.allocate(100).unwrap();
        arena.write(b, 0, b"mapped").unwrap();
        arena.free(a);
        let c = arena.allocate(64).unwrap();
        assert_eq!(a.offset(), c.offset(), "freed block reused");
        assert_eq!(b"mapped".to_vec(), arena.to_vec(b).unwrap()[..6].to_vec());

        arena.allocate(10_000).unwrap();
        assert_eq!(2, arena.chunk_count());
        arena.fold();
        assert!(arena.is_empty());
        assert!(!arena.is_live(b));
    }

    #[cfg(windows)]
    #[test]
    fn windows_heap_backend_returns_zeroed_memory() {
        let mut backend = WindowsHeapBackend::new().expect("process heap");
        check_zeroed_and_writable(&mut backend);
    }

    #[test]
    fn zero_sized_region_is_refused() {
        assert_eq!(
            Some(BackendError::InvalidSize { size: 0 }),
            HeapBackend.acquire_region(0).err()
        );
    }
}
