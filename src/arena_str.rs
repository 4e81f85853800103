use crate::backend::{Backend, HeapBackend};
use crate::error::AllocError;
use crate::{Allocation, Arena};
use std::fmt::{Debug, Display};
use std::ptr::NonNull;

/// Immutable UTF-8 string stored in an [`Arena`]. Dropping it frees the storage.
pub struct ArenaStr<'a, B: Backend = HeapBackend> {
    arena: &'a Arena<B>,
    allocation: Allocation,
    first: NonNull<u8>,
    len: usize,
}

impl<'a, B: Backend> ArenaStr<'a, B> {
    pub fn from_str(arena: &'a Arena<B>, value: &str) -> Result<ArenaStr<'a, B>, AllocError> {
        let (allocation, first) = arena.allocate_raw(value.len().max(1))?;
        unsafe {
            std::ptr::copy_nonoverlapping(value.as_ptr(), first.as_ptr(), value.len());
            Ok(ArenaStr::from_raw_parts(arena, allocation, first, value.len()))
        }
    }

    /// Takes ownership of `len` bytes at the start of `allocation`.
    ///
    /// The bytes must be valid UTF-8 and `first` must be the payload address.
    pub(crate) unsafe fn from_raw_parts(arena: &'a Arena<B>, allocation: Allocation, first: NonNull<u8>, len: usize) -> ArenaStr<'a, B> {
        ArenaStr {
            arena,
            allocation,
            first,
            len,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        unsafe {
            let bytes = std::slice::from_raw_parts(self.first.as_ptr(), self.len);
            std::str::from_utf8_unchecked(bytes)
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }
}

impl<'a, B: Backend> Drop for ArenaStr<'a, B> {
    fn drop(&mut self) {
        self.arena.free(self.allocation);
    }
}

impl<'a, B: Backend> AsRef<str> for ArenaStr<'a, B> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<'a, B: Backend> Debug for ArenaStr<'a, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self.as_str(), f)
    }
}

impl<'a, B: Backend> Display for ArenaStr<'a, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl<'a, 'b, B: Backend, C: Backend> PartialEq<ArenaStr<'b, C>> for ArenaStr<'a, B> {
    fn eq(&self, other: &ArenaStr<'b, C>) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<'a, B: Backend> Eq for ArenaStr<'a, B> {}

impl<'a, B: Backend> PartialEq<str> for ArenaStr<'a, B> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<'a, 's, B: Backend> PartialEq<&'s str> for ArenaStr<'a, B> {
    fn eq(&self, other: &&'s str) -> bool {
        self.as_str() == *other
    }
}

impl<'a, B: Backend> PartialEq<ArenaStr<'a, B>> for str {
    fn eq(&self, other: &ArenaStr<'a, B>) -> bool {
        self == other.as_str()
    }
}

impl<'a, B: Backend> PartialEq<ArenaStr<'a, B>> for &str {
    fn eq(&self, other: &ArenaStr<'a, B>) -> bool {
        *self == other.as_str()
    }
}

impl<'a, B: Backend> PartialEq<String> for ArenaStr<'a, B> {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<'a, B: Backend> PartialEq<ArenaStr<'a, B>> for String {
    fn eq(&self, other: &ArenaStr<'a, B>) -> bool {
        self.as_str() == other.as_str()
    }
}
