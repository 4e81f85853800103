use crate::backend::{Backend, HeapBackend};
use crate::block::{align_up, ALIGN};
use crate::error::AllocError;
use crate::{Allocation, Arena};
use std::ptr::NonNull;

/// Capacity of an array created with [`Array::new`].
pub const DEFAULT_ARRAY_CAPACITY: usize = 8;

/// Growable array whose storage lives in an [`Arena`].
///
/// Items are `Copy`, so storage can be moved between blocks and given back without
/// running destructors. Growing allocates a block twice as large, copies the items
/// and frees the old block. Dropping the array frees its block.
pub struct Array<'a, T, B: Backend = HeapBackend> where T: Copy {
    arena: &'a Arena<B>,
    storage: Allocation,
    data: NonNull<T>,
    len: usize,
    capacity: usize,
}

impl<'a, T, B: Backend> Array<'a, T, B> where T: Copy {
    pub fn new(arena: &'a Arena<B>) -> Result<Array<'a, T, B>, AllocError> {
        Array::with_capacity(arena, DEFAULT_ARRAY_CAPACITY)
    }

    /// Creates an empty array with room for at least `capacity` items; the capacity is
    /// rounded up to a multiple of 8.
    pub fn with_capacity(arena: &'a Arena<B>, capacity: usize) -> Result<Array<'a, T, B>, AllocError> {
        if std::mem::align_of::<T>() > ALIGN {
            return Err(AllocError::UnsupportedAlignment { align: std::mem::align_of::<T>(), supported: ALIGN });
        }
        let capacity = align_up(capacity.max(1));
        let (storage, data) = Self::allocate_items(arena, capacity)?;
        Ok(Array {
            arena,
            storage,
            data,
            len: 0,
            capacity,
        })
    }

    fn allocate_items(arena: &Arena<B>, capacity: usize) -> Result<(Allocation, NonNull<T>), AllocError> {
        let bytes = std::mem::size_of::<T>().checked_mul(capacity)
            .ok_or(AllocError::TooLarge { requested: usize::MAX, max: u32::MAX as usize })?;
        let (storage, ptr) = arena.allocate_raw(bytes.max(1))?;
        Ok((storage, ptr.cast::<T>()))
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn arena(&self) -> &'a Arena<B> {
        self.arena
    }

    /// Moves the items to a block of exactly `capacity` items (never fewer than `len`).
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), AllocError> {
        let capacity = capacity.max(self.len).max(1);
        let (storage, data) = Self::allocate_items(self.arena, capacity)?;
        unsafe { std::ptr::copy_nonoverlapping(self.data.as_ptr(), data.as_ptr(), self.len) };
        self.arena.free(self.storage);
        trace!("array moved to {} items", capacity);
        self.storage = storage;
        self.data = data;
        self.capacity = capacity;
        Ok(())
    }

    /// Makes room for `additional` more items, doubling the capacity as needed.
    pub fn reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let required = self.len.checked_add(additional)
            .ok_or(AllocError::TooLarge { requested: usize::MAX, max: u32::MAX as usize })?;
        if required <= self.capacity {
            return Ok(());
        }
        let mut capacity = self.capacity.max(1);
        while capacity < required {
            capacity = capacity.saturating_mul(2);
        }
        self.set_capacity(capacity)
    }

    /// Appends an item at the end.
    pub fn push(&mut self, item: T) -> Result<(), AllocError> {
        self.reserve(1)?;
        unsafe { self.data.as_ptr().add(self.len).write(item) };
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { self.data.as_ptr().add(self.len).read() })
    }

    /// Inserts an item before every other item.
    pub fn push_front(&mut self, item: T) -> Result<(), AllocError> {
        self.insert(0, item)
    }

    /// Removes the first item.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.remove(0))
        }
    }

    /// Inserts an item at `index`, shifting later items up.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), AllocError> {
        self.insert_from_slice(index, std::slice::from_ref(&item))
    }

    /// Inserts `items` at `index`, shifting later items up.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert_from_slice(&mut self, index: usize, items: &[T]) -> Result<(), AllocError> {
        assert!(index <= self.len, "insertion index {} is out of bounds (len {})", index, self.len);
        self.reserve(items.len())?;
        unsafe {
            let at = self.data.as_ptr().add(index);
            std::ptr::copy(at, at.add(items.len()), self.len - index);
            std::ptr::copy_nonoverlapping(items.as_ptr(), at, items.len());
        }
        self.len += items.len();
        Ok(())
    }

    pub fn extend_from_slice(&mut self, items: &[T]) -> Result<(), AllocError> {
        self.insert_from_slice(self.len, items)
    }

    /// Removes the item at `index`, shifting later items down.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(index < self.len, "removal index {} is out of bounds (len {})", index, self.len);
        unsafe {
            let at = self.data.as_ptr().add(index);
            let item = at.read();
            std::ptr::copy(at.add(1), at, self.len - index - 1);
            self.len -= 1;
            item
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// Replaces the item at `index`, returning the old one.
    pub fn set(&mut self, index: usize, item: T) -> Option<T> {
        self.get_mut(index).map(|slot| std::mem::replace(slot, item))
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    pub fn last(&self) -> Option<&T> {
        self.as_slice().last()
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }
}

impl<'a, T, B: Backend> Drop for Array<'a, T, B> where T: Copy {
    fn drop(&mut self) {
        self.arena.free(self.storage);
    }
}

impl<'a, T, B: Backend> std::fmt::Debug for Array<'a, T, B> where T: Copy + std::fmt::Debug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'s, 'a, T, B: Backend> IntoIterator for &'s Array<'a, T, B> where T: Copy {
    type Item = &'s T;
    type IntoIter = std::slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
