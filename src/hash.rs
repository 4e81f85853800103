//! Chained hash table with nodes in an arena.
//!
//! Each entry is one arena allocation; buckets hold the head of a singly linked chain.
//! The bucket count is fixed when the table is created.

use crate::backend::{Backend, HeapBackend};
use crate::block::ALIGN;
use crate::error::AllocError;
use crate::{Allocation, Arena, Array};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Bucket count of a table created with [`HashTable::new`].
pub const DEFAULT_TABLE_CAPACITY: usize = 64;

/// A type that can be used as a [`HashTable`] key.
///
/// `Stored` is what the node keeps: the value itself for integers, an arena copy
/// for strings.
pub trait TableKey {
    type Stored: Copy;

    fn hash_with(&self, seed: u32) -> u32;
    fn store<B: Backend>(&self, arena: &Arena<B>) -> Result<Self::Stored, AllocError>;
    fn matches(&self, stored: &Self::Stored) -> bool;
    fn release<B: Backend>(stored: Self::Stored, arena: &Arena<B>);
    fn view(stored: &Self::Stored) -> &Self;
}

macro_rules! int_key {
    ($fold:expr; $($t:ty)*) => {$(
        impl TableKey for $t {
            type Stored = $t;

            #[inline(always)]
            fn hash_with(&self, seed: u32) -> u32 {
                seed ^ ($fold)(*self as u64)
            }

            fn store<B: Backend>(&self, _arena: &Arena<B>) -> Result<$t, AllocError> {
                Ok(*self)
            }

            #[inline(always)]
            fn matches(&self, stored: &$t) -> bool {
                self == stored
            }

            fn release<B: Backend>(_stored: $t, _arena: &Arena<B>) {}

            fn view(stored: &$t) -> &$t {
                stored
            }
        }
    )*};
}

int_key!(|v: u64| v as u32; u8 u16 u32 i8 i16 i32);
int_key!(|v: u64| (v ^ (v >> 32)) as u32; u64 i64 usize isize);

/// Arena copy of a string key.
#[derive(Clone, Copy)]
pub struct StoredStr {
    allocation: Allocation,
    ptr: NonNull<u8>,
    len: usize,
}

impl TableKey for str {
    type Stored = StoredStr;

    /// djb2, starting from the seed instead of 5381.
    fn hash_with(&self, seed: u32) -> u32 {
        self.bytes().fold(seed, |hash, c| (hash << 5).wrapping_add(hash).wrapping_add(c as u32))
    }

    fn store<B: Backend>(&self, arena: &Arena<B>) -> Result<StoredStr, AllocError> {
        let (allocation, ptr) = arena.allocate_raw(self.len().max(1))?;
        unsafe { std::ptr::copy_nonoverlapping(self.as_ptr(), ptr.as_ptr(), self.len()) };
        Ok(StoredStr { allocation, ptr, len: self.len() })
    }

    fn matches(&self, stored: &StoredStr) -> bool {
        self == Self::view(stored)
    }

    fn release<B: Backend>(stored: StoredStr, arena: &Arena<B>) {
        arena.free(stored.allocation);
    }

    fn view(stored: &StoredStr) -> &str {
        unsafe {
            let bytes = std::slice::from_raw_parts(stored.ptr.as_ptr(), stored.len);
            std::str::from_utf8_unchecked(bytes)
        }
    }
}

#[repr(C)]
struct Node<S, V> {
    next: Option<Link<S, V>>,
    key: S,
    value: V,
}

struct Link<S, V> {
    allocation: Allocation,
    node: NonNull<Node<S, V>>,
}

impl<S, V> Clone for Link<S, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, V> Copy for Link<S, V> {}

type Bucket<S, V> = Option<Link<S, V>>;

/// Hash table whose nodes and bucket array live in an [`Arena`].
///
/// ```
/// use memfold::{Arena, HashTable};
///
/// let arena = Arena::new();
/// let mut ages = HashTable::<str, u32>::new(&arena).unwrap();
/// ages.insert("Jane", 26).unwrap();
/// assert_eq!(Some(&26), ages.get("Jane"));
/// ```
pub struct HashTable<'a, K, V, B: Backend = HeapBackend> where K: TableKey + ?Sized, V: Copy {
    arena: &'a Arena<B>,
    buckets: Array<'a, Bucket<K::Stored, V>, B>,
    seed: u32,
    len: usize,
}

impl<'a, K, V, B: Backend> HashTable<'a, K, V, B> where K: TableKey + ?Sized, V: Copy {
    pub fn new(arena: &'a Arena<B>) -> Result<HashTable<'a, K, V, B>, AllocError> {
        HashTable::with_capacity(arena, DEFAULT_TABLE_CAPACITY)
    }

    /// Creates a table with `capacity` buckets (rounded up to a multiple of 8) and a
    /// random odd seed.
    pub fn with_capacity(arena: &'a Arena<B>, capacity: usize) -> Result<HashTable<'a, K, V, B>, AllocError> {
        let seed = (RandomState::new().build_hasher().finish() as u32) | 1;
        HashTable::with_seed(arena, capacity, seed)
    }

    pub fn with_seed(arena: &'a Arena<B>, capacity: usize, seed: u32) -> Result<HashTable<'a, K, V, B>, AllocError> {
        let align = std::mem::align_of::<Node<K::Stored, V>>();
        if align > ALIGN {
            return Err(AllocError::UnsupportedAlignment { align, supported: ALIGN });
        }
        let mut buckets = Array::with_capacity(arena, capacity)?;
        for _ in 0..buckets.capacity() {
            buckets.push(None)?;
        }
        debug!("hash table with {} buckets, seed {:#x}", buckets.len(), seed);
        Ok(HashTable {
            arena,
            buckets,
            seed,
            len: 0,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    #[inline(always)]
    fn bucket_of(&self, key: &K) -> usize {
        (key.hash_with(self.seed) % self.buckets.len() as u32) as usize
    }

    #[inline(always)]
    fn head(&self, bucket: usize) -> Bucket<K::Stored, V> {
        self.buckets.as_slice()[bucket]
    }

    fn find(&self, key: &K) -> Option<NonNull<Node<K::Stored, V>>> {
        let mut current = self.head(self.bucket_of(key));
        while let Some(link) = current {
            let node = unsafe { link.node.as_ref() };
            if key.matches(&node.key) {
                return Some(link.node);
            }
            current = node.next;
        }
        None
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: &K, value: V) -> Result<Option<V>, AllocError> {
        if let Some(mut node) = self.find(key) {
            let node = unsafe { node.as_mut() };
            return Ok(Some(std::mem::replace(&mut node.value, value)));
        }

        let stored = key.store(self.arena)?;
        let (allocation, ptr) = match self.arena.allocate_raw(std::mem::size_of::<Node<K::Stored, V>>()) {
            Ok(allocated) => allocated,
            Err(e) => {
                K::release(stored, self.arena);
                return Err(e);
            },
        };
        let bucket = self.bucket_of(key);
        let node = ptr.cast::<Node<K::Stored, V>>();
        unsafe {
            node.as_ptr().write(Node {
                next: self.head(bucket),
                key: stored,
                value,
            })
        };
        self.buckets.set(bucket, Some(Link { allocation, node }));
        self.len += 1;
        Ok(None)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|node| unsafe { &(*node.as_ptr()).value })
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key).map(|node| unsafe { &mut (*node.as_ptr()).value })
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Unlinks the entry for `key` and frees its node.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let bucket = self.bucket_of(key);
        let mut prev: Option<NonNull<Node<K::Stored, V>>> = None;
        let mut current = self.head(bucket);
        while let Some(link) = current {
            let node = unsafe { link.node.as_ptr().read() };
            if key.matches(&node.key) {
                match prev {
                    None => {
                        self.buckets.set(bucket, node.next);
                    },
                    Some(mut prev) => unsafe { prev.as_mut().next = node.next },
                }
                K::release(node.key, self.arena);
                self.arena.free(link.allocation);
                self.len -= 1;
                return Some(node.value);
            }
            prev = Some(link.node);
            current = node.next;
        }
        None
    }

    /// Frees every entry, keeping the buckets.
    pub fn clear(&mut self) {
        for bucket in 0..self.buckets.len() {
            let mut current = self.head(bucket);
            while let Some(link) = current {
                let node = unsafe { link.node.as_ptr().read() };
                K::release(node.key, self.arena);
                self.arena.free(link.allocation);
                current = node.next;
            }
            self.buckets.set(bucket, None);
        }
        self.len = 0;
    }

    /// Visits entries bucket by bucket.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.as_slice().iter(),
            current: None,
            _marker: PhantomData,
        }
    }
}

impl<'a, K, V, B: Backend> Drop for HashTable<'a, K, V, B> where K: TableKey + ?Sized, V: Copy {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'a, K, V, B: Backend> std::fmt::Debug for HashTable<'a, K, V, B>
    where K: TableKey + std::fmt::Debug + ?Sized, V: Copy + std::fmt::Debug
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct Iter<'s, K, V> where K: TableKey + ?Sized {
    buckets: std::slice::Iter<'s, Bucket<K::Stored, V>>,
    current: Bucket<K::Stored, V>,
    _marker: PhantomData<&'s K>,
}

impl<'s, K, V: 's> Iterator for Iter<'s, K, V> where K: TableKey + ?Sized + 's {
    type Item = (&'s K, &'s V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(link) = self.current {
                let node: &'s Node<K::Stored, V> = unsafe { &*link.node.as_ptr() };
                self.current = node.next;
                return Some((K::view(&node.key), &node.value));
            }
            self.current = *self.buckets.next()?;
        }
    }
}

#[cfg(test)]
mod hash_tests {
    use crate::{Arena, ArenaBuilder, HashTable};
    use crate::arena::arena_tests::assert_capacity_invariant;

    #[test]
    fn string_keys() {
        let arena = Arena::new();
        let mut table = HashTable::<str, i32>::with_capacity(&arena, 8).unwrap();
        table.insert("foo", 8).unwrap();
        table.insert("bar", 6).unwrap();
        table.insert("foobar", 24).unwrap();

        assert_eq!(3, table.len());
        assert_eq!(Some(&8), table.get("foo"));
        assert_eq!(Some(&6), table.get("bar"));
        assert_eq!(Some(&24), table.get("foobar"));

        assert_eq!(Some(8), table.remove("foo"));
        assert_eq!(2, table.len());
        assert_eq!(None, table.get("foo"));
        assert_eq!(None, table.remove("foo"));
    }

    #[test]
    fn integer_keys_store_squares() {
        let arena = Arena::new();
        let mut table = HashTable::<u32, u32>::with_capacity(&arena, 8).unwrap();
        for i in 1..=120 {
            table.insert(&i, i * i).unwrap();
        }
        assert_eq!(120, table.len());
        for &i in &[4, 27, 50, 73, 111] {
            assert_eq!(Some(&(i * i)), table.get(&i), "key {}", i);
        }
    }

    #[test]
    fn insert_replaces_existing_value() {
        let arena = Arena::new();
        let mut table = HashTable::<str, u8>::new(&arena).unwrap();
        assert_eq!(None, table.insert("key", 1).unwrap());
        assert_eq!(Some(1), table.insert("key", 2).unwrap());
        assert_eq!(1, table.len());
        assert_eq!(Some(&2), table.get("key"));
    }

    #[test]
    fn capacity_is_rounded_up_to_eight() {
        let arena = Arena::new();
        let table = HashTable::<u32, u32>::with_capacity(&arena, 5).unwrap();
        assert_eq!(8, table.bucket_count());
    }

    #[test]
    fn integer_hash_is_seed_xor_key() {
        let arena = Arena::new();
        let mut table = HashTable::<u32, u32>::with_seed(&arena, 8, 1).unwrap();
        // 1 ^ 3 == 2, 1 ^ 10 == 11 and 11 % 8 == 3
        table.insert(&3, 0).unwrap();
        table.insert(&10, 0).unwrap();
        assert_eq!(2, table.bucket_of(&3));
        assert_eq!(3, table.bucket_of(&10));
    }

    #[test]
    fn string_hash_is_seeded_djb2() {
        use super::TableKey;
        assert_eq!(5381u32.wrapping_mul(33).wrapping_add(b'a' as u32), "a".hash_with(5381));
        assert_eq!(7, "".hash_with(7));
    }

    #[test]
    fn removes_from_anywhere_in_chain() {
        let arena = Arena::new();
        // with seed 1 every multiple of 8 lands in bucket 1
        let mut table = HashTable::<u32, u32>::with_seed(&arena, 1, 1).unwrap();
        for i in 0..8 {
            table.insert(&(i * 8), i).unwrap();
        }
        assert_eq!(Some(0), table.remove(&0), "tail");
        assert_eq!(Some(7), table.remove(&56), "head");
        assert_eq!(Some(3), table.remove(&24), "middle");
        let mut keys = table.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        keys.sort();
        assert_eq!(vec![8, 16, 32, 40, 48], keys);
        assert!(table.contains_key(&40));
        assert!(!table.contains_key(&24));
    }

    #[test]
    fn iterates_every_entry() {
        let arena = Arena::new();
        let mut table = HashTable::<str, usize>::new(&arena).unwrap();
        for word in &["one", "two", "three", "four"] {
            table.insert(word, word.len()).unwrap();
        }
        let mut entries = table.iter().map(|(k, v)| (k.to_string(), *v)).collect::<Vec<_>>();
        entries.sort();
        assert_eq!(
            vec![("four".to_string(), 4), ("one".to_string(), 3), ("three".to_string(), 5), ("two".to_string(), 3)],
            entries
        );
    }

    #[test]
    fn dropping_frees_nodes_keys_and_buckets() {
        let arena = ArenaBuilder::new().chunk_capacity(4096).build();
        {
            let mut table = HashTable::<str, u64>::with_capacity(&arena, 16).unwrap();
            for (i, word) in ["alpha", "beta", "gamma"].iter().enumerate() {
                table.insert(word, i as u64).unwrap();
            }
            table.remove("beta");
            assert_capacity_invariant(&arena);
        }
        assert!(arena.chunk_stats().iter().all(|stats| stats.used == 0));
        assert_capacity_invariant(&arena);
    }

    #[test]
    fn word_frequencies() {
        let arena = Arena::new();
        let mut counts = HashTable::<str, u32>::new(&arena).unwrap();
        for word in "the cat and the hat and the bat".split_whitespace() {
            let count = counts.get(word).copied().unwrap_or(0);
            counts.insert(word, count + 1).unwrap();
        }
        assert_eq!(Some(&3), counts.get("the"));
        assert_eq!(Some(&2), counts.get("and"));
        assert_eq!(Some(&1), counts.get("bat"));
        assert_eq!(5, counts.len());
    }
}
