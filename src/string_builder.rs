use crate::backend::{Backend, HeapBackend};
use crate::error::{AllocError, BuilderError};
use crate::{Arena, ArenaStr, Array};

/// Starting capacity of [`StringBuilder::new`], in bytes.
pub const DEFAULT_BUILDER_CAPACITY: usize = 1024;

/// Assembles a string in arena memory by appending, prepending and inserting.
///
/// [`StringBuilder::flush`] copies the content into an [`ArenaStr`] and leaves the
/// builder empty, ready for the next string.
///
/// ```
/// use memfold::{Arena, StringBuilder};
///
/// let arena = Arena::new();
/// let mut sb = StringBuilder::new(&arena).unwrap();
/// sb.append("World").unwrap();
/// sb.push("Hello ").unwrap();
/// sb.append_char('!').unwrap();
/// assert_eq!("Hello World!", sb.flush().unwrap());
/// assert!(sb.is_empty());
/// ```
pub struct StringBuilder<'a, B: Backend = HeapBackend> {
    bytes: Array<'a, u8, B>,
}

impl<'a, B: Backend> StringBuilder<'a, B> {
    pub fn new(arena: &'a Arena<B>) -> Result<StringBuilder<'a, B>, AllocError> {
        StringBuilder::with_capacity(arena, DEFAULT_BUILDER_CAPACITY)
    }

    pub fn with_capacity(arena: &'a Arena<B>, capacity: usize) -> Result<StringBuilder<'a, B>, AllocError> {
        Ok(StringBuilder {
            bytes: Array::with_capacity(arena, capacity)?,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn as_str(&self) -> &str {
        unsafe { std::str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    pub fn append(&mut self, value: &str) -> Result<(), AllocError> {
        self.bytes.extend_from_slice(value.as_bytes())
    }

    pub fn append_char(&mut self, value: char) -> Result<(), AllocError> {
        self.append(value.encode_utf8(&mut [0; 4]))
    }

    /// Prepends `value`.
    pub fn push(&mut self, value: &str) -> Result<(), AllocError> {
        self.bytes.insert_from_slice(0, value.as_bytes())
    }

    pub fn push_char(&mut self, value: char) -> Result<(), AllocError> {
        self.push(value.encode_utf8(&mut [0; 4]))
    }

    /// Inserts `value` before the byte at `at`.
    pub fn insert(&mut self, value: &str, at: usize) -> Result<(), BuilderError> {
        if at > self.len() {
            return Err(BuilderError::OutOfBounds { at, len: self.len() });
        }
        if !self.as_str().is_char_boundary(at) {
            return Err(BuilderError::NotCharBoundary { at });
        }
        self.bytes.insert_from_slice(at, value.as_bytes())?;
        Ok(())
    }

    /// Reverses the content character by character.
    pub fn reverse(&mut self) {
        let bytes = self.bytes.as_mut_slice();
        bytes.reverse();
        // multi-byte sequences now end with their lead byte
        let mut start = 0;
        while start < bytes.len() {
            if is_continuation(bytes[start]) {
                let mut end = start;
                while end + 1 < bytes.len() && is_continuation(bytes[end]) {
                    end += 1;
                }
                bytes[start..=end].reverse();
                start = end + 1;
            } else {
                start += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Copies the content into a new [`ArenaStr`] and empties the builder.
    pub fn flush(&mut self) -> Result<ArenaStr<'a, B>, AllocError> {
        let flushed = ArenaStr::from_str(self.bytes.arena(), self.as_str())?;
        trace!("flushed {} bytes from string builder", flushed.len());
        self.bytes.clear();
        Ok(flushed)
    }
}

#[inline(always)]
fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

impl<'a, B: Backend> std::fmt::Debug for StringBuilder<'a, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<'a, B: Backend> std::fmt::Write for StringBuilder<'a, B> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.append(s).map_err(|_| std::fmt::Error)
    }
}

#[cfg(test)]
mod string_builder_tests {
    use crate::{Arena, StringBuilder};
    use crate::error::BuilderError;

    #[test]
    fn builds_reverses_and_flushes() {
        let arena = Arena::new();
        let mut sb = StringBuilder::with_capacity(&arena, 8).unwrap();

        sb.append("Hello ").unwrap();
        sb.append("World!").unwrap();
        sb.insert("to the ", 6).unwrap();
        sb.reverse();
        assert_eq!("!dlroW eht ot olleH", sb.flush().unwrap());

        sb.append(" will build the string.").unwrap();
        sb.push("Flushing the string builder").unwrap();
        sb.append_char('\n').unwrap();
        assert_eq!("Flushing the string builder will build the string.\n", sb.flush().unwrap());

        sb.push_char('Y').unwrap();
        sb.append("ou can re-use the same").unwrap();
        sb.append(" string builder after flush.").unwrap();
        assert_eq!("You can re-use the same string builder after flush.", sb.flush().unwrap());
    }

    #[test]
    fn default_capacity() {
        let arena = Arena::new();
        let sb = StringBuilder::new(&arena).unwrap();
        assert_eq!(1024, sb.capacity());
        assert!(sb.is_empty());
    }

    #[test]
    fn reverse_keeps_characters_intact() {
        let arena = Arena::new();
        let mut sb = StringBuilder::new(&arena).unwrap();
        sb.append("añb€c😀").unwrap();
        sb.reverse();
        assert_eq!("😀c€bña", sb.as_str());
    }

    #[test]
    fn insert_is_checked() {
        let arena = Arena::new();
        let mut sb = StringBuilder::new(&arena).unwrap();
        sb.append("ñ").unwrap();
        assert_eq!(Err(BuilderError::OutOfBounds { at: 3, len: 2 }), sb.insert("x", 3));
        assert_eq!(Err(BuilderError::NotCharBoundary { at: 1 }), sb.insert("x", 1));
        sb.insert("x", 2).unwrap();
        assert_eq!("ñx", sb.as_str());
    }

    #[test]
    fn flushed_string_outlives_builder() {
        let arena = Arena::new();
        let flushed = {
            let mut sb = StringBuilder::new(&arena).unwrap();
            sb.append("kept").unwrap();
            sb.flush().unwrap()
        };
        assert_eq!("kept", flushed);
    }

    #[test]
    fn formats_into_builder() {
        use std::fmt::Write;

        let arena = Arena::new();
        let mut sb = StringBuilder::new(&arena).unwrap();
        write!(sb, "{}-{}", 4, "two").unwrap();
        assert_eq!("4-two", sb.as_str());
    }
}
