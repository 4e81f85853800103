use crate::backend::Backend;
use crate::error::FileError;
use crate::{Arena, ArenaStr};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Reads a whole UTF-8 file into arena memory.
///
/// On any failure the allocation made for the contents is freed again.
pub fn read_to_arena<'a, B: Backend, P: AsRef<Path>>(arena: &'a Arena<B>, path: P) -> Result<ArenaStr<'a, B>, FileError> {
    let mut file = File::open(path.as_ref())?;
    let len = file.metadata()?.len() as usize;
    let (allocation, first) = arena.allocate_raw(len.max(1))?;
    let contents = unsafe { std::slice::from_raw_parts_mut(first.as_ptr(), len) };

    let loaded = match file.read_exact(contents) {
        Ok(()) => std::str::from_utf8(contents).map(|_| ()).map_err(FileError::from),
        Err(e) => Err(FileError::from(e)),
    };
    if let Err(e) = loaded {
        arena.free(allocation);
        return Err(e);
    }

    debug!("read {} bytes from {}", len, path.as_ref().display());
    Ok(unsafe { ArenaStr::from_raw_parts(arena, allocation, first, len) })
}

/// Writes the string to `path`, replacing any existing file.
pub fn write_from_arena<B: Backend, P: AsRef<Path>>(contents: &ArenaStr<'_, B>, path: P) -> Result<(), FileError> {
    let mut file = File::create(path.as_ref())?;
    file.write_all(contents.as_str().as_bytes())?;
    file.flush()?;
    debug!("wrote {} bytes to {}", contents.len(), path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod fs_tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeting.txt");
        let arena = Arena::new();

        let greeting = ArenaStr::from_str(&arena, "Hello, file!\nSecond line").unwrap();
        write_from_arena(&greeting, &path).unwrap();
        assert_eq!("Hello, file!\nSecond line", std::fs::read_to_string(&path).unwrap());

        let loaded = read_to_arena(&arena, &path).unwrap();
        assert_eq!(greeting, loaded);
    }

    #[test]
    fn empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let arena = Arena::new();
        let loaded = read_to_arena(&arena, file.path()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let arena = Arena::new();
        match read_to_arena(&arena, dir.path().join("missing.txt")) {
            Err(FileError::Io(_)) => {},
            other => panic!("expected io error, got {:?}", other.map(|s| s.to_string())),
        }
        assert!(arena.is_empty());
    }

    #[test]
    fn invalid_utf8_frees_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'o', b'k', 0xff, 0xfe]).unwrap();
        let arena = Arena::new();
        match read_to_arena(&arena, file.path()) {
            Err(FileError::NotUtf8(_)) => {},
            other => panic!("expected utf-8 error, got {:?}", other.map(|s| s.to_string())),
        }
        assert_eq!(0, arena.chunk_stats()[0].used);
    }
}
