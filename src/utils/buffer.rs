use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::base::{IndexError, IoContext, Result};

/// How posting files are accessed
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PostingAccess {
    /// Open, seek and read the file for each request
    #[default]
    File,
    /// Load the whole file in memory
    Memory,
    /// Memory-map the file
    Mmap,
}

pub trait Slice: Send + Sync {
    fn data(&'_ self) -> &'_ [u8];
}

struct MemorySlice<'a> {
    _data: &'a [u8],
}

impl Slice for MemorySlice<'_> {
    fn data(&'_ self) -> &'_ [u8] {
        self._data
    }
}

struct OwnedSlice {
    vector: Vec<u8>,
}

impl Slice for OwnedSlice {
    fn data(&'_ self) -> &'_ [u8] {
        &self.vector
    }
}

/// Byte container giving access to `[start, end)` or `[start, EOF)`
pub trait Buffer: Send + Sync {
    fn slice(&'_ self, start: u64, end: Option<u64>) -> Result<Box<dyn Slice + '_>>;
}

/// Opens a buffer for the given access mode
pub fn open_buffer(path: &Path, access: PostingAccess) -> Result<Box<dyn Buffer>> {
    Ok(match access {
        PostingAccess::File => Box::new(FileBuffer::new(path)?),
        PostingAccess::Memory => Box::new(MemoryBuffer::new(path)?),
        PostingAccess::Mmap => Box::new(MmapBuffer::new(path)?),
    })
}

fn check_range(len: usize, start: u64, end: Option<u64>) -> Result<Range<usize>> {
    let end = end.unwrap_or(len as u64);
    if start > end || end > len as u64 {
        return Err(IndexError::format(
            "posting range",
            format!("[{}, {}) is outside of a buffer of {} bytes", start, end, len),
        ));
    }
    Ok(start as usize..end as usize)
}

/// Reads the file on each request
pub struct FileBuffer {
    path: PathBuf,
}

impl FileBuffer {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(IndexError::io(
                format!("opening {}", path.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Buffer for FileBuffer {
    fn slice(&'_ self, start: u64, end: Option<u64>) -> Result<Box<dyn Slice + '_>> {
        let mut file = File::options()
            .read(true)
            .open(&self.path)
            .context(|| format!("opening {}", self.path.display()))?;
        let len = file
            .metadata()
            .context(|| format!("reading metadata of {}", self.path.display()))?
            .len();
        let range = check_range(len as usize, start, end)?;

        file.seek(SeekFrom::Start(start))
            .context(|| format!("seeking to {} in {}", start, self.path.display()))?;

        let mut vector = vec![0; range.len()];
        file.read_exact(&mut vector).context(|| {
            format!(
                "reading [{}, {}) in {}",
                range.start,
                range.end,
                self.path.display()
            )
        })?;

        Ok(Box::new(OwnedSlice { vector }))
    }
}

/// Stores the data in memory
pub struct MemoryBuffer {
    data: Vec<u8>,
}

impl MemoryBuffer {
    pub fn new(path: &Path) -> Result<Self> {
        let mut file = File::options()
            .read(true)
            .open(path)
            .context(|| format!("opening {}", path.display()))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .context(|| format!("reading {}", path.display()))?;

        Ok(Self { data })
    }
}

impl Buffer for MemoryBuffer {
    fn slice(&'_ self, start: u64, end: Option<u64>) -> Result<Box<dyn Slice + '_>> {
        let range = check_range(self.data.len(), start, end)?;
        Ok(Box::new(MemorySlice {
            _data: &self.data[range],
        }))
    }
}

/// Uses a memory map
pub struct MmapBuffer {
    // Empty files cannot be mapped
    mmap: Option<Mmap>,
}

impl MmapBuffer {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .open(path)
            .context(|| format!("opening {}", path.display()))?;
        let len = file
            .metadata()
            .context(|| format!("reading metadata of {}", path.display()))?
            .len();

        let mmap = if len == 0 {
            None
        } else {
            Some(
                unsafe { MmapOptions::new().map(&file) }
                    .context(|| format!("memory mapping {}", path.display()))?,
            )
        };
        Ok(Self { mmap })
    }
}

impl Buffer for MmapBuffer {
    fn slice(&'_ self, start: u64, end: Option<u64>) -> Result<Box<dyn Slice + '_>> {
        let data: &[u8] = match &self.mmap {
            Some(mmap) => &mmap[..],
            None => &[],
        };
        let range = check_range(data.len(), start, end)?;
        Ok(Box::new(MemorySlice {
            _data: &data[range],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use temp_dir::TempDir;

    #[rstest]
    #[case(PostingAccess::File)]
    #[case(PostingAccess::Memory)]
    #[case(PostingAccess::Mmap)]
    fn slices(#[case] access: PostingAccess) {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();

        let buffer = open_buffer(&path, access).unwrap();
        assert_eq!(buffer.slice(1, Some(3)).unwrap().data(), &[2, 3]);
        assert_eq!(buffer.slice(3, None).unwrap().data(), &[4, 5]);
        assert_eq!(buffer.slice(5, None).unwrap().data(), &[] as &[u8]);
        assert!(buffer.slice(2, Some(9)).is_err());
        assert!(buffer.slice(3, Some(2)).is_err());
        assert!(matches!(
            buffer.slice(9, None),
            Err(IndexError::Format { .. })
        ));
        assert!(matches!(
            buffer.slice(4, Some(1 << 32)),
            Err(IndexError::Format { .. })
        ));
    }

    #[rstest]
    #[case(PostingAccess::File)]
    #[case(PostingAccess::Memory)]
    #[case(PostingAccess::Mmap)]
    fn empty_file(#[case] access: PostingAccess) {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let buffer = open_buffer(&path, access).unwrap();
        assert!(buffer.slice(0, None).unwrap().data().is_empty());
    }

    #[test]
    fn missing_file() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        assert!(matches!(
            FileBuffer::new(&dir.path().join("nothing.bin")),
            Err(IndexError::Io { .. })
        ));
    }
}
