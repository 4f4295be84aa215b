//! Block front-coded dictionaries
//!
//! Keys are sorted and split into blocks of `K` entries. The first key of
//! each block is stored whole in the atom store, the following ones only
//! store the suffix they do not share with their predecessor. Front coding
//! restarts at every block: a block start never refers to the previous
//! block, whatever shared-prefix length was recorded for it on disk.

use std::{borrow::Cow, marker::PhantomData, path::Path};

use log::debug;

use crate::base::{IndexError, Len, Result};

pub mod builder;
pub mod files;

pub use builder::{DictionaryBuilder, SerializedDictionary};
pub use files::{DictionaryFiles, PRODUCT_FILES, TERM_FILES};

/// How keys are normalized before being searched
pub trait KeyPolicy: Send + Sync + 'static {
    fn normalize(key: &str) -> Cow<'_, str>;
}

/// Keys are compared in lowercase (terms)
pub struct CaseFolded;

impl KeyPolicy for CaseFolded {
    fn normalize(key: &str) -> Cow<'_, str> {
        if key.chars().any(char::is_uppercase) {
            Cow::Owned(key.to_lowercase())
        } else {
            Cow::Borrowed(key)
        }
    }
}

/// Keys are compared as given (product IDs)
pub struct CaseSensitive;

impl KeyPolicy for CaseSensitive {
    fn normalize(key: &str) -> Cow<'_, str> {
        Cow::Borrowed(key)
    }
}

/// A dictionary entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DictionaryEntry {
    /// Length (in bytes) of the full key
    pub key_len: u32,
    /// Length of the prefix shared with the previous key (0 for block starts)
    pub prefix_len: u32,
    /// Position of the stored suffix within the atom store
    pub suffix_offset: u32,
    /// Start of the entry's postings in the posting file
    pub posting_offset: u32,
}

impl DictionaryEntry {
    #[inline]
    fn suffix_len(&self) -> usize {
        (self.key_len - self.prefix_len) as usize
    }
}

pub struct FrontCodedDictionary<P: KeyPolicy> {
    block_size: usize,
    entries: Vec<DictionaryEntry>,
    /// Atom store offset of the first key of each block
    block_starts: Vec<u32>,
    atoms: Vec<u8>,
    _policy: PhantomData<fn() -> P>,
}

pub type TermDictionary = FrontCodedDictionary<CaseFolded>;
pub type ProductDictionary = FrontCodedDictionary<CaseSensitive>;

impl<P: KeyPolicy> FrontCodedDictionary<P> {
    /// Builds the in-memory dictionary from its serialized form, checking
    /// that all the parts are consistent
    pub fn open(serialized: SerializedDictionary) -> Result<Self> {
        let SerializedDictionary {
            block_size,
            sizes,
            block_starts,
            positions,
            atoms,
            locations,
        } = serialized;

        let invalid = |message: String| IndexError::format("front-coded dictionary", message);

        if block_size == 0 {
            return Err(IndexError::invalid_arg("block size", "should be at least 1"));
        }
        if positions.len() != sizes.len() {
            return Err(invalid(format!(
                "{} sizes but {} posting positions",
                sizes.len(),
                positions.len()
            )));
        }
        let num_blocks = sizes.len().div_ceil(block_size);
        if block_starts.len() != num_blocks {
            return Err(invalid(format!(
                "{} block pointers for {} entries with K={}",
                block_starts.len(),
                sizes.len(),
                block_size
            )));
        }

        let mut entries = Vec::with_capacity(sizes.len());
        let mut offset: u64 = 0;
        let mut previous_len = 0;

        for (ix, (&(key_len, mut prefix_len), &posting_offset)) in
            sizes.iter().zip(positions.iter()).enumerate()
        {
            if ix % block_size == 0 {
                if block_starts[ix / block_size] as u64 != offset {
                    return Err(invalid(format!(
                        "block {} starts at {}, expected {}",
                        ix / block_size,
                        block_starts[ix / block_size],
                        offset
                    )));
                }
                if prefix_len != 0 {
                    debug!(
                        "Ignoring shared prefix {} of block start entry {}",
                        prefix_len, ix
                    );
                    prefix_len = 0;
                }
            } else if prefix_len > key_len || prefix_len > previous_len {
                return Err(invalid(format!(
                    "entry {} shares {} bytes but has length {} (previous {})",
                    ix, prefix_len, key_len, previous_len
                )));
            }

            if let Some(previous) = entries.last().map(|e: &DictionaryEntry| e.posting_offset) {
                if posting_offset < previous {
                    return Err(invalid(format!(
                        "posting offset of entry {} ({}) is before the previous one ({})",
                        ix, posting_offset, previous
                    )));
                }
            }

            let entry = DictionaryEntry {
                key_len,
                prefix_len,
                suffix_offset: offset as u32,
                posting_offset,
            };
            offset += entry.suffix_len() as u64;
            if offset > atoms.len() as u64 {
                return Err(invalid(format!(
                    "entry {} ends at {}, beyond the atom store ({} bytes)",
                    ix,
                    offset,
                    atoms.len()
                )));
            }
            previous_len = key_len;
            entries.push(entry);
        }

        if offset != atoms.len() as u64 {
            return Err(invalid(format!(
                "atom store has {} bytes, entries use {}",
                atoms.len(),
                offset
            )));
        }

        if let Some(locations) = locations {
            if locations.len() != entries.len() {
                return Err(invalid(format!(
                    "{} key locations for {} entries",
                    locations.len(),
                    entries.len()
                )));
            }
            if let Some(ix) = entries
                .iter()
                .zip(locations.iter())
                .position(|(entry, &location)| entry.suffix_offset != location)
            {
                return Err(invalid(format!(
                    "key location of entry {} is {}, expected {}",
                    ix, locations[ix], entries[ix].suffix_offset
                )));
            }
        }

        Ok(Self {
            block_size,
            entries,
            block_starts,
            atoms,
            _policy: PhantomData,
        })
    }

    /// Loads a dictionary from its files, returning it with the extra
    /// header values stored after the entry count
    pub fn load(
        folder: &Path,
        files: &DictionaryFiles,
        header_len: usize,
        block_size: usize,
    ) -> Result<(Self, Vec<u32>)> {
        let (serialized, header) =
            SerializedDictionary::load(folder, files, header_len, block_size)?;
        Ok((Self::open(serialized)?, header))
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.block_starts.len()
    }

    pub fn entry(&self, index: usize) -> Option<&DictionaryEntry> {
        self.entries.get(index)
    }

    /// Position of the entry's postings
    pub fn posting_offset(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|e| e.posting_offset as u64)
    }

    /// Byte range of the entry's postings; the end is `None` for the last
    /// entry (postings run up to the end of the file)
    pub fn posting_range(&self, index: usize) -> Option<(u64, Option<u64>)> {
        let start = self.posting_offset(index)?;
        Some((start, self.posting_offset(index + 1)))
    }

    #[inline]
    fn suffix(&self, index: usize) -> &[u8] {
        let entry = &self.entries[index];
        let start = entry.suffix_offset as usize;
        &self.atoms[start..start + entry.suffix_len()]
    }

    /// Whole first key of a block
    #[inline]
    fn block_key(&self, block: usize) -> &[u8] {
        let start = self.block_starts[block] as usize;
        let len = self.entries[block * self.block_size].key_len as usize;
        &self.atoms[start..start + len]
    }

    /// Index of `key`, if present
    pub fn lookup(&self, key: &str) -> Option<usize> {
        let key = P::normalize(key);
        self.find(key.as_bytes())
    }

    /// Binary search on block start keys, then a scan of the candidate
    /// block
    fn find(&self, key: &[u8]) -> Option<usize> {
        if self.block_starts.is_empty() {
            return None;
        }

        let (mut left, mut right) = (0, self.block_starts.len() - 1);
        loop {
            if left == right {
                return if key == self.block_key(left) {
                    Some(left * self.block_size)
                } else {
                    self.scan_block(left, key)
                };
            }

            let middle = left + (right - left) / 2;
            match key.cmp(self.block_key(middle)) {
                std::cmp::Ordering::Equal => return Some(middle * self.block_size),
                std::cmp::Ordering::Less => {
                    if middle == left {
                        return None;
                    }
                    right = middle - 1;
                }
                std::cmp::Ordering::Greater => {
                    if key < self.block_key(middle + 1) {
                        return self.scan_block(middle, key);
                    }
                    left = middle + 1;
                }
            }
        }
    }

    /// Linear search within a block, rebuilding each key from the previous
    fn scan_block(&self, block: usize, key: &[u8]) -> Option<usize> {
        let start = block * self.block_size;
        let end = (start + self.block_size).min(self.entries.len());

        let mut previous = self.block_key(block).to_vec();
        for ix in (start + 1)..end {
            previous.truncate(self.entries[ix].prefix_len as usize);
            previous.extend_from_slice(self.suffix(ix));
            if previous == key {
                return Some(ix);
            }
        }
        None
    }

    /// Rebuilds the key of an entry by following the shared prefixes
    /// backward; the walk stops at the block start at the latest
    pub fn key_bytes_at(&self, index: usize) -> Option<Vec<u8>> {
        let entry = self.entries.get(index)?;
        let block_start = index - index % self.block_size;

        let mut missing = entry.prefix_len as usize;
        let mut parts: Vec<&[u8]> = vec![self.suffix(index)];
        let mut ix = index;
        while missing > 0 && ix > block_start {
            ix -= 1;
            let previous = &self.entries[ix];
            let shared = previous.prefix_len as usize;
            if missing > shared {
                let suffix = self.suffix(ix);
                parts.push(&suffix[..missing - shared]);
                missing = shared;
            }
        }
        debug_assert_eq!(missing, 0, "prefix chain of {} is broken", index);

        let mut key = Vec::with_capacity(entry.key_len as usize);
        for part in parts.iter().rev() {
            key.extend_from_slice(part);
        }
        Some(key)
    }

    /// Rebuilds the key of an entry
    pub fn key_at(&self, index: usize) -> Result<Option<String>> {
        match self.key_bytes_at(index) {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                IndexError::format(format!("key {}", index), e.to_string())
            }),
            None => Ok(None),
        }
    }

    /// Iterates over all the keys in order
    pub fn keys(&self) -> Keys<'_, P> {
        Keys {
            dictionary: self,
            index: 0,
            current: Vec::new(),
        }
    }
}

impl<P: KeyPolicy> Len for FrontCodedDictionary<P> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Forward iterator over the keys of a dictionary
pub struct Keys<'a, P: KeyPolicy> {
    dictionary: &'a FrontCodedDictionary<P>,
    index: usize,
    current: Vec<u8>,
}

impl<'a, P: KeyPolicy> Iterator for Keys<'a, P> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.dictionary.entries.get(self.index)?;
        self.current.truncate(entry.prefix_len as usize);
        self.current.extend_from_slice(self.dictionary.suffix(self.index));
        self.index += 1;
        Some(self.current.clone())
    }
}
