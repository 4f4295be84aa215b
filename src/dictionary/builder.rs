use crate::base::{IndexError, Result};

/// The parts of a front-coded dictionary, as stored on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedDictionary {
    pub block_size: usize,

    /// Key length and shared prefix length of each entry
    pub sizes: Vec<(u32, u32)>,

    /// Atom store offset of the first key of each block
    pub block_starts: Vec<u32>,

    /// Posting offset of each entry
    pub positions: Vec<u32>,

    /// Block start keys and suffixes
    pub atoms: Vec<u8>,

    /// Atom store offset of each entry's stored bytes (only kept on disk
    /// for product IDs)
    pub locations: Option<Vec<u32>>,
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Front-codes keys pushed in strictly increasing order
pub struct DictionaryBuilder {
    previous: Vec<u8>,
    serialized: SerializedDictionary,
}

impl DictionaryBuilder {
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(IndexError::invalid_arg("block size", "should be at least 1"));
        }
        Ok(Self {
            previous: Vec::new(),
            serialized: SerializedDictionary {
                block_size,
                sizes: Vec::new(),
                block_starts: Vec::new(),
                positions: Vec::new(),
                atoms: Vec::new(),
                locations: Some(Vec::new()),
            },
        })
    }

    pub fn len(&self) -> usize {
        self.serialized.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serialized.sizes.is_empty()
    }

    /// Adds the next key with the position of its postings
    pub fn push(&mut self, key: &str, posting_offset: u32) -> Result<()> {
        let key = key.as_bytes();
        let index = self.len();
        if index > 0 && key <= self.previous.as_slice() {
            return Err(IndexError::invalid_arg(
                "key",
                format!(
                    "{:?} does not follow {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(&self.previous)
                ),
            ));
        }

        let key_len = u32::try_from(key.len())
            .map_err(|_| IndexError::invalid_arg("key", "longer than 4GB"))?;
        let atom_offset = u32::try_from(self.serialized.atoms.len())
            .map_err(|_| IndexError::invalid_arg("atom store", "larger than 4GB"))?;

        let serialized = &mut self.serialized;
        let prefix_len = if index % serialized.block_size == 0 {
            serialized.block_starts.push(atom_offset);
            0
        } else {
            common_prefix_len(&self.previous, key)
        };

        serialized.atoms.extend_from_slice(&key[prefix_len..]);
        serialized.sizes.push((key_len, prefix_len as u32));
        serialized.positions.push(posting_offset);
        if let Some(locations) = serialized.locations.as_mut() {
            locations.push(atom_offset);
        }

        self.previous.clear();
        self.previous.extend_from_slice(key);
        Ok(())
    }

    pub fn finish(self) -> SerializedDictionary {
        self.serialized
    }
}
