//! On-disk layout of a dictionary
//!
//! All integers are big-endian 32-bit values:
//!
//! - info blocks: entry count, extra header values, then one atom store
//!   offset per block
//! - sizes: key length and shared prefix length of each entry
//! - positions: posting offset of each entry
//! - atoms: the atom store bytes
//! - locations (optional): atom store offset of each entry

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::debug;

use super::SerializedDictionary;
use crate::base::{IndexError, IoContext, Result};

/// Names of the files holding a dictionary
pub struct DictionaryFiles {
    pub info_blocks: &'static str,
    pub sizes: &'static str,
    pub positions: &'static str,
    pub atoms: &'static str,
    pub locations: Option<&'static str>,
}

pub const TERM_FILES: DictionaryFiles = DictionaryFiles {
    info_blocks: "infoBlocks.bin",
    sizes: "sizes.bin",
    positions: "positions.bin",
    atoms: "longString.txt",
    locations: None,
};

pub const PRODUCT_FILES: DictionaryFiles = DictionaryFiles {
    info_blocks: "infoBlocksProduct.bin",
    sizes: "sizesProduct.bin",
    positions: "positionsProduct.bin",
    atoms: "longStringProduct.txt",
    locations: Some("locationsLongString.bin"),
};

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::options()
        .write(true)
        .truncate(true)
        .create(true)
        .open(path)
        .context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_u32s(path: &Path, values: impl IntoIterator<Item = u32>) -> Result<()> {
    let mut writer = create(path)?;
    for value in values {
        writer
            .write_u32::<BigEndian>(value)
            .context(|| format!("writing {}", path.display()))?;
    }
    writer
        .flush()
        .context(|| format!("writing {}", path.display()))
}

fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::options()
        .read(true)
        .open(path)
        .context(|| format!("opening {}", path.display()))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .context(|| format!("reading {}", path.display()))?;
    Ok(data)
}

fn read_u32s(path: &Path) -> Result<Vec<u32>> {
    let data = read_all(path)?;
    if data.len() % 4 != 0 {
        return Err(IndexError::format(
            path.display().to_string(),
            format!("{} bytes is not a multiple of 4", data.len()),
        ));
    }
    Ok(data.chunks_exact(4).map(BigEndian::read_u32).collect())
}

fn expect_len(path: &Path, found: usize, expected: usize) -> Result<()> {
    if found != expected {
        return Err(IndexError::format(
            path.display().to_string(),
            format!("expected {} values, found {}", expected, found),
        ));
    }
    Ok(())
}

impl SerializedDictionary {
    /// Writes the dictionary files; `header` values are stored after the
    /// entry count in the info blocks file
    pub fn save(&self, folder: &Path, files: &DictionaryFiles, header: &[u32]) -> Result<()> {
        let count = u32::try_from(self.sizes.len())
            .map_err(|_| IndexError::invalid_arg("dictionary", "too many entries"))?;

        debug!(
            "Writing dictionary {} ({} entries, {} blocks, {} atom bytes)",
            files.atoms,
            count,
            self.block_starts.len(),
            self.atoms.len()
        );

        write_u32s(
            &folder.join(files.info_blocks),
            std::iter::once(count)
                .chain(header.iter().copied())
                .chain(self.block_starts.iter().copied()),
        )?;
        write_u32s(
            &folder.join(files.sizes),
            self.sizes.iter().flat_map(|&(len, prefix)| [len, prefix]),
        )?;
        write_u32s(&folder.join(files.positions), self.positions.iter().copied())?;

        let atoms_path = folder.join(files.atoms);
        let mut atoms = create(&atoms_path)?;
        atoms
            .write_all(&self.atoms)
            .and_then(|_| atoms.flush())
            .context(|| format!("writing {}", atoms_path.display()))?;

        if let Some(name) = files.locations {
            let locations = self.locations.as_ref().ok_or_else(|| {
                IndexError::InvalidOperation(format!("no key locations to write in {}", name))
            })?;
            write_u32s(&folder.join(name), locations.iter().copied())?;
        }

        Ok(())
    }

    /// Reads the dictionary files, returning the dictionary and the
    /// `header_len` values following the entry count
    pub fn load(
        folder: &Path,
        files: &DictionaryFiles,
        header_len: usize,
        block_size: usize,
    ) -> Result<(Self, Vec<u32>)> {
        if block_size == 0 {
            return Err(IndexError::invalid_arg("block size", "should be at least 1"));
        }

        let info_path = folder.join(files.info_blocks);
        let info = read_u32s(&info_path)?;
        if info.len() < 1 + header_len {
            return Err(IndexError::format(
                info_path.display().to_string(),
                "truncated header",
            ));
        }
        let count = info[0] as usize;
        let header = info[1..1 + header_len].to_vec();
        let block_starts = info[1 + header_len..].to_vec();
        expect_len(&info_path, block_starts.len(), count.div_ceil(block_size))?;

        let sizes_path = folder.join(files.sizes);
        let sizes = read_u32s(&sizes_path)?;
        expect_len(&sizes_path, sizes.len(), 2 * count)?;

        let positions_path = folder.join(files.positions);
        let positions = read_u32s(&positions_path)?;
        expect_len(&positions_path, positions.len(), count)?;

        let atoms = read_all(&folder.join(files.atoms))?;

        let locations = match files.locations {
            Some(name) => {
                let path = folder.join(name);
                let locations = read_u32s(&path)?;
                expect_len(&path, locations.len(), count)?;
                Some(locations)
            }
            None => None,
        };

        debug!(
            "Read dictionary {} ({} entries, {} blocks)",
            files.atoms,
            count,
            block_starts.len()
        );

        Ok((
            Self {
                block_size,
                sizes: sizes.chunks_exact(2).map(|c| (c[0], c[1])).collect(),
                block_starts,
                positions,
                atoms,
                locations,
            },
            header,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{DictionaryBuilder, ProductDictionary, TermDictionary};
    use temp_dir::TempDir;

    fn serialized(keys: &[&str], block_size: usize) -> SerializedDictionary {
        let mut builder = DictionaryBuilder::new(block_size).unwrap();
        for (ix, key) in keys.iter().enumerate() {
            builder.push(key, 3 * ix as u32).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn product_files_round_trip() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let original = serialized(&["B0001", "B0002", "B0010", "C1"], 3);
        original.save(dir.path(), &PRODUCT_FILES, &[]).unwrap();

        // 1 count + 2 blocks
        let info = std::fs::read(dir.path().join("infoBlocksProduct.bin")).unwrap();
        assert_eq!(info, vec![0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 8]);

        let (loaded, header) =
            SerializedDictionary::load(dir.path(), &PRODUCT_FILES, 0, 3).unwrap();
        assert!(header.is_empty());
        assert_eq!(loaded, original);

        let dictionary = ProductDictionary::open(loaded).unwrap();
        assert_eq!(dictionary.lookup("B0010"), Some(2));
    }

    #[test]
    fn term_header() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let mut original = serialized(&["good", "product"], 24);
        original.save(dir.path(), &TERM_FILES, &[1, 3]).unwrap();
        assert!(!dir.path().join("locationsLongString.bin").exists());

        let (dictionary, header) = TermDictionary::load(dir.path(), &TERM_FILES, 2, 24).unwrap();
        assert_eq!(header, vec![1, 3]);
        assert_eq!(dictionary.lookup("product"), Some(1));

        original.locations = None;
        let (loaded, _) = SerializedDictionary::load(dir.path(), &TERM_FILES, 2, 24).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn wrong_block_size() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        serialized(&["a", "b", "c"], 2)
            .save(dir.path(), &PRODUCT_FILES, &[])
            .unwrap();
        assert!(SerializedDictionary::load(dir.path(), &PRODUCT_FILES, 0, 3).is_err());
        assert!(SerializedDictionary::load(dir.path(), &PRODUCT_FILES, 0, 2).is_ok());
    }

    #[test]
    fn truncated_sizes() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        serialized(&["a", "b"], 2)
            .save(dir.path(), &PRODUCT_FILES, &[])
            .unwrap();
        let sizes = dir.path().join("sizesProduct.bin");
        let data = std::fs::read(&sizes).unwrap();
        std::fs::write(&sizes, &data[..data.len() - 4]).unwrap();
        assert!(matches!(
            SerializedDictionary::load(dir.path(), &PRODUCT_FILES, 0, 2),
            Err(IndexError::Format { .. })
        ));
    }
}
