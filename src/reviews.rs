//! Fixed-stride attributes of each review (score, helpfulness, length)

use std::{
    fs::File,
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::{
    base::{IndexError, IoContext, Result, ReviewId},
    corpus::Helpfulness,
};

pub const SCORES_FILE: &str = "scores.bin";
pub const HELPFULNESS_FILE: &str = "helpfulness.bin";
pub const LENGTHS_FILE: &str = "reviewLengths.bin";

const SCORE_STRIDE: usize = 1;
const HELPFULNESS_STRIDE: usize = 4;
const LENGTH_STRIDE: usize = 4;

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::options()
        .write(true)
        .truncate(true)
        .create(true)
        .open(path)
        .context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Appends one record per review to the attribute files
pub struct AttributeWriter {
    folder: PathBuf,
    scores: BufWriter<File>,
    helpfulness: BufWriter<File>,
    lengths: BufWriter<File>,
    count: u32,
}

impl AttributeWriter {
    pub fn create(folder: &Path) -> Result<Self> {
        Ok(Self {
            folder: folder.to_path_buf(),
            scores: create(&folder.join(SCORES_FILE))?,
            helpfulness: create(&folder.join(HELPFULNESS_FILE))?,
            lengths: create(&folder.join(LENGTHS_FILE))?,
            count: 0,
        })
    }

    pub fn append(&mut self, score: u8, helpfulness: Helpfulness, length: u32) -> Result<()> {
        let folder = &self.folder;
        self.scores
            .write_u8(score)
            .context(|| format!("writing {}", folder.join(SCORES_FILE).display()))?;
        let mut record = [0u8; HELPFULNESS_STRIDE];
        BigEndian::write_u16(&mut record[0..2], helpfulness.numerator);
        BigEndian::write_u16(&mut record[2..4], helpfulness.denominator);
        self.helpfulness
            .write_all(&record)
            .context(|| format!("writing {}", folder.join(HELPFULNESS_FILE).display()))?;
        self.lengths
            .write_u32::<BigEndian>(length)
            .context(|| format!("writing {}", folder.join(LENGTHS_FILE).display()))?;
        self.count += 1;
        Ok(())
    }

    /// Flushes the files, returning the number of records
    pub fn finish(mut self) -> Result<u32> {
        for (writer, name) in [
            (&mut self.scores, SCORES_FILE),
            (&mut self.helpfulness, HELPFULNESS_FILE),
            (&mut self.lengths, LENGTHS_FILE),
        ] {
            writer
                .flush()
                .context(|| format!("writing {}", self.folder.join(name).display()))?;
        }
        Ok(self.count)
    }
}

/// Reads review attributes, opening the file for each request
pub struct AttributeStore {
    folder: PathBuf,
}

impl AttributeStore {
    pub fn open(folder: &Path) -> Result<Self> {
        for name in [SCORES_FILE, HELPFULNESS_FILE, LENGTHS_FILE] {
            let path = folder.join(name);
            if !path.is_file() {
                return Err(IndexError::io(
                    format!("opening {}", path.display()),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
        }
        Ok(Self {
            folder: folder.to_path_buf(),
        })
    }

    fn read_record<const N: usize>(&self, name: &str, review_id: ReviewId) -> Result<[u8; N]> {
        if review_id == 0 {
            return Err(IndexError::invalid_arg("review id", "ids start at 1"));
        }
        let path = self.folder.join(name);
        let position = (review_id as u64 - 1) * N as u64;

        let mut file = File::options()
            .read(true)
            .open(&path)
            .context(|| format!("opening {}", path.display()))?;
        file.seek(SeekFrom::Start(position))
            .context(|| format!("seeking to {} in {}", position, path.display()))?;

        let mut record = [0u8; N];
        file.read_exact(&mut record)
            .context(|| format!("reading review {} in {}", review_id, path.display()))?;
        Ok(record)
    }

    pub fn score(&self, review_id: ReviewId) -> Result<u8> {
        let [score] = self.read_record::<SCORE_STRIDE>(SCORES_FILE, review_id)?;
        Ok(score)
    }

    pub fn helpfulness(&self, review_id: ReviewId) -> Result<Helpfulness> {
        let record = self.read_record::<HELPFULNESS_STRIDE>(HELPFULNESS_FILE, review_id)?;
        Ok(Helpfulness {
            numerator: BigEndian::read_u16(&record[0..2]),
            denominator: BigEndian::read_u16(&record[2..4]),
        })
    }

    /// Number of tokens of the review
    pub fn length(&self, review_id: ReviewId) -> Result<u32> {
        let record = self.read_record::<LENGTH_STRIDE>(LENGTHS_FILE, review_id)?;
        Ok(BigEndian::read_u32(&record))
    }
}
