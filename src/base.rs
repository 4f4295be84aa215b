use std::fmt;
use std::{fs::File, path::Path};

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ReviewId = u32;

pub const INDEX_CBOR: &str = "index.cbor";
pub const TERM_POSTINGS_FILE: &str = "postingLists.bin";
pub const FREQUENCIES_FILE: &str = "frequencies.bin";
pub const PRODUCT_POSTINGS_FILE: &str = "productPosting.bin";

/// Default block size of the term dictionary
pub const TERM_BLOCK_SIZE: usize = 24;

/// Default block size of the product dictionary
pub const PRODUCT_BLOCK_SIZE: usize = 6;

/// Marks object that have a length
pub trait Len {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Posting of a term = review ID + number of occurrences in the review
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Posting {
    pub review_id: ReviewId,
    pub frequency: u32,
}

impl std::fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.review_id, self.frequency)
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid format for {context}: {message}")]
    Format { context: String, message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("index information error: {0}")]
    Cbor(String),
}

impl IndexError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        IndexError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        IndexError::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Self {
        IndexError::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Adds a context to I/O results
pub(crate) trait IoContext<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| IndexError::io(context(), e))
    }
}

/// Options stored alongside the index files
#[derive(Derivative, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[derivative(Default)]
pub struct IndexOptions {
    /// Number of terms per front-coding block
    #[derivative(Default(value = "TERM_BLOCK_SIZE"))]
    pub term_block_size: usize,

    /// Number of product IDs per front-coding block
    #[derivative(Default(value = "PRODUCT_BLOCK_SIZE"))]
    pub product_block_size: usize,
}

/// Loads the index options, falling back to the default block sizes when
/// the folder has no information file
pub fn load_options(path: &Path) -> Result<IndexOptions> {
    let info_path = path.join(INDEX_CBOR);
    if !info_path.exists() {
        log::debug!(
            "No {} in {}, using default block sizes",
            INDEX_CBOR,
            path.display()
        );
        return Ok(IndexOptions::default());
    }

    let info_file = File::options()
        .read(true)
        .open(&info_path)
        .context(|| format!("opening {}", info_path.display()))?;

    ciborium::de::from_reader(info_file).map_err(|e| IndexError::Cbor(e.to_string()))
}

pub fn save_options(options: &IndexOptions, path: &Path) -> Result<()> {
    let info_path = path.join(INDEX_CBOR);

    let info_file = File::options()
        .write(true)
        .truncate(true)
        .create(true)
        .open(&info_path)
        .context(|| format!("creating {}", info_path.display()))?;

    ciborium::ser::into_writer(options, info_file).map_err(|e| IndexError::Cbor(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn options_default_when_missing() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let options = load_options(dir.path()).expect("loading options");
        assert_eq!(options, IndexOptions::default());
        assert_eq!(options.term_block_size, 24);
        assert_eq!(options.product_block_size, 6);
    }

    #[test]
    fn options_round_trip() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let options = IndexOptions {
            term_block_size: 3,
            product_block_size: 2,
        };
        save_options(&options, dir.path()).expect("saving options");
        assert_eq!(load_options(dir.path()).expect("loading options"), options);
    }
}
