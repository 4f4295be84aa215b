//! Compressed on-disk inverted index over product reviews
//!
//! Terms and product IDs are kept in block front-coded dictionaries, and
//! posting lists are stored as gaps using a byte-aligned gamma code.

pub mod base;
pub mod builder;
pub mod compress;
pub mod corpus;
pub mod dictionary;
pub mod reader;
pub mod reviews;

pub mod utils {
    pub mod buffer;
}
