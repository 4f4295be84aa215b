//! Gap-encoded posting lists
//!
//! Term postings are stored as `[gap][freq][gap][freq]...` and product
//! postings as `[gap][gap]...`, every value being a byte-aligned gamma
//! code. The first gap is relative to 0.

use std::path::Path;

use log::debug;

use super::{decode_sequence, encode_into};
use crate::{
    base::{IndexError, Posting, Result, ReviewId},
    utils::buffer::{open_buffer, Buffer, PostingAccess},
};

/// Converts a strictly increasing sequence into gaps
pub fn gaps(ids: impl IntoIterator<Item = ReviewId>) -> Result<Vec<u32>> {
    let mut previous = 0;
    ids.into_iter()
        .map(|id| {
            if id <= previous {
                return Err(IndexError::invalid_arg(
                    "review ids",
                    format!("{} follows {}, ids must be strictly increasing", id, previous),
                ));
            }
            let gap = id - previous;
            previous = id;
            Ok(gap)
        })
        .collect()
}

/// Encodes the postings of a term, returning the bytes and the total
/// frequency of the term
pub fn encode_term_postings(postings: &[(ReviewId, u32)]) -> Result<(Vec<u8>, u32)> {
    let gaps = gaps(postings.iter().map(|(id, _)| *id))?;

    let mut out = Vec::with_capacity(4 * postings.len());
    let mut total: u32 = 0;
    for (gap, (_, frequency)) in gaps.into_iter().zip(postings) {
        encode_into(gap, &mut out)?;
        encode_into(*frequency, &mut out)?;
        total = total.checked_add(*frequency).ok_or_else(|| {
            IndexError::invalid_arg("frequency", "total frequency overflows 32 bits")
        })?;
    }
    Ok((out, total))
}

/// Encodes the review IDs of a product
pub fn encode_product_postings(ids: &[ReviewId]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2 * ids.len());
    for gap in gaps(ids.iter().copied())? {
        encode_into(gap, &mut out)?;
    }
    Ok(out)
}

/// Replaces every `stride`-th value (starting with the first) by the
/// running sum of those values
fn cumulate(values: &mut [u32], stride: usize) -> Result<()> {
    let mut previous: u32 = 0;
    for value in values.iter_mut().step_by(stride) {
        previous = previous.checked_add(*value).ok_or_else(|| {
            IndexError::format("posting list", "review ID overflows 32 bits")
        })?;
        *value = previous;
    }
    Ok(())
}

/// Random access to a posting file
pub struct PostingStore {
    buffer: Box<dyn Buffer>,
}

impl PostingStore {
    pub fn open(path: &Path, access: PostingAccess) -> Result<Self> {
        debug!("Opening posting file {} ({:?})", path.display(), access);
        Ok(Self {
            buffer: open_buffer(path, access)?,
        })
    }

    /// Decodes the raw values stored in `[start, end)`, or up to the end of
    /// the file when `end` is `None`
    pub fn decode(&self, start: u64, end: Option<u64>) -> Result<Vec<u32>> {
        let slice = self.buffer.slice(start, end)?;
        decode_sequence(slice.data())
    }

    /// Decodes the postings of a term
    pub fn term_postings(&self, start: u64, end: Option<u64>) -> Result<Vec<Posting>> {
        let mut values = self.decode(start, end)?;
        if values.len() % 2 != 0 {
            return Err(IndexError::format(
                format!("term posting list at {}", start),
                format!("odd number of values ({})", values.len()),
            ));
        }
        cumulate(&mut values, 2)?;

        Ok(values
            .chunks_exact(2)
            .map(|pair| Posting {
                review_id: pair[0],
                frequency: pair[1],
            })
            .collect())
    }

    /// Decodes the review IDs of a product
    pub fn product_postings(&self, start: u64, end: Option<u64>) -> Result<Vec<ReviewId>> {
        let mut values = self.decode(start, end)?;
        cumulate(&mut values, 1)?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::encode;
    use temp_dir::TempDir;

    #[test]
    fn gaps_of_sequences() {
        assert_eq!(gaps([1, 2, 5, 100]).unwrap(), vec![1, 1, 3, 95]);
        assert_eq!(gaps([7]).unwrap(), vec![7]);
        assert!(gaps([]).unwrap().is_empty());
        assert!(gaps([3, 3]).is_err());
        assert!(gaps([4, 2]).is_err());
        assert!(gaps([0]).is_err());
    }

    #[test]
    fn term_layout() {
        let (bytes, total) = encode_term_postings(&[(1, 2), (4, 1)]).unwrap();
        let mut expected = Vec::new();
        for v in [1, 2, 3, 1] {
            expected.extend(encode(v).unwrap());
        }
        assert_eq!(bytes, expected);
        assert_eq!(total, 3);
    }

    #[test]
    fn product_layout() {
        let bytes = encode_product_postings(&[2, 3, 10]).unwrap();
        assert_eq!(decode_sequence(&bytes).unwrap(), vec![2, 1, 7]);
    }

    #[test]
    fn decode_ranges() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let path = dir.path().join("postings.bin");

        let (first, _) = encode_term_postings(&[(1, 2), (3, 1)]).unwrap();
        let (second, _) = encode_term_postings(&[(2, 5), (3, 1), (9, 4)]).unwrap();
        let mut data = first.clone();
        data.extend(&second);
        std::fs::write(&path, &data).unwrap();

        let store = PostingStore::open(&path, PostingAccess::File).unwrap();
        let split = first.len() as u64;
        assert_eq!(
            store.term_postings(0, Some(split)).unwrap(),
            vec![
                Posting {
                    review_id: 1,
                    frequency: 2
                },
                Posting {
                    review_id: 3,
                    frequency: 1
                }
            ]
        );
        let ids: Vec<ReviewId> = store
            .term_postings(split, None)
            .unwrap()
            .iter()
            .map(|p| p.review_id)
            .collect();
        assert_eq!(ids, vec![2, 3, 9]);
        assert_eq!(store.decode(split, None).unwrap(), vec![2, 5, 1, 1, 6, 4]);
    }

    #[test]
    fn odd_term_list_is_corrupt() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let path = dir.path().join("postings.bin");
        std::fs::write(&path, encode_product_postings(&[1, 2, 3]).unwrap()).unwrap();

        let store = PostingStore::open(&path, PostingAccess::Memory).unwrap();
        assert!(matches!(
            store.term_postings(0, None),
            Err(IndexError::Format { .. })
        ));
        assert_eq!(store.product_postings(0, None).unwrap(), vec![1, 2, 3]);
    }
}
