//! Read-side facade of an index folder

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use derivative::Derivative;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    base::{
        load_options, IndexError, IndexOptions, IoContext, Len, Posting, Result, ReviewId,
        FREQUENCIES_FILE, PRODUCT_POSTINGS_FILE, TERM_POSTINGS_FILE,
    },
    compress::{decode_sequence, postings::PostingStore},
    corpus::Helpfulness,
    dictionary::{ProductDictionary, TermDictionary, PRODUCT_FILES, TERM_FILES},
    reviews::AttributeStore,
    utils::buffer::PostingAccess,
};

#[derive(Derivative, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[derivative(Default)]
pub struct ReaderOptions {
    /// How the posting files are read
    #[derivative(Default(value = "PostingAccess::File"))]
    pub access: PostingAccess,
}

/// Logs an error before returning it
fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{} failed: {}", operation, e);
    }
    result
}

/// Queries over a built index
///
/// Dictionaries and term frequencies are loaded in memory when opening,
/// posting lists and review attributes are read on demand.
pub struct IndexReader {
    folder: PathBuf,
    options: IndexOptions,
    terms: TermDictionary,
    frequencies: Vec<u32>,
    products: ProductDictionary,
    term_postings: PostingStore,
    product_postings: PostingStore,
    attributes: AttributeStore,
    review_count: u32,
    token_count: u32,
}

impl IndexReader {
    pub fn open(folder: &Path, options: &ReaderOptions) -> Result<IndexReader> {
        logged("opening index", Self::load(folder, options))
    }

    fn load(folder: &Path, options: &ReaderOptions) -> Result<IndexReader> {
        let index_options = load_options(folder)?;

        let (terms, header) =
            TermDictionary::load(folder, &TERM_FILES, 2, index_options.term_block_size)?;
        let (products, _) =
            ProductDictionary::load(folder, &PRODUCT_FILES, 0, index_options.product_block_size)?;

        let frequencies_path = folder.join(FREQUENCIES_FILE);
        let mut data = Vec::new();
        File::options()
            .read(true)
            .open(&frequencies_path)
            .and_then(|mut file| file.read_to_end(&mut data))
            .context(|| format!("reading {}", frequencies_path.display()))?;
        let frequencies = decode_sequence(&data)?;
        if frequencies.len() != terms.len() {
            return Err(IndexError::format(
                frequencies_path.display().to_string(),
                format!(
                    "{} frequencies for {} terms",
                    frequencies.len(),
                    terms.len()
                ),
            ));
        }

        let reader = IndexReader {
            folder: folder.to_path_buf(),
            options: index_options,
            term_postings: PostingStore::open(&folder.join(TERM_POSTINGS_FILE), options.access)?,
            product_postings: PostingStore::open(
                &folder.join(PRODUCT_POSTINGS_FILE),
                options.access,
            )?,
            attributes: AttributeStore::open(folder)?,
            review_count: header[0],
            token_count: header[1],
            terms,
            frequencies,
            products,
        };

        info!(
            "Opened index {} ({} reviews, {} terms, {} products)",
            reader.folder.display(),
            reader.review_count,
            reader.terms.len(),
            reader.products.len()
        );
        Ok(reader)
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    fn is_valid(&self, review_id: ReviewId) -> bool {
        review_id >= 1 && review_id <= self.review_count
    }

    /// Product of a review, found by scanning the product posting lists
    pub fn product_id_of(&self, review_id: ReviewId) -> Result<Option<String>> {
        if !self.is_valid(review_id) {
            return Ok(None);
        }
        logged("product_id_of", self.find_product(review_id))
    }

    fn find_product(&self, review_id: ReviewId) -> Result<Option<String>> {
        for index in 0..self.products.len() {
            if let Some((start, end)) = self.products.posting_range(index) {
                let reviews = self.product_postings.product_postings(start, end)?;
                if reviews.binary_search(&review_id).is_ok() {
                    return self.products.key_at(index);
                }
            }
        }
        Ok(None)
    }

    pub fn score_of(&self, review_id: ReviewId) -> Result<Option<u8>> {
        if !self.is_valid(review_id) {
            return Ok(None);
        }
        logged("score_of", self.attributes.score(review_id).map(Some))
    }

    pub fn helpfulness_of(&self, review_id: ReviewId) -> Result<Option<Helpfulness>> {
        if !self.is_valid(review_id) {
            return Ok(None);
        }
        logged(
            "helpfulness_of",
            self.attributes.helpfulness(review_id).map(Some),
        )
    }

    /// Number of tokens of a review
    pub fn length_of(&self, review_id: ReviewId) -> Result<Option<u32>> {
        if !self.is_valid(review_id) {
            return Ok(None);
        }
        logged("length_of", self.attributes.length(review_id).map(Some))
    }

    /// Reviews containing a token, with the number of occurrences, by
    /// increasing review ID
    pub fn reviews_containing_token(&self, token: &str) -> Result<Vec<Posting>> {
        match self.terms.lookup(token) {
            Some(index) => logged("reviews_containing_token", self.term_postings_at(index)),
            None => Ok(Vec::new()),
        }
    }

    fn term_postings_at(&self, index: usize) -> Result<Vec<Posting>> {
        match self.terms.posting_range(index) {
            Some((start, end)) => self.term_postings.term_postings(start, end),
            None => Ok(Vec::new()),
        }
    }

    /// Number of reviews containing a token
    pub fn token_doc_frequency(&self, token: &str) -> Result<usize> {
        Ok(self.reviews_containing_token(token)?.len())
    }

    /// Number of occurrences of a token in the whole collection
    pub fn token_collection_frequency(&self, token: &str) -> u32 {
        self.terms
            .lookup(token)
            .and_then(|index| self.frequencies.get(index).copied())
            .unwrap_or(0)
    }

    /// Reviews of a product, by increasing ID
    pub fn reviews_of_product(&self, product_id: &str) -> Result<Vec<ReviewId>> {
        let range = self
            .products
            .lookup(product_id)
            .and_then(|index| self.products.posting_range(index));
        match range {
            Some((start, end)) => logged(
                "reviews_of_product",
                self.product_postings.product_postings(start, end),
            ),
            None => Ok(Vec::new()),
        }
    }

    pub fn total_review_count(&self) -> u32 {
        self.review_count
    }

    /// Number of tokens in the collection (with repetitions)
    pub fn total_token_count(&self) -> u32 {
        self.token_count
    }

    /// Number of distinct tokens
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}
