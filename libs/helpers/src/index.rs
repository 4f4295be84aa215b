use std::collections::{BTreeMap, HashMap};

use rand::{rngs::StdRng, SeedableRng};
use temp_dir::TempDir;

use crate::reviews::{create_products, create_review, create_vocabulary};
use review_index::{
    base::ReviewId,
    builder::{BuilderOptions, Indexer},
    corpus::{tokenize, Review},
    reader::{IndexReader, ReaderOptions},
};

/// A random review corpus, its index and the expected posting lists
pub struct TestIndex {
    pub dir: TempDir,
    pub reviews: Vec<Review>,
    pub terms: BTreeMap<String, Vec<(ReviewId, u32)>>,
    pub products: BTreeMap<String, Vec<ReviewId>>,
    pub token_count: u32,
    pub indexer: Indexer,
}

impl TestIndex {
    pub fn new(
        vocabulary_size: usize,
        product_count: usize,
        review_count: usize,
        lambda_words: f32,
        max_words: usize,
        seed: Option<u64>,
        options: &BuilderOptions,
    ) -> Self {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let mut indexer = Indexer::new(dir.path(), options).expect("Could not create indexer");

        let mut rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };

        let vocabulary = create_vocabulary(vocabulary_size, &mut rng);
        let product_ids = create_products(product_count, &mut rng);

        let mut terms = BTreeMap::<String, Vec<(ReviewId, u32)>>::new();
        let mut products = BTreeMap::<String, Vec<ReviewId>>::new();
        let mut reviews = Vec::new();
        let mut token_count = 0;

        for _ in 0..review_count {
            let review = create_review(lambda_words, max_words, &vocabulary, &product_ids, &mut rng);
            let review_id = indexer
                .add(&review)
                .expect("Error while adding a review to the index");

            let mut frequencies = HashMap::<String, u32>::new();
            for token in tokenize(&review.text) {
                *frequencies.entry(token).or_default() += 1;
                token_count += 1;
            }
            for (token, frequency) in frequencies {
                terms.entry(token).or_default().push((review_id, frequency));
            }
            products
                .entry(review.product_id.clone())
                .or_default()
                .push(review_id);

            reviews.push(review);
        }

        indexer.build().expect("Error while building the index");
        log::info!(
            "Test index with {} reviews, {} terms and {} products",
            reviews.len(),
            terms.len(),
            products.len()
        );

        Self {
            dir,
            reviews,
            terms,
            products,
            token_count,
            indexer,
        }
    }

    pub fn reader(&self, options: &ReaderOptions) -> IndexReader {
        self.indexer
            .to_index(options)
            .expect("Could not open the index")
    }
}
