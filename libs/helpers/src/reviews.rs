use rand::{seq::SliceRandom, Rng, RngCore};
use rand_distr::{Distribution, Poisson};
use std::{cmp::min, collections::BTreeSet};

use review_index::corpus::{Helpfulness, Review};

const LETTERS: &[u8] = b"abcdefgh0123";
const SEPARATORS: [&str; 4] = [" ", ", ", ". ", "! "];

/// Random distinct words over a small alphabet, so that many of them share
/// a prefix
pub fn create_vocabulary(size: usize, rng: &mut dyn RngCore) -> Vec<String> {
    let mut words = BTreeSet::new();
    while words.len() < size {
        let len = rng.gen_range(1..=8);
        let word: String = (0..len)
            .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
            .collect();
        words.insert(word);
    }
    words.into_iter().collect()
}

/// Random distinct product IDs (e.g. `B00A3F2C`)
pub fn create_products(count: usize, rng: &mut dyn RngCore) -> Vec<String> {
    let mut products = BTreeSet::new();
    while products.len() < count {
        let suffix: String = (0..5)
            .map(|_| b"0123456789ABCDEF"[rng.gen_range(0..16)] as char)
            .collect();
        products.insert(format!("B00{}", suffix));
    }
    products.into_iter().collect()
}

pub fn create_review(
    lambda_words: f32,
    max_words: usize,
    vocabulary: &[String],
    products: &[String],
    rng: &mut dyn RngCore,
) -> Review {
    let poi = Poisson::new(lambda_words).unwrap();
    let num_words = min(poi.sample(rng) as usize, max_words);

    let mut text = String::new();
    for _ in 0..num_words {
        let word = vocabulary.choose(rng).unwrap();
        if rng.gen_bool(0.2) {
            text.push_str(&word.to_uppercase());
        } else {
            text.push_str(word);
        }
        text.push_str(SEPARATORS.choose(rng).unwrap());
    }

    let denominator = rng.gen_range(0..10);
    Review {
        product_id: products.choose(rng).unwrap().clone(),
        score: rng.gen_range(1..=5),
        helpfulness: Helpfulness {
            numerator: rng.gen_range(0..=denominator),
            denominator,
        },
        text,
    }
}
