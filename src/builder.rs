use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use derivative::Derivative;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::{
    base::{
        save_options, IndexError, IndexOptions, IoContext, Result, ReviewId, FREQUENCIES_FILE,
        INDEX_CBOR, PRODUCT_POSTINGS_FILE, TERM_POSTINGS_FILE,
    },
    compress::{
        encode_into,
        postings::{encode_product_postings, encode_term_postings},
    },
    corpus::{tokenize, CorpusReader, Review},
    dictionary::{DictionaryBuilder, DictionaryFiles, PRODUCT_FILES, TERM_FILES},
    reader::{IndexReader, ReaderOptions},
    reviews::{AttributeWriter, HELPFULNESS_FILE, LENGTHS_FILE, SCORES_FILE},
};

const DEFAULT_PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(DEFAULT_PROGRESS_TEMPLATE)
        .progress_chars("=> ")
}

#[derive(Derivative, Clone, Debug)]
#[derivative(Default)]
pub struct BuilderOptions {
    /// Block sizes of the dictionaries
    pub index: IndexOptions,

    /// Show a progress bar while writing the posting lists
    #[derivative(Default(value = "false"))]
    pub progress: bool,
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::options()
        .write(true)
        .truncate(true)
        .create(true)
        .open(path)
        .context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn offset(written: usize, path: &Path) -> Result<u32> {
    u32::try_from(written).map_err(|_| {
        IndexError::invalid_arg(path.display().to_string(), "larger than 4GB")
    })
}

/// Consumes reviews and writes the index files
pub struct Indexer {
    folder: PathBuf,
    options: BuilderOptions,

    /// Reviews (with the token frequency) of each term
    terms: BTreeMap<String, Vec<(ReviewId, u32)>>,

    /// Reviews of each product
    products: BTreeMap<String, Vec<ReviewId>>,

    attributes: Option<AttributeWriter>,
    review_count: u32,
    token_count: u32,
    built: bool,
}

impl Indexer {
    pub fn new(folder: &Path, options: &BuilderOptions) -> Result<Indexer> {
        for (name, size) in [
            ("term block size", options.index.term_block_size),
            ("product block size", options.index.product_block_size),
        ] {
            if size == 0 {
                return Err(IndexError::invalid_arg(name, "should be at least 1"));
            }
        }

        fs::create_dir_all(folder).context(|| format!("creating {}", folder.display()))?;
        info!("Creating index in {}", folder.display());

        Ok(Indexer {
            folder: folder.to_path_buf(),
            options: options.clone(),
            terms: BTreeMap::new(),
            products: BTreeMap::new(),
            attributes: Some(AttributeWriter::create(folder)?),
            review_count: 0,
            token_count: 0,
            built: false,
        })
    }

    pub fn review_count(&self) -> u32 {
        self.review_count
    }

    /// Adds a review, returning its ID (IDs start at 1)
    pub fn add(&mut self, review: &Review) -> Result<ReviewId> {
        if self.built {
            return Err(IndexError::InvalidOperation(
                "index cannot be changed since it has been built".to_string(),
            ));
        }
        if review.product_id.is_empty() {
            return Err(IndexError::invalid_arg("product ID", "should not be empty"));
        }

        let review_id = self
            .review_count
            .checked_add(1)
            .ok_or_else(|| IndexError::invalid_arg("review", "too many reviews"))?;

        let mut frequencies: HashMap<String, u32> = HashMap::new();
        let mut length: u32 = 0;
        for token in tokenize(&review.text) {
            *frequencies.entry(token).or_insert(0) += 1;
            length += 1;
        }
        let token_count = self
            .token_count
            .checked_add(length)
            .ok_or_else(|| IndexError::invalid_arg("review", "too many tokens"))?;

        if let Some(attributes) = self.attributes.as_mut() {
            attributes.append(review.score, review.helpfulness, length)?;
        }

        for (token, frequency) in frequencies {
            self.terms
                .entry(token)
                .or_default()
                .push((review_id, frequency));
        }
        self.products
            .entry(review.product_id.clone())
            .or_default()
            .push(review_id);

        self.review_count = review_id;
        self.token_count = token_count;
        Ok(review_id)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if self.options.progress {
            let progress = ProgressBar::new(len as u64);
            progress.set_style(pb_style());
            progress
        } else {
            ProgressBar::hidden()
        }
    }

    fn write_terms(&self, progress: &ProgressBar) -> Result<()> {
        let postings_path = self.folder.join(TERM_POSTINGS_FILE);
        let frequencies_path = self.folder.join(FREQUENCIES_FILE);
        let mut postings = create(&postings_path)?;
        let mut frequencies = create(&frequencies_path)?;

        let mut dictionary = DictionaryBuilder::new(self.options.index.term_block_size)?;
        let mut written = 0;
        let mut totals = Vec::new();
        for (term, term_postings) in self.terms.iter() {
            dictionary.push(term, offset(written, &postings_path)?)?;

            let (bytes, total) = encode_term_postings(term_postings)?;
            postings
                .write_all(&bytes)
                .context(|| format!("writing {}", postings_path.display()))?;
            written += bytes.len();

            totals.clear();
            encode_into(total, &mut totals)?;
            frequencies
                .write_all(&totals)
                .context(|| format!("writing {}", frequencies_path.display()))?;
            progress.inc(1);
        }
        offset(written, &postings_path)?;

        postings
            .flush()
            .context(|| format!("writing {}", postings_path.display()))?;
        frequencies
            .flush()
            .context(|| format!("writing {}", frequencies_path.display()))?;

        debug!(
            "Wrote {} terms ({} posting bytes)",
            dictionary.len(),
            written
        );
        dictionary.finish().save(
            &self.folder,
            &TERM_FILES,
            &[self.review_count, self.token_count],
        )
    }

    fn write_products(&self, progress: &ProgressBar) -> Result<()> {
        let postings_path = self.folder.join(PRODUCT_POSTINGS_FILE);
        let mut postings = create(&postings_path)?;

        let mut dictionary = DictionaryBuilder::new(self.options.index.product_block_size)?;
        let mut written = 0;
        for (product, reviews) in self.products.iter() {
            dictionary.push(product, offset(written, &postings_path)?)?;

            let bytes = encode_product_postings(reviews)?;
            postings
                .write_all(&bytes)
                .context(|| format!("writing {}", postings_path.display()))?;
            written += bytes.len();
            progress.inc(1);
        }
        offset(written, &postings_path)?;

        postings
            .flush()
            .context(|| format!("writing {}", postings_path.display()))?;

        debug!(
            "Wrote {} products ({} posting bytes)",
            dictionary.len(),
            written
        );
        dictionary.finish().save(&self.folder, &PRODUCT_FILES, &[])
    }

    /// Writes the dictionaries and posting lists
    pub fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(IndexError::InvalidOperation(
                "index has already been built".to_string(),
            ));
        }
        self.built = true;

        if let Some(attributes) = self.attributes.take() {
            attributes.finish()?;
        }

        info!(
            "Building index: {} reviews, {} tokens, {} terms, {} products",
            self.review_count,
            self.token_count,
            self.terms.len(),
            self.products.len()
        );

        let progress = self.progress_bar(self.terms.len() + self.products.len());
        self.write_terms(&progress)?;
        self.write_products(&progress)?;
        progress.finish();

        save_options(&self.options.index, &self.folder)?;

        self.terms.clear();
        self.products.clear();
        info!("Index written in {}", self.folder.display());
        Ok(())
    }

    /// Opens the index (it has to be built)
    pub fn to_index(&self, options: &ReaderOptions) -> Result<IndexReader> {
        if !self.built {
            return Err(IndexError::InvalidOperation(
                "index is not built".to_string(),
            ));
        }
        IndexReader::open(&self.folder, options)
    }

    /// Removes the index files from the folder, and the folder itself if
    /// nothing else remains
    pub fn remove_index(folder: &Path) -> Result<()> {
        if !folder.exists() {
            return Ok(());
        }

        let dictionary_files = |files: &DictionaryFiles| {
            [files.info_blocks, files.sizes, files.positions, files.atoms]
                .into_iter()
                .chain(files.locations)
        };
        let names = dictionary_files(&TERM_FILES)
            .chain(dictionary_files(&PRODUCT_FILES))
            .chain([
                TERM_POSTINGS_FILE,
                FREQUENCIES_FILE,
                PRODUCT_POSTINGS_FILE,
                SCORES_FILE,
                HELPFULNESS_FILE,
                LENGTHS_FILE,
                INDEX_CBOR,
            ]);

        for name in names {
            let path = folder.join(name);
            if path.exists() {
                fs::remove_file(&path).context(|| format!("removing {}", path.display()))?;
            }
        }

        let is_empty = fs::read_dir(folder)
            .context(|| format!("listing {}", folder.display()))?
            .next()
            .is_none();
        if is_empty {
            fs::remove_dir(folder).context(|| format!("removing {}", folder.display()))?;
        } else {
            debug!("Keeping {} (not empty)", folder.display());
        }
        info!("Removed index in {}", folder.display());
        Ok(())
    }
}

/// Builds an index from a corpus file
pub fn build_index(corpus_path: &Path, folder: &Path, options: &BuilderOptions) -> Result<()> {
    let corpus = File::options()
        .read(true)
        .open(corpus_path)
        .context(|| format!("opening {}", corpus_path.display()))?;

    let mut indexer = Indexer::new(folder, options)?;
    for review in CorpusReader::new(BufReader::new(corpus)) {
        indexer.add(&review?)?;
    }
    info!(
        "Read {} reviews from {}",
        indexer.review_count(),
        corpus_path.display()
    );
    indexer.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Helpfulness;
    use temp_dir::TempDir;

    fn review(product: &str, text: &str) -> Review {
        Review::new(product, 4, Helpfulness::default(), text)
    }

    #[test]
    fn assigns_ids() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let mut indexer = Indexer::new(dir.path(), &BuilderOptions::default()).unwrap();
        assert_eq!(indexer.add(&review("A", "one two")).unwrap(), 1);
        assert_eq!(indexer.add(&review("B", "")).unwrap(), 2);
        assert!(indexer.add(&review("", "x")).is_err());
        assert_eq!(indexer.review_count(), 2);
        assert_eq!(indexer.token_count, 2);
    }

    #[test]
    fn build_once() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let mut indexer = Indexer::new(dir.path(), &BuilderOptions::default()).unwrap();
        indexer.add(&review("A", "good product good")).unwrap();
        assert!(matches!(
            indexer.to_index(&ReaderOptions::default()),
            Err(IndexError::InvalidOperation(_))
        ));

        indexer.build().unwrap();
        assert!(matches!(
            indexer.build(),
            Err(IndexError::InvalidOperation(_))
        ));
        assert!(matches!(
            indexer.add(&review("A", "again")),
            Err(IndexError::InvalidOperation(_))
        ));

        for name in [TERM_POSTINGS_FILE, FREQUENCIES_FILE, PRODUCT_POSTINGS_FILE, INDEX_CBOR] {
            assert!(dir.path().join(name).is_file(), "{} is missing", name);
        }
    }

    #[test]
    fn zero_block_size() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let mut options = BuilderOptions::default();
        options.index.product_block_size = 0;
        assert!(Indexer::new(dir.path(), &options).is_err());
    }

    #[test]
    fn remove() {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let folder = dir.path().join("index");
        let mut indexer = Indexer::new(&folder, &BuilderOptions::default()).unwrap();
        indexer.add(&review("A", "text")).unwrap();
        indexer.build().unwrap();

        Indexer::remove_index(&folder).unwrap();
        assert!(!folder.exists());
        Indexer::remove_index(&folder).unwrap();
    }
}
