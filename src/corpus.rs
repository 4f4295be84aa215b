//! Review corpus in the `product/productId:` ... `review/text:` text format

use std::io::BufRead;

use log::warn;

use crate::base::{IndexError, IoContext, Result};

const PRODUCT_FIELD: &str = "product/productId:";
const HELPFULNESS_FIELD: &str = "review/helpfulness:";
const SCORE_FIELD: &str = "review/score:";
const TEXT_FIELD: &str = "review/text:";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Helpfulness {
    pub numerator: u16,
    pub denominator: u16,
}

/// A review, as read from the corpus
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Review {
    pub product_id: String,
    pub score: u8,
    pub helpfulness: Helpfulness,
    pub text: String,
}

impl Review {
    pub fn new(product_id: &str, score: u8, helpfulness: Helpfulness, text: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            score,
            helpfulness,
            text: text.to_string(),
        }
    }
}

/// Lowercases a text and splits it into `[a-z0-9]+` tokens
pub fn tokenize(text: &str) -> impl Iterator<Item = String> {
    let lowercase = text.to_lowercase();
    let tokens: Vec<String> = lowercase
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();
    tokens.into_iter()
}

/// Partially read review
#[derive(Default)]
struct PendingReview {
    product_id: String,
    line: usize,
    score: Option<u8>,
    helpfulness: Option<Helpfulness>,
    text: Option<String>,
}

impl PendingReview {
    fn finish(self) -> Review {
        if self.score.is_none() {
            warn!("Review at line {} has no score, using 0", self.line);
        }
        if self.helpfulness.is_none() {
            warn!("Review at line {} has no helpfulness, using 0/0", self.line);
        }
        if self.text.is_none() {
            warn!("Review at line {} has no text", self.line);
        }
        Review {
            product_id: self.product_id,
            score: self.score.unwrap_or(0),
            helpfulness: self.helpfulness.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
        }
    }
}

/// Iterates over the reviews of a corpus
pub struct CorpusReader<R: BufRead> {
    reader: R,
    line_number: usize,
    pending: Option<PendingReview>,
    done: bool,
}

impl<R: BufRead> CorpusReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            pending: None,
            done: false,
        }
    }

    fn invalid(&self, message: String) -> IndexError {
        IndexError::format(format!("corpus line {}", self.line_number), message)
    }

    fn parse_score(&self, value: &str) -> Result<u8> {
        let score: f32 = value
            .parse()
            .map_err(|_| self.invalid(format!("invalid score {:?}", value)))?;
        if !(0. ..=255.).contains(&score) {
            return Err(self.invalid(format!("score {} out of range", value)));
        }
        Ok(score.trunc() as u8)
    }

    fn parse_helpfulness(&self, value: &str) -> Result<Helpfulness> {
        let parse = |part: Option<&str>| -> Result<u16> {
            part.and_then(|p| p.trim().parse().ok())
                .ok_or_else(|| self.invalid(format!("invalid helpfulness {:?}", value)))
        };
        let mut parts = value.split('/');
        let helpfulness = Helpfulness {
            numerator: parse(parts.next())?,
            denominator: parse(parts.next())?,
        };
        if parts.next().is_some() {
            return Err(self.invalid(format!("invalid helpfulness {:?}", value)));
        }
        Ok(helpfulness)
    }

    /// Handles one line, returning a review when a new one starts
    fn process_line(&mut self, line: &str) -> Result<Option<Review>> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(value) = line.strip_prefix(PRODUCT_FIELD) {
            let product_id = value.trim();
            if product_id.is_empty() {
                return Err(self.invalid("empty product ID".to_string()));
            }
            let next = PendingReview {
                product_id: product_id.to_string(),
                line: self.line_number,
                ..Default::default()
            };
            return Ok(self.pending.replace(next).map(PendingReview::finish));
        }

        let field = if line.starts_with(HELPFULNESS_FIELD) {
            HELPFULNESS_FIELD
        } else if line.starts_with(SCORE_FIELD) {
            SCORE_FIELD
        } else if line.starts_with(TEXT_FIELD) {
            TEXT_FIELD
        } else {
            return Ok(None);
        };

        if self.pending.is_none() {
            return Err(self.invalid(format!("{} before any {}", field, PRODUCT_FIELD)));
        }
        let value = line[field.len()..].trim();

        match field {
            HELPFULNESS_FIELD => {
                let helpfulness = self.parse_helpfulness(value)?;
                if let Some(pending) = self.pending.as_mut() {
                    pending.helpfulness = Some(helpfulness);
                }
            }
            SCORE_FIELD => {
                let score = self.parse_score(value)?;
                if let Some(pending) = self.pending.as_mut() {
                    pending.score = Some(score);
                }
            }
            _ => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.text = Some(value.to_string());
                }
            }
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = Result<Review>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut line = String::new();
        loop {
            line.clear();
            let read = match self
                .reader
                .read_line(&mut line)
                .context(|| format!("reading corpus line {}", self.line_number + 1))
            {
                Ok(read) => read,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if read == 0 {
                self.done = true;
                return self.pending.take().map(|p| Ok(p.finish()));
            }

            self.line_number += 1;
            match self.process_line(&line) {
                Ok(Some(review)) => return Some(Ok(review)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
