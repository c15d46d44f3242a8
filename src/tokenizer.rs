use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Stemmer identifiers recognized by the tokenizer configuration, per the
/// on-disk metadata contract (`stemmer` field of `metadata.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StemmerKind {
    #[serde(rename = "potterNLTK")]
    PotterNltk,
    #[serde(rename = "showball")]
    Showball,
}

impl StemmerKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "potterNLTK" => Ok(StemmerKind::PotterNltk),
            "showball" => Ok(StemmerKind::Showball),
            other => Err(IndexError::Config(format!(
                "unsupported stemmer \"{other}\" (supported: \"potterNLTK\", \"showball\")"
            ))),
        }
    }

    fn algorithm(self) -> Algorithm {
        // Both identifiers resolve to the crate's single maintained English
        // stemmer; the identifier itself is still persisted in metadata so a
        // rebuilt index can tell which configuration produced it.
        Algorithm::English
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(rename = "minL")]
    pub min_len: Option<usize>,
    pub stopwords_path: Option<PathBuf>,
    pub stemmer: Option<StemmerKind>,
}

/// Splits on whitespace/hyphen, strips punctuation, drops short/stop words,
/// then stems or lowercases the survivors.
pub struct Tokenizer {
    config: TokenizerConfig,
    stopwords: HashSet<String>,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        let stopwords = match &config.stopwords_path {
            Some(path) => load_stopwords(path)?,
            None => HashSet::new(),
        };

        let stemmer = config.stemmer.map(|kind| Stemmer::create(kind.algorithm()));

        Ok(Tokenizer {
            config,
            stopwords,
            stemmer,
        })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| c.is_whitespace() || c == '-')
            .map(strip_non_word)
            .filter(|token| !token.is_empty())
            .filter(|token| match self.config.min_len {
                Some(min) => token.chars().count() >= min,
                None => true,
            })
            .filter(|token| !self.stopwords.contains(&token.to_lowercase()))
            .map(|token| match &self.stemmer {
                Some(stemmer) => stemmer.stem(&token).into_owned(),
                None => token.to_lowercase(),
            })
            .collect()
    }
}

fn strip_non_word(piece: &str) -> String {
    piece
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn load_stopwords(path: &std::path::Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Err(IndexError::MissingFile(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(min_len: Option<usize>, stemmer: Option<StemmerKind>) -> Tokenizer {
        Tokenizer::new(TokenizerConfig {
            min_len,
            stopwords_path: None,
            stemmer,
        })
        .unwrap()
    }

    #[test]
    fn splits_on_whitespace_and_hyphen() {
        let tk = tokenizer(None, None);
        assert_eq!(
            tk.tokenize("co-occurring Cells, Alpha!"),
            vec!["co", "occurring", "cells", "alpha"]
        );
    }

    #[test]
    fn drops_tokens_shorter_than_min_len() {
        let tk = tokenizer(Some(3), None);
        assert_eq!(tk.tokenize("a bb ccc dddd"), vec!["ccc", "dddd"]);
    }

    #[test]
    fn stopwords_are_filtered_case_insensitively() {
        let mut tk = tokenizer(None, None);
        tk.stopwords.insert("the".to_string());
        assert_eq!(tk.tokenize("The quick fox"), vec!["quick", "fox"]);
    }

    #[test]
    fn identity_tokenization_preserves_repeated_terms_in_order() {
        let tk = tokenizer(None, None);
        assert_eq!(tk.tokenize("alpha beta alpha"), vec!["alpha", "beta", "alpha"]);
    }

    #[test]
    fn stemmer_normalizes_surface_forms() {
        let tk = tokenizer(None, Some(StemmerKind::PotterNltk));
        let tokens = tk.tokenize("running runner");
        assert_eq!(tokens[0], tokens[1].trim_end_matches("er"));
    }
}
