use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::PostingCache;
use crate::error::{IndexError, Result};
use crate::posting_store::{self, Posting, TermDictionaryEntry};
use crate::tokenizer::Tokenizer;
use crate::window;

/// Ranking model selected for a run; drives both how document-side weights
/// are computed at index time and how query-time scores are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingModel {
    TfIdf,
    Bm25,
}

impl RankingModel {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "tfidf" => Ok(RankingModel::TfIdf),
            "bm25" => Ok(RankingModel::Bm25),
            other => Err(IndexError::Config(format!(
                "unsupported rsv \"{other}\" (supported: \"tfidf\", \"bm25\")"
            ))),
        }
    }
}

/// Document-side weighting component of a SMART notation (`lnc` or `lnu`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocWeighting {
    /// Log tf, no idf, cosine (L2) normalized.
    Lnc,
    /// Log tf, no idf, normalized by the document's unique-term count.
    Lnu,
}

/// Query-side weighting component of a SMART notation (`ltc` or `lnc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryWeighting {
    /// Log tf, idf applied, cosine (L2) normalized.
    Ltc,
    /// Log tf, no idf, cosine (L2) normalized.
    Lnc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartNotation {
    pub doc: DocWeighting,
    pub query: QueryWeighting,
}

impl SmartNotation {
    pub fn parse(spec: &str) -> Result<Self> {
        let (doc_part, query_part) = spec
            .split_once('.')
            .ok_or_else(|| IndexError::Config(format!("malformed smart notation: {spec}")))?;

        let doc = match doc_part {
            "lnc" => DocWeighting::Lnc,
            "lnu" => DocWeighting::Lnu,
            other => {
                return Err(IndexError::Config(format!(
                    "unsupported document weighting \"{other}\" (supported: \"lnc\", \"lnu\")"
                )))
            }
        };
        let query = match query_part {
            "ltc" => QueryWeighting::Ltc,
            "lnc" => QueryWeighting::Lnc,
            other => {
                return Err(IndexError::Config(format!(
                    "unsupported query weighting \"{other}\" (supported: \"ltc\", \"lnc\")"
                )))
            }
        };
        Ok(SmartNotation { doc, query })
    }
}

impl std::fmt::Display for SmartNotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let doc = match self.doc {
            DocWeighting::Lnc => "lnc",
            DocWeighting::Lnu => "lnu",
        };
        let query = match self.query {
            QueryWeighting::Ltc => "ltc",
            QueryWeighting::Lnc => "lnc",
        };
        write!(f, "{doc}.{query}")
    }
}

/// Computes document-side TF-IDF weights for one document's raw term
/// frequencies. Returns a weight per term; idf is applied only at query
/// time for the `ltc` query component, never here.
pub fn document_term_weights(
    term_counts: &HashMap<String, u32>,
    doc: DocWeighting,
) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = term_counts
        .iter()
        .map(|(term, &tf)| (term.clone(), log_tf(tf)))
        .collect();

    match doc {
        DocWeighting::Lnc => l2_normalize(&mut weights),
        DocWeighting::Lnu => {
            let unique = term_counts.len() as f64;
            if unique > 0.0 {
                for weight in weights.values_mut() {
                    *weight /= unique;
                }
            }
        }
    }
    for weight in weights.values_mut() {
        *weight = round2(*weight);
    }
    weights
}

/// Computes query-side weights given raw query term frequencies and an idf
/// lookup. `QueryWeighting::Ltc` multiplies by idf before cosine normalizing.
pub fn query_term_weights(
    term_counts: &HashMap<String, u32>,
    idf_of: impl Fn(&str) -> f64,
    query: QueryWeighting,
) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = term_counts
        .iter()
        .map(|(term, &tf)| {
            let mut w = log_tf(tf);
            if matches!(query, QueryWeighting::Ltc) {
                w *= idf_of(term);
            }
            (term.clone(), w)
        })
        .collect();
    l2_normalize(&mut weights);
    weights
}

/// Rounds to two decimal places, matching the source's `round(x, 2)` calls
/// for document weights, idf values, and TF-IDF score contributions.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn log_tf(tf: u32) -> f64 {
    if tf == 0 {
        0.0
    } else {
        1.0 + (tf as f64).log10()
    }
}

fn l2_normalize(weights: &mut HashMap<String, f64>) {
    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in weights.values_mut() {
            *weight /= norm;
        }
    }
}

/// BM25 hyperparameters; always the configured values, never implicitly reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

/// `idf(t) * ((k1+1)*tf) / (k1*((1-b) + b*(dl/avdl)) + tf)`
pub fn bm25_term_score(tf: f64, idf: f64, normalized_length: f64, params: Bm25Params) -> f64 {
    let numerator = idf * (params.k1 + 1.0) * tf;
    let denominator = params.k1 * ((1.0 - params.b) + params.b * normalized_length) + tf;
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub rsv: RankingModel,
    pub smart_notation: Option<SmartNotation>,
    pub bm25: Bm25Params,
    pub window_boost: Option<u64>,
    pub topk: usize,
    pub cache_threshold_bytes: usize,
}

/// Ties the term dictionary, doc-length table, shard files and posting
/// cache together into the query-time entry point: `score(query_text) ->
/// ordered [(doc_id, score)]`.
pub struct Searcher {
    term_dict: HashMap<String, TermDictionaryEntry>,
    doc_lengths: HashMap<String, f64>,
    shard_paths: Vec<PathBuf>,
    cache: PostingCache,
    config: SearchConfig,
}

impl Searcher {
    pub fn open(index_folder: &Path, config: SearchConfig) -> Result<Self> {
        let term_dict_path = index_folder.join("data").join("terms_data.txt");
        let term_dict = posting_store::read_term_dictionary(&term_dict_path)?
            .into_iter()
            .map(|e| (e.term.clone(), e))
            .collect();

        let doc_lengths = if config.rsv == RankingModel::Bm25 {
            let path = index_folder.join("data").join("docs_data.txt");
            posting_store::read_doc_lengths(&path)?.into_iter().collect()
        } else {
            HashMap::new()
        };

        let merged_dir = index_folder.join("merged");
        let mut shard_paths: Vec<PathBuf> = fs::read_dir(&merged_dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        shard_paths.sort();

        Ok(Searcher {
            term_dict,
            doc_lengths,
            shard_paths,
            cache: PostingCache::new(config.cache_threshold_bytes),
            config,
        })
    }

    pub fn score(&mut self, query_text: &str, tokenizer: &Tokenizer) -> Result<Vec<(String, f64)>> {
        let tokens = tokenizer.tokenize(query_text);
        let mut term_counts: HashMap<String, u32> = HashMap::new();
        for term in &tokens {
            *term_counts.entry(term.clone()).or_insert(0) += 1;
        }

        let term_dict = &self.term_dict;
        let query_weights = if self.config.rsv == RankingModel::TfIdf {
            let notation = self.config.smart_notation.ok_or_else(|| {
                IndexError::Config("tfidf search requires a smart notation".to_string())
            })?;
            let idf_of = |t: &str| term_dict.get(t).map(|e| e.idf).unwrap_or(0.0);
            Some(query_term_weights(&term_counts, idf_of, notation.query))
        } else {
            None
        };

        let mut unique_terms: Vec<String> = term_counts.keys().cloned().collect();
        unique_terms.sort();

        let mut doc_order: Vec<String> = Vec::new();
        let mut doc_index: HashMap<String, usize> = HashMap::new();
        let mut doc_scores: Vec<f64> = Vec::new();
        let mut doc_term_positions: HashMap<String, HashMap<String, Vec<u32>>> = HashMap::new();

        for term in &unique_terms {
            let Some(entry) = self.term_dict.get(term).cloned() else {
                continue;
            };
            let postings = self.load_postings(term, entry.shard_index)?;

            for posting in &postings {
                let idx = *doc_index.entry(posting.doc_id.clone()).or_insert_with(|| {
                    doc_order.push(posting.doc_id.clone());
                    doc_scores.push(0.0);
                    doc_order.len() - 1
                });

                let contribution = if self.config.rsv == RankingModel::TfIdf {
                    let qw = query_weights
                        .as_ref()
                        .and_then(|w| w.get(term))
                        .copied()
                        .unwrap_or(0.0);
                    round2(posting.weight * qw)
                } else {
                    let normalized_length = *self.doc_lengths.get(&posting.doc_id).unwrap_or(&0.0);
                    bm25_term_score(posting.weight, entry.idf, normalized_length, self.config.bm25)
                };
                doc_scores[idx] += contribution;

                doc_term_positions
                    .entry(posting.doc_id.clone())
                    .or_default()
                    .insert(term.clone(), posting.positions.clone());
            }
        }

        if let Some(b) = self.config.window_boost {
            let required_distinct = term_counts
                .keys()
                .filter(|t| self.term_dict.get(*t).is_some_and(|e| e.idf > 2.0))
                .count();

            for (doc_id, &idx) in doc_index.iter() {
                if let Some(positions) = doc_term_positions.get(doc_id) {
                    if positions.len() < required_distinct {
                        continue;
                    }
                    let window = window::minimum_window(positions, positions.len());
                    doc_scores[idx] *= window::boost_multiplier(b, window);
                }
            }
        }

        let mut results: Vec<(String, f64)> = doc_order.into_iter().zip(doc_scores).collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        results.truncate(self.config.topk);
        Ok(results)
    }

    fn load_postings(&mut self, term: &str, shard_index: usize) -> Result<Vec<Posting>> {
        if let Some(cached) = self.cache.get(term) {
            return Ok(cached);
        }
        let shard_path = self.shard_paths.get(shard_index).ok_or_else(|| {
            IndexError::Config(format!("shard index {shard_index} out of range for term {term}"))
        })?;
        let postings = posting_store::find_postings(shard_path, term)?.unwrap_or_default();
        self.cache.insert(term.to_string(), postings.clone());
        Ok(postings)
    }
}
