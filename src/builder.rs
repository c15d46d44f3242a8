use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::posting_store::{self, Posting};
use crate::scorer::{self, DocWeighting, RankingModel};

/// Bytes budgeted to the in-memory partial index before it is spilled to
/// disk. The builder tracks its own running estimate rather than querying
/// the OS for available memory.
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    pub memory_budget_bytes: usize,
    pub rsv: RankingModel,
    pub doc_weighting: DocWeighting,
}

/// Rough per-posting overhead used for the running memory estimate: a
/// doc id, an `f64` weight, and a `Vec<u32>` of positions (sized per
/// occurrence) plus bookkeeping slop.
const POSTING_OVERHEAD_BYTES: usize = 32;
const POSITION_BYTES: usize = 4;

/// Accumulates term postings in memory, spilling sorted blocks to disk once
/// the configured memory budget is exceeded. Block files are written as
/// `<block_index>.txt` directly under the output directory, consumed and
/// deleted once the merger has absorbed them.
pub struct IndexBuilder {
    config: BuilderConfig,
    output_dir: PathBuf,
    partial: BTreeMap<String, Vec<Posting>>,
    memory_estimate: usize,
    block_paths: Vec<PathBuf>,
    doc_lengths: BTreeMap<String, u32>,
    total_docs: u32,
}

impl IndexBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, config: BuilderConfig) -> Self {
        IndexBuilder {
            config,
            output_dir: output_dir.into(),
            partial: BTreeMap::new(),
            memory_estimate: 0,
            block_paths: Vec::new(),
            doc_lengths: BTreeMap::new(),
            total_docs: 0,
        }
    }

    /// Adds one document's tokens to the partial index, computing document-
    /// side weights immediately since TF-IDF normalization only needs this
    /// document's own term frequencies.
    pub fn add_document(&mut self, doc_id: impl Into<String>, tokens: &[String]) -> Result<()> {
        let doc_id = doc_id.into();
        let mut term_counts: HashMap<String, u32> = HashMap::new();
        let mut term_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (position, term) in tokens.iter().enumerate() {
            *term_counts.entry(term.clone()).or_insert(0) += 1;
            term_positions
                .entry(term.clone())
                .or_default()
                .push(position as u32);
        }

        self.doc_lengths.insert(doc_id.clone(), tokens.len() as u32);
        self.total_docs += 1;

        let weights = match self.config.rsv {
            RankingModel::TfIdf => scorer::document_term_weights(&term_counts, self.config.doc_weighting),
            RankingModel::Bm25 => term_counts
                .iter()
                .map(|(term, &tf)| (term.clone(), tf as f64))
                .collect(),
        };

        for (term, positions) in term_positions {
            let weight = *weights.get(&term).unwrap_or(&0.0);
            let posting = Posting {
                doc_id: doc_id.clone(),
                weight,
                positions,
            };
            self.memory_estimate += POSTING_OVERHEAD_BYTES + posting.positions.len() * POSITION_BYTES;
            self.partial.entry(term).or_default().push(posting);
        }

        if self.memory_estimate >= self.config.memory_budget_bytes {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.partial.is_empty() {
            return Ok(());
        }
        let block_path = self.output_dir.join(format!("{}.txt", self.block_paths.len()));
        let tmp_path = block_path.with_extension("txt.tmp");
        debug!(path = %block_path.display(), terms = self.partial.len(), "spilling block to disk");
        posting_store::write_block(&tmp_path, &self.partial)?;
        std::fs::rename(&tmp_path, &block_path)?;
        self.block_paths.push(block_path);
        self.partial.clear();
        self.memory_estimate = 0;
        Ok(())
    }

    /// Flushes any remaining in-memory postings and returns the set of block
    /// files plus the per-document lengths collected along the way.
    pub fn finish(mut self) -> Result<BuiltBlocks> {
        self.spill()?;
        Ok(BuiltBlocks {
            block_paths: self.block_paths,
            doc_lengths: self.doc_lengths,
            total_docs: self.total_docs,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

pub struct BuiltBlocks {
    pub block_paths: Vec<PathBuf>,
    pub doc_lengths: BTreeMap<String, u32>,
    pub total_docs: u32,
}
