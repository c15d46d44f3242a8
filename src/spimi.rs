use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::builder::{BuilderConfig, IndexBuilder};
use crate::error::Result;
use crate::merge::{self, MergeConfig};
use crate::posting_store::{self, DocLengthEntry, TermDictionaryEntry};
use crate::reader::PubMedDocument;
use crate::scorer::{round2, DocWeighting, RankingModel};
use crate::tokenizer::Tokenizer;

/// Default SPIMI memory budget: 2 GiB, matching spec.md's arbitrary
/// "available memory" figure. `IndexBuilder` spills once its own running
/// estimate crosses this threshold; nothing is queried from the OS.
pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct SpimiConfig {
    pub memory_budget_bytes: usize,
    pub rsv: RankingModel,
    pub doc_weighting: DocWeighting,
}

/// Statistics mirroring what the source's `print_statistics` reports
/// after an indexing run, surfaced here as a typed value instead of bare
/// console output so the CLI layer decides how to present it.
#[derive(Debug, Clone)]
pub struct IndexRunStats {
    pub total_docs: u32,
    pub vocabulary_size: usize,
    pub block_count: usize,
    pub index_size_bytes: u64,
    pub indexing_time_secs: f64,
    pub merging_time_secs: f64,
}

pub struct IndexRunOutput {
    pub shard_paths: Vec<PathBuf>,
    pub term_dictionary: Vec<TermDictionaryEntry>,
    pub total_docs: u32,
    pub stats: IndexRunStats,
}

/// Drives one end-to-end SPIMI indexing run: streams documents through the
/// tokenizer into the in-memory builder (which spills blocks on its own),
/// then hands the resulting blocks to the k-way merger and writes the
/// term dictionary and (for BM25) the document-length table.
///
/// `output_root` is the index's top-level output folder; block files live
/// directly under it for the duration of the run, merged shards land in
/// `output_root/merged`, and the term dictionary / doc-length table land
/// in `output_root/data`.
pub fn run_index(
    documents: impl Iterator<Item = PubMedDocument>,
    tokenizer: &Tokenizer,
    output_root: &Path,
    config: SpimiConfig,
) -> Result<IndexRunOutput> {
    fs::create_dir_all(output_root)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let builder_config = BuilderConfig {
        memory_budget_bytes: config.memory_budget_bytes,
        rsv: config.rsv,
        doc_weighting: config.doc_weighting,
    };
    let mut builder = IndexBuilder::new(output_root, builder_config);

    let index_start = Instant::now();
    let mut doc_lengths_for_avdl: BTreeMap<String, u32> = BTreeMap::new();
    let mut total_docs = 0u32;

    for document in documents {
        // joined with a space so a title ending mid-word never fuses with
        // the abstract's first word into a single spurious token.
        let text = format!("{} {}", document.title, document.abstract_text);
        let tokens = tokenizer.tokenize(&text);

        if config.rsv == RankingModel::Bm25 {
            doc_lengths_for_avdl.insert(document.pmid.clone(), tokens.len() as u32);
        }

        builder.add_document(document.pmid, &tokens)?;
        total_docs += 1;

        if total_docs % 1000 == 0 {
            spinner.set_message(format!("indexed {total_docs} documents"));
        }
    }

    let built = builder.finish()?;
    let indexing_time_secs = index_start.elapsed().as_secs_f64();
    spinner.finish_with_message(format!("indexed {} documents", built.total_docs));

    info!(
        blocks = built.block_paths.len(),
        total_docs = built.total_docs,
        "finished streaming documents, starting merge"
    );

    let merge_start = Instant::now();
    let merged_dir = output_root.join("merged");
    fs::create_dir_all(&merged_dir)?;
    let merge_output = merge::merge_blocks(
        &built.block_paths,
        &merged_dir,
        built.total_docs,
        MergeConfig::default(),
    )?;
    let merging_time_secs = merge_start.elapsed().as_secs_f64();

    let data_dir = output_root.join("data");
    fs::create_dir_all(&data_dir)?;
    posting_store::write_term_dictionary(
        &data_dir.join("terms_data.txt"),
        &merge_output.term_dictionary,
    )?;

    if config.rsv == RankingModel::Bm25 {
        write_doc_lengths(&data_dir.join("docs_data.txt"), &doc_lengths_for_avdl)?;
    }

    let index_size_bytes = merge_output
        .shard_paths
        .iter()
        .filter_map(|path| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();

    let stats = IndexRunStats {
        total_docs: built.total_docs,
        vocabulary_size: merge_output.term_dictionary.len(),
        block_count: built.block_paths.len(),
        index_size_bytes,
        indexing_time_secs,
        merging_time_secs,
    };

    Ok(IndexRunOutput {
        shard_paths: merge_output.shard_paths,
        term_dictionary: merge_output.term_dictionary,
        total_docs: built.total_docs,
        stats,
    })
}

/// Writes `doc_id,dl/avdl` for every document seen during indexing, per
/// spec.md §4.1's document-length file format.
fn write_doc_lengths(path: &Path, doc_lengths: &BTreeMap<String, u32>) -> Result<()> {
    if doc_lengths.is_empty() {
        return posting_store::write_doc_lengths(path, &[]);
    }
    let total: u64 = doc_lengths.values().map(|&len| len as u64).sum();
    let avdl = total as f64 / doc_lengths.len() as f64;

    let entries: Vec<DocLengthEntry> = doc_lengths
        .iter()
        .map(|(doc_id, &len)| DocLengthEntry {
            doc_id: doc_id.clone(),
            normalized_length: round2(if avdl > 0.0 { len as f64 / avdl } else { 0.0 }),
        })
        .collect();
    posting_store::write_doc_lengths(path, &entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TokenizerConfig;
    use tempfile::TempDir;

    fn doc(pmid: &str, title: &str, abstract_text: &str) -> PubMedDocument {
        PubMedDocument {
            pmid: pmid.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
        }
    }

    #[test]
    fn indexes_a_tiny_collection_end_to_end() {
        let dir = TempDir::new().unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig {
            min_len: None,
            stopwords_path: None,
            stemmer: None,
        })
        .unwrap();

        let docs = vec![
            doc("1", "alpha beta", "alpha"),
            doc("2", "beta gamma", "gamma"),
        ];
        let config = SpimiConfig {
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            rsv: RankingModel::TfIdf,
            doc_weighting: DocWeighting::Lnc,
        };

        let output = run_index(docs.into_iter(), &tokenizer, dir.path(), config).unwrap();

        assert_eq!(output.total_docs, 2);
        assert!(output
            .term_dictionary
            .iter()
            .any(|e| e.term == "alpha"));
        assert!(dir.path().join("data/terms_data.txt").exists());
        assert!(!dir.path().join("0.txt").exists());
    }

    #[test]
    fn bm25_run_writes_doc_length_table() {
        let dir = TempDir::new().unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig {
            min_len: None,
            stopwords_path: None,
            stemmer: None,
        })
        .unwrap();

        let docs = vec![doc("1", "alpha", "alpha beta"), doc("2", "beta", "gamma")];
        let config = SpimiConfig {
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            rsv: RankingModel::Bm25,
            doc_weighting: DocWeighting::Lnc,
        };

        run_index(docs.into_iter(), &tokenizer, dir.path(), config).unwrap();

        let doc_lengths = posting_store::read_doc_lengths(&dir.path().join("data/docs_data.txt")).unwrap();
        assert_eq!(doc_lengths.len(), 2);
    }
}
