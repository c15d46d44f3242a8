use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::posting_store::{self, BlockCursor, Posting, TermDictionaryEntry};
use crate::scorer::round2;

#[derive(Debug, Clone, Copy)]
pub struct MergeConfig {
    pub shard_size_threshold_bytes: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            shard_size_threshold_bytes: 20 * 1024 * 1024,
        }
    }
}

pub struct MergeOutput {
    pub shard_paths: Vec<PathBuf>,
    pub term_dictionary: Vec<TermDictionaryEntry>,
}

const POSTING_OVERHEAD_BYTES: usize = 32;

/// K-way merges sorted block files into term-complete shards, computing
/// each term's document frequency (and therefore idf) as the merge goes,
/// since idf needs the full corpus-wide posting list for that term.
pub fn merge_blocks(
    block_paths: &[PathBuf],
    output_dir: &Path,
    total_docs: u32,
    config: MergeConfig,
) -> Result<MergeOutput> {
    let mut cursors: Vec<BlockCursor> = block_paths
        .iter()
        .map(|path| BlockCursor::open(path))
        .collect::<Result<_>>()?;

    let mut accumulator: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
    let mut accumulator_bytes = 0usize;
    let mut shard_paths = Vec::new();
    let mut shard_index = 0usize;
    let mut term_dictionary = Vec::new();
    let mut shard_first_term: Option<String> = None;
    let mut shard_last_term: Option<String> = None;

    loop {
        let min_term = cursors
            .iter()
            .filter_map(|c| c.peek_term())
            .min()
            .map(|s| s.to_string());

        let Some(min_term) = min_term else {
            break;
        };

        let mut merged_postings = Vec::new();
        for cursor in cursors.iter_mut() {
            if cursor.peek_term() == Some(min_term.as_str()) {
                if let Some((_, postings)) = cursor.take()? {
                    merged_postings.extend(postings);
                }
            }
        }
        merged_postings.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        let df = merged_postings.len() as f64;
        let idf = round2((total_docs as f64 / df).log10());

        accumulator_bytes += min_term.len()
            + merged_postings.len() * POSTING_OVERHEAD_BYTES
            + merged_postings
                .iter()
                .map(|p| p.positions.len() * 4)
                .sum::<usize>();

        if shard_first_term.is_none() {
            shard_first_term = Some(min_term.clone());
        }
        shard_last_term = Some(min_term.clone());

        term_dictionary.push(TermDictionaryEntry {
            term: min_term.clone(),
            idf,
            shard_index,
        });
        accumulator.insert(min_term, merged_postings);

        if accumulator_bytes >= config.shard_size_threshold_bytes {
            flush_shard(
                output_dir,
                shard_index,
                &shard_first_term,
                &shard_last_term,
                &accumulator,
                &mut shard_paths,
            )?;
            accumulator.clear();
            accumulator_bytes = 0;
            shard_index += 1;
            shard_first_term = None;
            shard_last_term = None;
        }
    }

    if !accumulator.is_empty() {
        flush_shard(
            output_dir,
            shard_index,
            &shard_first_term,
            &shard_last_term,
            &accumulator,
            &mut shard_paths,
        )?;
    }

    for block_path in block_paths {
        let _ = std::fs::remove_file(block_path);
    }

    Ok(MergeOutput {
        shard_paths,
        term_dictionary,
    })
}

/// Shard filenames are `<shard_index>;<first_term>_<last_term>.txt`,
/// zero-padded so lexicographic filename order equals term-range order.
fn flush_shard(
    output_dir: &Path,
    shard_index: usize,
    first_term: &Option<String>,
    last_term: &Option<String>,
    accumulator: &BTreeMap<String, Vec<Posting>>,
    shard_paths: &mut Vec<PathBuf>,
) -> Result<()> {
    let first = sanitize_for_filename(first_term.as_deref().unwrap_or("x"));
    let last = sanitize_for_filename(last_term.as_deref().unwrap_or("x"));
    let path = output_dir.join(format!("{shard_index:05};{first}_{last}.txt"));
    debug!(path = %path.display(), terms = accumulator.len(), "flushing merged shard");
    posting_store::write_block(&path, accumulator)?;
    shard_paths.push(path);
    Ok(())
}

fn sanitize_for_filename(term: &str) -> String {
    let cleaned: String = term
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(24)
        .collect();
    if cleaned.is_empty() {
        "x".to_string()
    } else {
        cleaned
    }
}
