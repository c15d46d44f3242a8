use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medindex::metadata::IndexMetadata;
use medindex::metrics::{self, QueryReport, QueryTimings};
use medindex::reader::{DocumentReader, QueryReader};
use medindex::scorer::{Bm25Params, DocWeighting, RankingModel, SearchConfig, Searcher, SmartNotation};
use medindex::spimi::{self, SpimiConfig, DEFAULT_MEMORY_BUDGET_BYTES};
use medindex::tokenizer::{StemmerKind, Tokenizer, TokenizerConfig};
use medindex::window;

/// `medindex` — SPIMI-built inverted index and ranked retrieval engine for
/// biomedical abstracts. Two modes mirroring the two halves of the data
/// plane: `index` builds a persistent index from a gzip JSON-Lines
/// collection, `search` answers a zip-of-JSON-Lines query set against it.
#[derive(Parser)]
#[command(name = "medindex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an inverted index from a gzip-compressed JSON-Lines collection.
    Index {
        /// Path to the gzip JSON-Lines document collection.
        collection: PathBuf,
        /// Folder where index artifacts (merged shards, term dictionary,
        /// doc-length table) are written.
        out_folder: PathBuf,

        /// Ranking model: "tfidf" or "bm25".
        #[arg(long, default_value = "tfidf")]
        rsv: String,
        /// SMART notation for tfidf: "lnc.ltc", "lnc.lnc", or "lnu.ltc".
        #[arg(long, default_value = "lnc.ltc")]
        smart_notation: String,
        /// Minimum token character length; absent means unbounded.
        #[arg(long)]
        min_len: Option<usize>,
        /// Path to a newline-delimited stopword file.
        #[arg(long)]
        stopwords: Option<PathBuf>,
        /// Stemmer identifier: "potterNLTK" or "showball".
        #[arg(long)]
        stemmer: Option<String>,
        /// SPIMI memory budget in mebibytes before a block is spilled.
        #[arg(long, default_value_t = DEFAULT_MEMORY_BUDGET_BYTES / (1024 * 1024))]
        memory_budget_mb: usize,
    },
    /// Answer a zip-of-JSON-Lines query set against a previously built index.
    Search {
        /// Path to the zip archive of evaluation queries.
        queries: PathBuf,
        /// Folder holding a previously built index.
        index_folder: PathBuf,

        /// BM25 k1 parameter (only used when the index's rsv is bm25).
        #[arg(long, default_value_t = 1.2)]
        k1: f64,
        /// BM25 b parameter (only used when the index's rsv is bm25).
        #[arg(long, default_value_t = 0.75)]
        b: f64,
        /// Window-boost factor B; a no-op unless this parses as a positive
        /// integer.
        #[arg(long)]
        window_boost: Option<String>,
        /// Number of top-ranked documents to return per query.
        #[arg(long, default_value_t = 10)]
        topk: usize,
        /// Append one evaluation row per scored query to this CSV file.
        #[arg(long)]
        metrics_csv: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Index {
            collection,
            out_folder,
            rsv,
            smart_notation,
            min_len,
            stopwords,
            stemmer,
            memory_budget_mb,
        } => run_index_command(
            &collection,
            &out_folder,
            &rsv,
            &smart_notation,
            min_len,
            stopwords,
            stemmer,
            memory_budget_mb,
        ),
        Commands::Search {
            queries,
            index_folder,
            k1,
            b,
            window_boost,
            topk,
            metrics_csv,
        } => run_search_command(&queries, &index_folder, k1, b, window_boost, topk, metrics_csv),
    }
}

fn metadata_path(index_root: &Path) -> PathBuf {
    index_root.join("metadata").join("metadata.json")
}

#[allow(clippy::too_many_arguments)]
fn run_index_command(
    collection: &Path,
    out_folder: &Path,
    rsv: &str,
    smart_notation: &str,
    min_len: Option<usize>,
    stopwords: Option<PathBuf>,
    stemmer: Option<String>,
    memory_budget_mb: usize,
) -> anyhow::Result<()> {
    // configuration errors are surfaced before any reader/tokenizer/indexer
    // object does work, per spec.md §7.
    let model = RankingModel::parse(rsv)?;
    let notation = match model {
        RankingModel::TfIdf => Some(SmartNotation::parse(smart_notation)?),
        RankingModel::Bm25 => None,
    };
    let stemmer_kind = stemmer.as_deref().map(StemmerKind::parse).transpose()?;

    if !collection.exists() {
        bail!("document collection not found: {}", collection.display());
    }
    if let Some(path) = &stopwords {
        if !path.exists() {
            bail!("stopwords file not found: {}", path.display());
        }
    }

    if out_folder.join("data").join("terms_data.txt").exists() {
        warn!(
            folder = %out_folder.display(),
            "previous index files found in output folder; they will be overwritten by the merge"
        );
    }

    let tokenizer_config = TokenizerConfig {
        min_len,
        stopwords_path: stopwords.clone(),
        stemmer: stemmer_kind,
    };
    let tokenizer = Tokenizer::new(tokenizer_config.clone())?;

    let doc_weighting = notation.map(|n| n.doc).unwrap_or(DocWeighting::Lnc);

    info!(collection = %collection.display(), out_folder = %out_folder.display(), ?model, "starting indexing run");

    let reader = DocumentReader::open(collection).context("opening document collection")?;

    let spimi_config = SpimiConfig {
        memory_budget_bytes: memory_budget_mb * 1024 * 1024,
        rsv: model,
        doc_weighting,
    };

    let start = Instant::now();
    let output = spimi::run_index(reader, &tokenizer, out_folder, spimi_config)?;
    let total_elapsed = start.elapsed();

    let metadata = IndexMetadata {
        index_output_folder: out_folder.to_path_buf(),
        rsv: model,
        smart_notation: notation,
        tokenizer: tokenizer_config,
        total_docs: output.total_docs,
    };
    let metadata_path = metadata_path(out_folder);
    fs::create_dir_all(metadata_path.parent().unwrap())?;
    metadata.save(&metadata_path)?;

    println!("\n:: Statistics ::");
    println!("> Total indexing time: {:.3} seconds", output.stats.indexing_time_secs);
    println!("> Total merging time: {:.3} seconds", output.stats.merging_time_secs);
    println!("> Number of temporary block files: {}", output.stats.block_count);
    println!(
        "> Total index size: {:.3} MiB",
        output.stats.index_size_bytes as f64 / 1_048_576.0
    );
    println!("> Vocabulary size (number of terms): {}", output.stats.vocabulary_size);
    println!("> Total documents indexed: {}", output.total_docs);
    println!("> Wall-clock time: {:.3?}", total_elapsed);

    Ok(())
}

fn run_search_command(
    queries_path: &Path,
    index_folder: &Path,
    k1: f64,
    b: f64,
    window_boost: Option<String>,
    topk: usize,
    metrics_csv: Option<PathBuf>,
) -> anyhow::Result<()> {
    let metadata_path = metadata_path(index_folder);
    if !metadata_path.exists() {
        bail!("could not load index metadata at {}", metadata_path.display());
    }
    let metadata = IndexMetadata::load(&metadata_path)?;

    if !index_folder.join("data").join("terms_data.txt").exists() {
        bail!(
            "missing term dictionary at {}",
            index_folder.join("data").join("terms_data.txt").display()
        );
    }

    let tokenizer = Tokenizer::new(metadata.tokenizer.clone())?;

    let window_boost_value = window_boost.as_deref().and_then(window::parse_boost_factor);

    let config = SearchConfig {
        rsv: metadata.rsv,
        smart_notation: metadata.smart_notation,
        bm25: Bm25Params { k1, b },
        window_boost: window_boost_value,
        topk,
        cache_threshold_bytes: 20 * 1024 * 1024,
    };
    let mut searcher = Searcher::open(index_folder, config).context("opening index")?;

    let queries = QueryReader::read_all(queries_path).context("reading query archive")?;
    info!(count = queries.len(), "loaded evaluation queries");

    let mut timings = QueryTimings::new();
    let mut reports: Vec<QueryReport> = Vec::new();
    let mut answered = 0usize;
    let mut skipped = 0usize;

    for query in queries {
        println!("{}", query.query_text);
        let start = Instant::now();

        let results = match searcher.score(&query.query_text, &tokenizer) {
            Ok(results) => results,
            Err(e) => {
                eprintln!("query failed: {e}");
                continue;
            }
        };

        if results.is_empty() {
            println!("No matching documents found.");
            skipped += 1;
            continue;
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        timings.push(elapsed_ms);
        answered += 1;

        let ranked: Vec<String> = results.into_iter().map(|(doc_id, _)| doc_id).collect();
        let eval = metrics::evaluate(&ranked, &query.relevant_docs);

        println!("Precision: {:.2}", eval.precision);
        println!("Recall: {:.2}", eval.recall);
        println!("F-measure: {:.2}", eval.f_measure);
        println!("Average Precision: {:.2}", eval.average_precision);
        println!("Query Time: {:.2} ms", elapsed_ms);
        println!("Average Query Time: {:.2} ms", timings.mean());
        println!("Median Query Time: {:.2} ms", timings.median());

        reports.push(QueryReport {
            query_text: query.query_text.clone(),
            precision: eval.precision,
            recall: eval.recall,
            f_measure: eval.f_measure,
            average_precision: eval.average_precision,
            query_time_ms: elapsed_ms,
        });
    }

    print_summary(&reports, answered, skipped, &timings);

    if let Some(path) = metrics_csv {
        metrics::write_csv(&path, &reports)?;
    }

    Ok(())
}

fn print_summary(reports: &[QueryReport], answered: usize, skipped: usize, timings: &QueryTimings) {
    println!("\n:: Summary ::");
    println!("> Queries answered: {answered}");
    println!("> Queries skipped (no matches): {skipped}");
    if !reports.is_empty() {
        let n = reports.len() as f64;
        let mean_precision: f64 = reports.iter().map(|r| r.precision).sum::<f64>() / n;
        let mean_recall: f64 = reports.iter().map(|r| r.recall).sum::<f64>() / n;
        let mean_f: f64 = reports.iter().map(|r| r.f_measure).sum::<f64>() / n;
        let mean_ap: f64 = reports.iter().map(|r| r.average_precision).sum::<f64>() / n;
        println!("> Mean Precision: {mean_precision:.2}");
        println!("> Mean Recall: {mean_recall:.2}");
        println!("> Mean F-measure: {mean_f:.2}");
        println!("> Mean Average Precision: {mean_ap:.2}");
    }
    println!("> Mean Query Time: {:.2} ms", timings.mean());
    println!("> Median Query Time: {:.2} ms", timings.median());
}
