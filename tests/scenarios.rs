use std::collections::HashMap;

use tempfile::TempDir;

use medindex::builder::{BuilderConfig, IndexBuilder};
use medindex::cache::PostingCache;
use medindex::merge::{self, MergeConfig};
use medindex::posting_store::{self, Posting};
use medindex::reader::PubMedDocument;
use medindex::scorer::{self, Bm25Params, DocWeighting, RankingModel, SearchConfig, Searcher, SmartNotation};
use medindex::spimi::{self, SpimiConfig};
use medindex::tokenizer::{Tokenizer, TokenizerConfig};
use medindex::window;

fn identity_tokenizer() -> Tokenizer {
    Tokenizer::new(TokenizerConfig {
        min_len: None,
        stopwords_path: None,
        stemmer: None,
    })
    .unwrap()
}

fn doc(pmid: &str, title: &str, abstract_text: &str) -> PubMedDocument {
    PubMedDocument {
        pmid: pmid.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
    }
}

/// S1 — a single-document collection under `lnc.lnc`: dictionary picks up
/// both terms, `alpha`'s weight matches the closed-form cosine-normalized
/// log-tf weight, and its positions land at token offsets 0 and 2.
#[test]
fn single_doc_collection_weights_and_positions() {
    let dir = TempDir::new().unwrap();
    let tokenizer = identity_tokenizer();

    let config = SpimiConfig {
        memory_budget_bytes: spimi::DEFAULT_MEMORY_BUDGET_BYTES,
        rsv: RankingModel::TfIdf,
        doc_weighting: DocWeighting::Lnc,
    };
    let output = spimi::run_index(
        vec![doc("1", "alpha beta", "alpha")].into_iter(),
        &tokenizer,
        dir.path(),
        config,
    )
    .unwrap();

    let alpha = output.term_dictionary.iter().find(|e| e.term == "alpha").unwrap();
    assert!(output.term_dictionary.iter().any(|e| e.term == "beta"));

    let postings = posting_store::find_postings(&output.shard_paths[alpha.shard_index], "alpha")
        .unwrap()
        .unwrap();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].doc_id, "1");

    let log_tf_alpha = 1.0 + 2f64.log10();
    let log_tf_beta = 1.0;
    let norm = (log_tf_alpha * log_tf_alpha + log_tf_beta * log_tf_beta).sqrt();
    let expected = scorer::round2(log_tf_alpha / norm);
    assert_eq!(postings[0].weight, expected);
    assert_eq!(postings[0].positions, vec![0, 2]);
}

/// S2 — two single-document spills merge into one shard whose lines are
/// ordered `a < b < c`, and `b` (shared by both documents) carries both
/// doc ids in its posting list.
#[test]
fn two_doc_merge_orders_terms_and_shares_postings() {
    let dir = TempDir::new().unwrap();
    let config = BuilderConfig {
        // force a spill after every document
        memory_budget_bytes: 1,
        rsv: RankingModel::TfIdf,
        doc_weighting: DocWeighting::Lnc,
    };
    let mut builder = IndexBuilder::new(dir.path(), config);
    builder
        .add_document("1", &["a".to_string(), "b".to_string()])
        .unwrap();
    builder
        .add_document("2", &["b".to_string(), "c".to_string()])
        .unwrap();
    let built = builder.finish().unwrap();
    assert_eq!(built.block_paths.len(), 2);

    let merged_dir = dir.path().join("merged");
    std::fs::create_dir_all(&merged_dir).unwrap();
    let output = merge::merge_blocks(&built.block_paths, &merged_dir, 2, MergeConfig::default()).unwrap();

    assert_eq!(output.shard_paths.len(), 1);
    let mut terms: Vec<&str> = output.term_dictionary.iter().map(|e| e.term.as_str()).collect();
    terms.sort();
    assert_eq!(terms, vec!["a", "b", "c"]);

    let b_postings = posting_store::find_postings(&output.shard_paths[0], "b").unwrap().unwrap();
    let mut doc_ids: Vec<&str> = b_postings.iter().map(|p| p.doc_id.as_str()).collect();
    doc_ids.sort();
    assert_eq!(doc_ids, vec!["1", "2"]);
}

/// S3 — closed-form BM25 contribution for a term with `N=4`, `df=2`,
/// `tf=3`, `dl/avdl=1.5`, under the default `k1=1.2, b=0.75`.
#[test]
fn bm25_scoring_matches_closed_form() {
    let idf = (4.0f64 / 2.0).log10();
    let params = Bm25Params { k1: 1.2, b: 0.75 };
    let score = scorer::bm25_term_score(3.0, idf, 1.5, params);

    let expected = idf * (2.2 * 3.0) / (1.2 * (0.25 + 0.75 * 1.5) + 3.0);
    assert!((score - expected).abs() < 1e-9);
}

/// S4 — window boost: a 5-position-wide covering window multiplies the
/// score by `10/(1+5)`; the same window with `B=2` is a no-op floor of 1.
#[test]
fn window_boost_rescales_score_and_floors_at_one() {
    let mut positions = HashMap::new();
    positions.insert("cat".to_string(), vec![5, 40]);
    positions.insert("dog".to_string(), vec![10]);

    let window = window::minimum_window(&positions, 2);
    assert_eq!(window, Some(5));

    let boosted = window::boost_multiplier(10, window);
    assert!((boosted - 10.0 / 6.0).abs() < 1e-9);

    let unboosted = window::boost_multiplier(2, window);
    assert_eq!(unboosted, 1.0);
}

/// S5 — with a cache sized for roughly one term's postings, loading three
/// distinct terms in sequence leaves only the most recently loaded term
/// resident; the earlier two are evicted LRU-first.
#[test]
fn cache_eviction_keeps_only_most_recently_loaded_term() {
    let posting = |doc_id: &str| Posting {
        doc_id: doc_id.to_string(),
        weight: 1.0,
        positions: vec![0],
    };

    // one posting costs ~32 (overhead) + 4 (one position) bytes, plus the
    // term's own byte length; size the budget for a single entry only.
    let mut cache = PostingCache::new(40);
    cache.insert("cat".to_string(), vec![posting("1")]);
    cache.insert("dog".to_string(), vec![posting("1")]);
    cache.insert("rat".to_string(), vec![posting("1")]);

    assert_eq!(cache.len(), 1);
    assert!(cache.get("rat").is_some());
    assert!(cache.get("cat").is_none());
    assert!(cache.get("dog").is_none());
}

/// S6 — five matching documents truncated to the top 3 by descending score.
#[test]
fn top_k_truncation_returns_highest_scores_in_order() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::create_dir_all(dir.path().join("merged")).unwrap();

    let mut shard = std::collections::BTreeMap::new();
    let postings: Vec<Posting> = [("1", 9.0), ("2", 8.0), ("3", 7.0), ("4", 6.0), ("5", 5.0)]
        .iter()
        .map(|&(doc_id, weight)| Posting {
            doc_id: doc_id.to_string(),
            weight,
            positions: vec![0],
        })
        .collect();
    shard.insert("alpha".to_string(), postings);
    posting_store::write_block(&dir.path().join("merged").join("00000;alpha_alpha.txt"), &shard).unwrap();
    posting_store::write_term_dictionary(
        &dir.path().join("data").join("terms_data.txt"),
        &[posting_store::TermDictionaryEntry {
            term: "alpha".to_string(),
            idf: 1.0,
            shard_index: 0,
        }],
    )
    .unwrap();
    posting_store::write_doc_lengths(&dir.path().join("data").join("docs_data.txt"), &[]).unwrap();

    let tokenizer = identity_tokenizer();
    let config = SearchConfig {
        rsv: RankingModel::Bm25,
        smart_notation: None,
        bm25: Bm25Params::default(),
        window_boost: None,
        topk: 3,
        cache_threshold_bytes: 1 << 20,
    };
    let mut searcher = Searcher::open(dir.path(), config).unwrap();
    let results = searcher.score("alpha", &tokenizer).unwrap();

    assert_eq!(results.len(), 3);
    let scores: Vec<f64> = results.iter().map(|(_, s)| *s).collect();
    let mut sorted_desc = scores.clone();
    sorted_desc.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(scores, sorted_desc);
    assert_eq!(results[0].0, "1");
}

/// Sanity check on the SMART notation parser used throughout the above
/// scenarios, so a typo in a scenario's setup fails loudly.
#[test]
fn smart_notation_parses_lnc_lnc() {
    let notation = SmartNotation::parse("lnc.lnc").unwrap();
    assert_eq!(notation.doc, DocWeighting::Lnc);
}
