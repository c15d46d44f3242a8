use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvaluation {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
    pub average_precision: f64,
}

/// Computes precision, recall, F-measure and average precision for one
/// ranked result list against its ground-truth relevant document set. The
/// caller is expected to have already truncated `ranked` to top-k.
pub fn evaluate(ranked: &[String], relevant: &HashSet<String>) -> QueryEvaluation {
    let mut true_positives = 0u32;
    let mut precision_sum = 0.0;

    for (i, doc_id) in ranked.iter().enumerate() {
        if relevant.contains(doc_id) {
            true_positives += 1;
            precision_sum += true_positives as f64 / (i + 1) as f64;
        }
    }

    let precision = if ranked.is_empty() {
        0.0
    } else {
        true_positives as f64 / ranked.len() as f64
    };
    let recall = if relevant.is_empty() {
        0.0
    } else {
        true_positives as f64 / relevant.len() as f64
    };
    let f_measure = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let average_precision = if true_positives == 0 {
        0.0
    } else {
        precision_sum / true_positives as f64
    };

    QueryEvaluation {
        precision,
        recall,
        f_measure,
        average_precision,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query_text: String,
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
    pub average_precision: f64,
    pub query_time_ms: f64,
}

/// Tracks per-query timings so the running mean and median can be reported
/// as the evaluation run progresses, matching how a search run narrates
/// its own latency as it goes.
#[derive(Debug, Default)]
pub struct QueryTimings {
    samples: Vec<f64>,
}

impl QueryTimings {
    pub fn new() -> Self {
        QueryTimings::default()
    }

    pub fn push(&mut self, elapsed_ms: f64) {
        self.samples.push(elapsed_ms);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    pub fn median(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

pub fn write_csv(path: &Path, reports: &[QueryReport]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for report in reports {
        writer.serialize(report)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn id_set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn perfect_ranking_scores_one_across_the_board() {
        let relevant = id_set(&["1", "2"]);
        let eval = evaluate(&ids(&["1", "2"]), &relevant);
        assert_eq!(eval.precision, 1.0);
        assert_eq!(eval.recall, 1.0);
        assert_eq!(eval.f_measure, 1.0);
        assert_eq!(eval.average_precision, 1.0);
    }

    #[test]
    fn average_precision_rewards_relevant_docs_ranked_earlier() {
        let relevant = id_set(&["1", "2"]);
        let early = evaluate(&ids(&["1", "2", "99"]), &relevant);
        let late = evaluate(&ids(&["99", "1", "2"]), &relevant);
        assert!(early.average_precision > late.average_precision);
    }

    #[test]
    fn empty_relevant_set_yields_zero_recall_and_ap() {
        let relevant: HashSet<String> = HashSet::new();
        let eval = evaluate(&ids(&["1", "2"]), &relevant);
        assert_eq!(eval.recall, 0.0);
        assert_eq!(eval.average_precision, 0.0);
    }

    #[test]
    fn median_handles_even_and_odd_sample_counts() {
        let mut timings = QueryTimings::new();
        timings.push(1.0);
        timings.push(3.0);
        assert_eq!(timings.median(), 2.0);
        timings.push(2.0);
        assert_eq!(timings.median(), 2.0);
    }
}
