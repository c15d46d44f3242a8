use std::collections::HashMap;

/// Parses the `--window-boost` CLI value. The boost only applies when the
/// value parses as a positive integer; anything else (including the
/// literal "None") disables it.
pub fn parse_boost_factor(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|&b| b > 0)
}

/// Finds the smallest span of token positions that covers at least
/// `required_distinct` of the query's terms, via a linear two-pointer
/// sweep over the merged, position-sorted occurrence list.
pub fn minimum_window(term_positions: &HashMap<String, Vec<u32>>, required_distinct: usize) -> Option<u32> {
    if required_distinct == 0 {
        return Some(0);
    }
    if term_positions.len() < required_distinct {
        return None;
    }

    let mut merged: Vec<(u32, &str)> = term_positions
        .iter()
        .flat_map(|(term, positions)| positions.iter().map(move |&p| (p, term.as_str())))
        .collect();
    merged.sort_by_key(|&(pos, _)| pos);

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut distinct = 0usize;
    let mut left = 0usize;
    let mut best: Option<u32> = None;

    for right in 0..merged.len() {
        let (_, term) = merged[right];
        let entry = counts.entry(term).or_insert(0);
        *entry += 1;
        if *entry == 1 {
            distinct += 1;
        }

        while distinct >= required_distinct {
            let window = merged[right].0 - merged[left].0;
            best = Some(best.map_or(window, |b| b.min(window)));

            let (_, left_term) = merged[left];
            if let Some(count) = counts.get_mut(left_term) {
                *count -= 1;
                if *count == 0 {
                    distinct -= 1;
                }
            }
            left += 1;
        }
    }

    best
}

/// `max(1, B/(1+window))`
pub fn boost_multiplier(b: u64, window: Option<u32>) -> f64 {
    match window {
        Some(window) => (b as f64 / (1.0 + window as f64)).max(1.0),
        None => 1.0,
    }
}
