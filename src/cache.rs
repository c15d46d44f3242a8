use std::num::NonZeroUsize;

use lru::LruCache;

use crate::posting_store::Posting;

const POSTING_OVERHEAD_BYTES: usize = 32;

fn estimate_size(term: &str, postings: &[Posting]) -> usize {
    term.len()
        + postings
            .iter()
            .map(|p| POSTING_OVERHEAD_BYTES + p.positions.len() * 4)
            .sum::<usize>()
}

/// Bounded posting cache keyed by term. Eviction is driven by a total byte
/// budget rather than entry count, using `lru`'s access-order tracking to
/// pick victims.
pub struct PostingCache {
    cache: LruCache<String, Vec<Posting>>,
    current_bytes: usize,
    threshold_bytes: usize,
}

impl PostingCache {
    pub fn new(threshold_bytes: usize) -> Self {
        PostingCache {
            cache: LruCache::new(NonZeroUsize::new(usize::MAX).unwrap()),
            current_bytes: 0,
            threshold_bytes,
        }
    }

    pub fn get(&mut self, term: &str) -> Option<Vec<Posting>> {
        self.cache.get(term).cloned()
    }

    pub fn insert(&mut self, term: String, postings: Vec<Posting>) {
        if let Some(previous) = self.cache.peek(&term) {
            self.current_bytes = self
                .current_bytes
                .saturating_sub(estimate_size(&term, previous));
        }
        self.current_bytes += estimate_size(&term, &postings);
        self.cache.put(term, postings);

        while self.current_bytes > self.threshold_bytes {
            match self.cache.pop_lru() {
                Some((evicted_term, evicted_postings)) => {
                    self.current_bytes = self
                        .current_bytes
                        .saturating_sub(estimate_size(&evicted_term, &evicted_postings));
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postings(n: usize) -> Vec<Posting> {
        (0..n as u32)
            .map(|doc_id| Posting {
                doc_id: doc_id.to_string(),
                weight: 1.0,
                positions: vec![0, 1, 2],
            })
            .collect()
    }

    #[test]
    fn returns_cached_postings() {
        let mut cache = PostingCache::new(1 << 20);
        cache.insert("alpha".to_string(), postings(3));
        assert_eq!(cache.get("alpha").unwrap().len(), 3);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn evicts_least_recently_used_when_over_budget() {
        let mut cache = PostingCache::new(200);
        cache.insert("alpha".to_string(), postings(2));
        cache.insert("beta".to_string(), postings(2));
        // touch alpha so beta becomes the least recently used entry
        let _ = cache.get("alpha");
        cache.insert("gamma".to_string(), postings(2));

        assert!(cache.get("alpha").is_some());
        assert!(cache.get("gamma").is_some());
        assert!(cache.len() <= 2);
    }
}
