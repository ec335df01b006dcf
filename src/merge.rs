//! Fair round-robin interleaving of per-directory result sequences

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

struct MergeState<T> {
    sources: Vec<VecDeque<T>>,
    /// Next source to try when a new one has to be chosen
    cursor: usize,
    /// Source the next element will come from, once chosen
    current: Option<usize>,
    /// Set after an element is taken; forces `current` to be re-chosen
    stale: bool,
}

impl<T> MergeState<T> {
    /// Choose the first non-exhausted source at or after the cursor
    fn select(&mut self) -> Option<usize> {
        if self.stale || self.current.is_none() {
            let n = self.sources.len();
            self.current = (0..n)
                .map(|step| (self.cursor + step) % n)
                .find(|&idx| !self.sources[idx].is_empty());
            if let Some(idx) = self.current {
                self.cursor = idx + 1;
            }
            self.stale = false;
        }
        self.current
    }
}

/// Interleaves several ordered sequences, taking one element from each live
/// source in turn. Exhausted sources are skipped.
pub struct RoundRobinMerger<T> {
    state: Mutex<MergeState<T>>,
}

impl<T> Default for RoundRobinMerger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RoundRobinMerger<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MergeState {
                sources: Vec::new(),
                cursor: 0,
                current: None,
                stale: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MergeState<T>> {
        // Bookkeeping stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a sequence; empty sequences are ignored
    pub fn add_source<I: IntoIterator<Item = T>>(&self, source: I) {
        let source: VecDeque<T> = source.into_iter().collect();
        if !source.is_empty() {
            self.lock().sources.push(source);
        }
    }

    pub fn has_next(&self) -> bool {
        self.lock().select().is_some()
    }

    /// Take the next element
    pub fn next_item(&self) -> Option<T> {
        let mut state = self.lock();
        let idx = state.select()?;
        let item = state.sources[idx].pop_front();
        state.stale = true;
        item
    }

    /// Drain all remaining elements in merge order
    pub fn into_vec(self) -> Vec<T> {
        self.collect()
    }
}

impl<T> Iterator for RoundRobinMerger<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.next_item()
    }
}

impl<T> FromIterator<Vec<T>> for RoundRobinMerger<T> {
    fn from_iter<I: IntoIterator<Item = Vec<T>>>(iter: I) -> Self {
        let merger = RoundRobinMerger::new();
        for source in iter {
            merger.add_source(source);
        }
        merger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_interleaves_in_turn() {
        let merger: RoundRobinMerger<&str> =
            vec![vec!["a1", "a2", "a3"], vec!["b1"], vec!["c1", "c2"]].into_iter().collect();
        assert_eq!(merger.into_vec(), vec!["a1", "b1", "c1", "a2", "c2", "a3"]);
    }

    #[test]
    fn test_empty_sources() {
        let merger: RoundRobinMerger<u32> = vec![vec![], vec![1, 2], vec![]].into_iter().collect();
        assert!(merger.has_next());
        assert_eq!(merger.into_vec(), vec![1, 2]);

        let none: RoundRobinMerger<u32> = RoundRobinMerger::new();
        assert!(!none.has_next());
        assert_eq!(none.next_item(), None);
    }

    #[test]
    fn test_has_next_does_not_consume() {
        let merger: RoundRobinMerger<u32> = vec![vec![1], vec![2]].into_iter().collect();
        assert!(merger.has_next());
        assert!(merger.has_next());
        assert_eq!(merger.next_item(), Some(1));
        assert_eq!(merger.next_item(), Some(2));
        assert!(!merger.has_next());
    }

    #[test]
    fn test_source_added_mid_merge() {
        let merger = RoundRobinMerger::new();
        merger.add_source(vec![1, 2]);
        assert_eq!(merger.next_item(), Some(1));
        merger.add_source(vec![10]);
        assert_eq!(merger.next_item(), Some(10));
        assert_eq!(merger.next_item(), Some(2));
        assert_eq!(merger.next_item(), None);
    }

    #[test]
    fn test_concurrent_consumers_take_each_element_once() {
        let merger = Arc::new(RoundRobinMerger::new());
        for s in 0..4u32 {
            merger.add_source((0..250u32).map(move |i| s * 1000 + i));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let merger = Arc::clone(&merger);
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(v) = merger.next_item() {
                        taken.push(v);
                    }
                    taken
                })
            })
            .collect();

        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        let mut expected: Vec<u32> = (0..4u32).flat_map(|s| (0..250u32).map(move |i| s * 1000 + i)).collect();
        expected.sort_unstable();
        assert_eq!(all, expected);
    }

    proptest! {
        #[test]
        fn prop_merge_is_fair_order_preserving_permutation(
            sources in prop::collection::vec(prop::collection::vec(0u32..1000, 0..12), 1..6)
        ) {
            let tagged: Vec<Vec<(usize, usize)>> = sources
                .iter()
                .enumerate()
                .map(|(s, seq)| (0..seq.len()).map(|i| (s, i)).collect())
                .collect();
            let merger: RoundRobinMerger<(usize, usize)> = tagged.clone().into_iter().collect();
            let output = merger.into_vec();

            let total: usize = sources.iter().map(Vec::len).sum();
            prop_assert_eq!(output.len(), total);

            // Each source's elements appear in their original order.
            for (s, seq) in tagged.iter().enumerate() {
                let from_source: Vec<_> = output.iter().filter(|(src, _)| *src == s).cloned().collect();
                prop_assert_eq!(&from_source, seq);
            }

            // A live source waits at most N-1 emissions, N being the live
            // count when its wait began.
            let mut remaining: Vec<usize> = sources.iter().map(Vec::len).collect();
            let initial_live = remaining.iter().filter(|&&r| r > 0).count();
            let mut waiting = vec![0usize; sources.len()];
            let mut bound = vec![initial_live; sources.len()];
            for (src, _) in &output {
                let live = remaining.iter().filter(|&&r| r > 0).count();
                for s in 0..sources.len() {
                    if s == *src {
                        waiting[s] = 0;
                        bound[s] = live;
                    } else if remaining[s] > 0 {
                        waiting[s] += 1;
                        prop_assert!(waiting[s] < bound[s]);
                    }
                }
                remaining[*src] -= 1;
            }
        }
    }
}
