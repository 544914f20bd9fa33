// src/crawl/frontier.rs
// =============================================================================
// The frontier: URLs we have discovered but not visited yet.
//
// - `queue` is a real FIFO (VecDeque): push at the back, take from the front
// - `queued` mirrors the queue for O(1) "already waiting?" checks
// - `visited` only ever grows; membership there is how we dedup
//
// A URL is in at most one of `queued` / `visited`. take_batch() moves URLs
// out of the queue and straight into `visited`, so no two tasks of a batch
// can ever see the same URL as unvisited.
//
// URL identity is exact string equality. "/a" and "/a/" are different URLs.
// =============================================================================

use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Already visited or already waiting
    Duplicate,
    /// The frontier is at capacity; the URL was dropped
    Full,
}

#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<String>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    capacity: usize,
}

impl Frontier {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            capacity,
        }
    }

    /// Adds `url` unless it was seen before or the frontier is full.
    pub fn offer(&mut self, url: &str) -> Offer {
        if self.visited.contains(url) || self.queued.contains(url) {
            return Offer::Duplicate;
        }
        if self.queue.len() >= self.capacity {
            return Offer::Full;
        }
        self.queued.insert(url.to_string());
        self.queue.push_back(url.to_string());
        Offer::Queued
    }

    /// Removes up to `n` URLs from the front and marks them visited.
    pub fn take_batch(&mut self, n: usize) -> Vec<String> {
        let take = n.min(self.queue.len());
        let batch: Vec<String> = self.queue.drain(..take).collect();
        for url in &batch {
            self.queued.remove(url);
            self.mark_visited(url);
        }
        batch
    }

    /// Records `url` as visited. Calling it twice is harmless.
    pub fn mark_visited(&mut self, url: &str) {
        if self.queued.remove(url) {
            self.queue.retain(|queued| queued != url);
        }
        self.visited.insert(url.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of URLs waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_come_out_in_insertion_order() {
        let mut frontier = Frontier::new(100);
        for path in ["a", "b", "c", "d", "e"] {
            frontier.offer(&format!("https://example.test/{}", path));
        }

        let first = frontier.take_batch(4);
        assert_eq!(
            first,
            vec![
                "https://example.test/a",
                "https://example.test/b",
                "https://example.test/c",
                "https://example.test/d",
            ]
        );
        assert_eq!(frontier.take_batch(4), vec!["https://example.test/e"]);
        assert!(frontier.take_batch(4).is_empty());
    }

    #[test]
    fn test_taken_urls_are_visited_and_not_requeued() {
        let mut frontier = Frontier::new(100);
        frontier.offer("https://example.test/");
        frontier.take_batch(4);

        assert_eq!(frontier.visited_count(), 1);
        assert_eq!(frontier.offer("https://example.test/"), Offer::Duplicate);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_duplicate_offer_while_queued() {
        let mut frontier = Frontier::new(100);
        assert_eq!(frontier.offer("https://example.test/a"), Offer::Queued);
        assert_eq!(frontier.offer("https://example.test/a"), Offer::Duplicate);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_no_normalization() {
        let mut frontier = Frontier::new(100);
        assert_eq!(frontier.offer("https://example.test/a"), Offer::Queued);
        assert_eq!(frontier.offer("https://example.test/a/"), Offer::Queued);
        assert_eq!(frontier.offer("https://example.test/a#x"), Offer::Queued);
    }

    #[test]
    fn test_capacity_drops_new_urls() {
        let mut frontier = Frontier::new(2);
        assert_eq!(frontier.offer("https://example.test/1"), Offer::Queued);
        assert_eq!(frontier.offer("https://example.test/2"), Offer::Queued);
        assert_eq!(frontier.offer("https://example.test/3"), Offer::Full);

        frontier.take_batch(1);
        assert_eq!(frontier.offer("https://example.test/3"), Offer::Queued);
    }

    #[test]
    fn test_mark_visited_is_idempotent_and_dequeues() {
        let mut frontier = Frontier::new(100);
        frontier.offer("https://example.test/a");
        frontier.mark_visited("https://example.test/a");
        frontier.mark_visited("https://example.test/a");

        assert!(frontier.is_empty());
        assert_eq!(frontier.visited_count(), 1);
    }
}
