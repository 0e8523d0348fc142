//! Pending-URL set owned by the crawl loop. Workers never see it: they get a
//! [`QueuedUrl`] by value and hand back an outcome.

use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUrl {
    pub url: String,
    /// 0 for the first try, incremented on every transient failure.
    pub attempt: u32,
}

#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedUrl>,
    pending: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn seeded(url: String) -> Self {
        let mut frontier = Self::default();
        frontier.enqueue(url);
        frontier
    }

    /// Adds a newly discovered URL unless it is already pending or was
    /// dispatched earlier in this run.
    pub fn enqueue(&mut self, url: String) -> bool {
        if self.visited.contains(&url) || self.pending.contains(&url) {
            return false;
        }
        self.pending.insert(url.clone());
        self.queue.push_back(QueuedUrl { url, attempt: 0 });
        true
    }

    /// Puts a URL that failed transiently back in line for another attempt.
    pub fn requeue(&mut self, url: String, attempt: u32) {
        if self.pending.insert(url.clone()) {
            self.queue.push_back(QueuedUrl { url, attempt });
        }
    }

    pub fn pop(&mut self) -> Option<QueuedUrl> {
        let next = self.queue.pop_front()?;
        self.pending.remove(&next.url);
        self.visited.insert(next.url.clone());
        Some(next)
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.visited.contains(url) || self.pending.contains(url)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited(&self) -> usize {
        self.visited.len()
    }
}
