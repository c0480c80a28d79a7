//! Bounded cache of query embeddings.
//!
//! Keys are normalized query strings. When the cache is full the oldest
//! inserted entry is evicted, regardless of how recently it was read.

use std::collections::{HashMap, VecDeque};

/// FIFO-evicting map from normalized query text to its embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    capacity: usize,
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Lower-cased, trimmed form of a query used as the cache key.
    pub fn normalize_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    pub fn get(&self, query: &str) -> Option<&Vec<f32>> {
        self.entries.get(&Self::normalize_key(query))
    }

    /// Insert a vector, evicting the oldest entry first when full.
    ///
    /// Re-inserting an existing key replaces the vector without changing its
    /// position in the eviction order.
    pub fn insert(&mut self, query: &str, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let key = Self::normalize_key(query);
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = vector;
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, vector);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
