//! Load generation allocation

use std::sync::atomic::{AtomicU64, Ordering};

use crate::LoadGeneration;

/// Thread-safe allocator of monotonically increasing load generations
///
/// Every (re)load of a script gets a fresh generation so that two loads of the
/// same file can always be told apart.
pub struct GenerationCounter {
    next: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next generation
    pub fn next(&self) -> LoadGeneration {
        LoadGeneration(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_generations_increase() {
        let counter = GenerationCounter::new();
        let a = counter.next();
        let b = counter.next();
        assert!(b > a);
    }

    #[test]
    fn test_generations_unique_across_threads() {
        let counter = Arc::new(GenerationCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || (0..100).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
