use std::sync::atomic::{AtomicUsize, Ordering};

/// Run-wide completion counter behind the `[i/total]` log prefix.
///
/// Every call to [`ProgressCounter::advance`] returns a distinct index, so
/// indices form the gapless sequence `1..=n` after `n` completions no matter
/// which thread completes first.
#[derive(Debug)]
pub struct ProgressCounter {
    completed: AtomicUsize,
    total: usize,
}

impl ProgressCounter {
    /// Creates a counter for `total` items.
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Records one completion and returns its 1-based index.
    pub fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Completions recorded so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Number of items the run started with.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Formats the `[i/total]` prefix for an index.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        format!("[{index}/{}]", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_sequential_advance() {
        let counter = ProgressCounter::new(3);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.completed(), 2);
        assert_eq!(counter.label(2), "[2/3]");
        assert_eq!(counter.total(), 3);
    }

    #[test]
    fn test_concurrent_advance_is_gapless() {
        for n in [1usize, 10, 100] {
            let counter = ProgressCounter::new(n);
            let seen = Mutex::new(Vec::with_capacity(n));

            std::thread::scope(|s| {
                for _ in 0..n {
                    s.spawn(|| {
                        let index = counter.advance();
                        seen.lock().unwrap().push(index);
                    });
                }
            });

            let mut seen = seen.into_inner().unwrap();
            seen.sort_unstable();
            assert_eq!(seen, (1..=n).collect::<Vec<_>>());
            assert_eq!(counter.completed(), n);
        }
    }
}
