use std::time::{Duration, Instant};

/// A fully resolved value plus bookkeeping. Entries are replaced, never edited.
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub stored_at: Instant,
    pub version: u64, // bumps each time the key is replaced
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            stored_at: Instant::now(),
            version: 0,
        }
    }

    /// Build the entry that replaces `self`
    #[must_use]
    pub fn successor(&self, data: T) -> Self {
        Self {
            data,
            stored_at: Instant::now(),
            version: self.version + 1,
        }
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_bumps_version() {
        let first = CachedData::new(vec![1, 2, 3]);
        assert_eq!(first.version, 0);

        let second = first.successor(vec![4]);
        assert_eq!(second.version, 1);
        assert_eq!(second.data, vec![4]);
        assert!(second.stored_at >= first.stored_at);
    }
}
