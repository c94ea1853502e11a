//! Stable partitioning of document ids across reindex workers

use super::ReindexError;
use serde::Serialize;

/// The slice of the id space owned by one worker.
///
/// A document belongs to worker `w` of `n` when
/// `(java_string_hash(id) & i32::MAX) % n == w`, so the partitions of
/// `0..n` are disjoint and together cover every id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub worker: u32,
    pub workers: u32,
}

impl Partition {
    pub fn new(worker: u32, workers: u32) -> Result<Self, ReindexError> {
        if workers == 0 || worker >= workers {
            return Err(ReindexError::InvalidPartition { worker, workers });
        }
        Ok(Self { worker, workers })
    }

    /// Every partition for `workers` workers
    pub fn all(workers: u32) -> Result<Vec<Self>, ReindexError> {
        (0..workers).map(|worker| Self::new(worker, workers)).collect()
    }

    /// Worker that owns `id` when the id space is split `workers` ways
    pub fn owner_of(id: &str, workers: u32) -> u32 {
        let hash = (java_string_hash(id) & i32::MAX) as u32;
        hash % workers.max(1)
    }

    pub fn contains(&self, id: &str) -> bool {
        Self::owner_of(id, self.workers) == self.worker
    }
}

/// `31 * h + c` over UTF-16 code units with wrapping `i32` arithmetic.
pub fn java_string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_string_hash() {
        assert_eq!(java_string_hash(""), 0);
        assert_eq!(java_string_hash("a"), 97);
        assert_eq!(java_string_hash("hello"), 99_162_322);
        // overflows into the negative range
        assert_eq!(java_string_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn test_partitions_are_disjoint_and_exhaustive() {
        let ids: Vec<String> = (0..2_000).map(|n| format!("page-{}", n)).collect();
        for workers in [1u32, 2, 3, 7, 10] {
            let partitions = Partition::all(workers).unwrap();
            for id in &ids {
                let owners = partitions.iter().filter(|p| p.contains(id)).count();
                assert_eq!(owners, 1, "id {} owned by {} of {} workers", id, owners, workers);
            }
        }
    }

    #[test]
    fn test_negative_hash_is_masked() {
        let partition = Partition::new(0, 4).unwrap();
        // i32::MIN & i32::MAX == 0
        assert!(partition.contains("polygenelubricants"));
    }

    #[test]
    fn test_invalid_partition() {
        assert!(Partition::new(3, 3).is_err());
        assert!(Partition::new(0, 0).is_err());
        assert!(Partition::all(0).unwrap().is_empty());
    }
}
