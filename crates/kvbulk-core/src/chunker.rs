//! Splits an ordered record sequence into store-sized chunks.

use std::iter::FusedIterator;

use crate::error::BulkError;
use crate::record::{Chunk, Record};

/// Number of chunks `len` records produce at `size` records per chunk.
pub fn chunk_count(len: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        len.div_ceil(size)
    }
}

/// Lazily split `records` into chunks of at most `size` records.
///
/// Every record lands in exactly one chunk, in input order; only the last
/// chunk may be short. Fails if `size` is zero.
pub fn chunk(records: Vec<Record>, size: usize) -> Result<Chunks, BulkError> {
    if size == 0 {
        return Err(BulkError::invalid("chunk size must be positive"));
    }
    Ok(Chunks {
        records: records.into_iter(),
        size,
        next_index: 0,
    })
}

/// Iterator returned by [`chunk`].
#[derive(Debug)]
pub struct Chunks {
    records: std::vec::IntoIter<Record>,
    size: usize,
    next_index: usize,
}

impl Chunks {
    /// Records not yet handed out in a chunk.
    pub fn remaining_records(&self) -> usize {
        self.records.len()
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let records: Vec<Record> = self.records.by_ref().take(self.size).collect();
        if records.is_empty() {
            return None;
        }
        let chunk = Chunk::from_parts(self.next_index, records);
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = chunk_count(self.records.len(), self.size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}

impl FusedIterator for Chunks {}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::new().with("id", i.to_string())).collect()
    }

    #[test]
    fn zero_size_rejected() {
        let err = chunk(records(3), 0).unwrap_err();
        assert!(matches!(err, BulkError::InvalidArgument(_)));
    }

    #[test]
    fn chunk_count_is_ceiling() {
        for len in [0usize, 1, 24, 25, 26, 49, 50, 51, 1000] {
            for size in [1usize, 7, 25] {
                let chunks: Vec<Chunk> = chunk(records(len), size).unwrap().collect();
                assert_eq!(chunks.len(), len.div_ceil(size), "len={len} size={size}");
                assert!(chunks.iter().all(|c| c.len() <= size && !c.is_empty()));
            }
        }
    }

    #[test]
    fn concatenation_preserves_order() {
        let input = records(53);
        let chunks: Vec<Chunk> = chunk(input.clone(), 25).unwrap().collect();
        assert_eq!(chunks.iter().map(Chunk::len).collect::<Vec<_>>(), vec![25, 25, 3]);
        assert_eq!(
            chunks.iter().map(Chunk::index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        let flat: Vec<Record> = chunks.into_iter().flat_map(Chunk::into_records).collect();
        assert_eq!(flat, input);
    }

    #[test]
    fn exact_size_tracks_progress() {
        let mut chunks = chunk(records(60), 25).unwrap();
        assert_eq!(chunks.len(), 3);
        chunks.next();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.remaining_records(), 35);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut chunks = chunk(Vec::new(), 25).unwrap();
        assert_eq!(chunks.len(), 0);
        assert!(chunks.next().is_none());
    }
}
