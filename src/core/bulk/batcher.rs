//! Batcher
//!
//! Slices the ordered record list into contiguous, fixed-size batches. Each
//! record keeps its position in the original request.

use super::types::BulkRecord;

/// A contiguous slice of the input records
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based batch number
    pub index: usize,
    /// `(record_index, record)` pairs in input order
    pub records: Vec<(usize, BulkRecord)>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Savepoint name recorded when this batch completes
    pub fn savepoint_name(&self) -> String {
        format!("batch-{}", self.index)
    }
}

/// Iterator yielding batches in input order
#[derive(Debug)]
pub struct Batcher<I> {
    records: I,
    batch_size: usize,
    next_index: usize,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = (usize, BulkRecord)>,
{
    /// `batch_size` of zero is treated as one
    pub fn new(records: impl IntoIterator<IntoIter = I>, batch_size: usize) -> Self {
        Self {
            records: records.into_iter(),
            batch_size: batch_size.max(1),
            next_index: 0,
        }
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = (usize, BulkRecord)>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        let records: Vec<_> = self.records.by_ref().take(self.batch_size).collect();
        if records.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.next_index,
            records,
        };
        self.next_index += 1;
        Some(batch)
    }
}

/// Number of batches needed for `total` records
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

/// Batch a full record list, numbering records from zero
pub fn split_into_batches(records: Vec<BulkRecord>, batch_size: usize) -> Vec<Batch> {
    Batcher::new(records.into_iter().enumerate(), batch_size).collect()
}
