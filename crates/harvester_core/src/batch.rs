use std::ops::Range;

/// A slice of the work list handed to one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub items: Vec<String>,
    pub offset_start: usize,
    /// The batch reaches the end of the work list.
    pub is_last: bool,
}

impl Batch {
    pub fn offset_end(&self) -> usize {
        self.offset_start + self.items.len()
    }
}

/// End of the grid cell containing `offset`.
///
/// Cells are aligned to multiples of `batch_size` from absolute position 0,
/// so a batch started mid-cell (after a resume) is shorter than `batch_size`.
pub fn cell_end(offset: usize, batch_size: usize, total: usize) -> usize {
    let batch_size = batch_size.max(1);
    ((offset / batch_size) + 1)
        .saturating_mul(batch_size)
        .min(total)
}

/// The range of the next batch starting at `offset`, or `None` when nothing remains.
pub fn batch_range(offset: usize, batch_size: usize, total: usize) -> Option<Range<usize>> {
    if offset >= total {
        return None;
    }
    let end = cell_end(offset, batch_size, total);
    (offset < end).then_some(offset..end)
}

/// Builds the next batch from the full work list.
pub fn next_batch(items: &[String], offset: usize, batch_size: usize) -> Option<Batch> {
    let range = batch_range(offset, batch_size, items.len())?;
    Some(Batch {
        index: range.start / batch_size.max(1),
        is_last: range.end >= items.len(),
        offset_start: range.start,
        items: items[range].to_vec(),
    })
}

/// What the scheduler does after a batch reported its chunk progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Every item of the batch was covered; continue from `offset`.
    Next { offset: usize },
    /// Some progress but the batch ended early; stop and resume from `offset` next run.
    Partial { offset: usize },
    /// Nothing new was processed; stop scheduling.
    Stalled { offset: usize },
}

pub fn advance(batch: &Batch, chunk_processed: usize) -> Advance {
    if chunk_processed == 0 {
        return Advance::Stalled {
            offset: batch.offset_start,
        };
    }
    let offset = batch.offset_start + chunk_processed.min(batch.items.len());
    if chunk_processed < batch.items.len() {
        Advance::Partial { offset }
    } else {
        Advance::Next { offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn grid_is_aligned_to_absolute_zero() {
        assert_eq!(cell_end(0, 4, 10), 4);
        assert_eq!(cell_end(5, 4, 10), 8);
        assert_eq!(cell_end(9, 4, 10), 10);
        assert_eq!(batch_range(6, 4, 10), Some(6..8));
        assert_eq!(batch_range(10, 4, 10), None);
    }

    #[test]
    fn every_index_is_covered_by_exactly_one_batch() {
        for total in 1..30 {
            for batch_size in 1..9 {
                for resume in 0..total {
                    let mut covered = vec![0u32; total];
                    let mut offset = resume;
                    while let Some(range) = batch_range(offset, batch_size, total) {
                        assert!(range.end % batch_size == 0 || range.end == total);
                        for i in range.clone() {
                            covered[i] += 1;
                        }
                        offset = range.end;
                    }
                    assert!(covered[..resume].iter().all(|c| *c == 0));
                    assert!(covered[resume..].iter().all(|c| *c == 1));
                }
            }
        }
    }

    #[test]
    fn resumed_first_batch_is_short() {
        let items = labels(10);
        let batch = next_batch(&items, 5, 4).unwrap();
        assert_eq!(batch.index, 1);
        assert_eq!(batch.items, vec!["w5", "w6", "w7"]);
        assert!(!batch.is_last);

        let last = next_batch(&items, 8, 4).unwrap();
        assert_eq!(last.index, 2);
        assert!(last.is_last);
        assert_eq!(last.offset_end(), 10);
    }

    #[test]
    fn advance_classifies_progress() {
        let batch = next_batch(&labels(8), 4, 4).unwrap();
        assert_eq!(advance(&batch, 4), Advance::Next { offset: 8 });
        assert_eq!(advance(&batch, 1), Advance::Partial { offset: 5 });
        assert_eq!(advance(&batch, 0), Advance::Stalled { offset: 4 });
    }
}
