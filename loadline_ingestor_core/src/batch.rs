use loadline_storage::Point;

/// A contiguous slice of a payload, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of the batch inside its payload.
    pub sequence: usize,
    pub points: Vec<Point>,
}

/// Number of points written and dropped for one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadOutcome {
    /// Number of batches attempted.
    pub batches: usize,
    /// Points durably written.
    pub rows_written: usize,
    /// Points dropped because their batch failed.
    pub rows_failed: usize,
    /// Batches that failed and were dropped.
    pub failed_batches: usize,
}

impl Batch {
    pub fn new(sequence: usize, points: Vec<Point>) -> Self {
        Self { sequence, points }
    }

    /// Split a payload into batches of `batch_size` points.
    ///
    /// Only the last batch may be shorter. An empty payload produces no batches.
    pub fn split(points: Vec<Point>, batch_size: usize) -> Vec<Batch> {
        let batch_size = batch_size.max(1);
        let mut batches = Vec::with_capacity(points.len().div_ceil(batch_size));
        let mut points = points.into_iter().peekable();

        while points.peek().is_some() {
            let chunk = points.by_ref().take(batch_size).collect::<Vec<_>>();
            batches.push(Batch::new(batches.len(), chunk));
        }

        batches
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
