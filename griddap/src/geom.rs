use std::ops::Range;

use super::helpers::rearrange;

/// A half open range of indices along one axis.
///
/// Bounds are always ordered and a window always covers at least one index.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexWindow {
    pub start: usize,
    pub end: usize,
    _private: (),
}

impl IndexWindow {
    /// Bounds are reordered so that `start <= end`, and a degenerate window is widened by one.
    ///
    pub fn new(start: usize, end: usize) -> Self {
        let (start, end) = rearrange(start, end);
        let end = if start == end { end + 1 } else { end };
        Self {
            start,
            end,
            _private: (),
        }
    }

    /// The whole of an axis of length `len`
    ///
    pub fn full(len: usize) -> Self {
        Self::new(0, len)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Index windows for every axis of one variable.
///
/// `time` is `None` for variables without a time dimension and `depth` is `None` for variables
/// without a vertical dimension.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub time: Option<IndexWindow>,
    pub depth: Option<IndexWindow>,
    pub y: IndexWindow,
    pub x: IndexWindow,
}

impl Window {
    /// Number of records covered, a variable without a time dimension counts as one record
    ///
    pub fn instants(&self) -> usize {
        self.time.map_or(1, |time| time.len())
    }

    pub fn levels(&self) -> Option<usize> {
        self.depth.map(|depth| depth.len())
    }

    pub fn rows(&self) -> usize {
        self.y.len()
    }

    pub fn cols(&self) -> usize {
        self.x.len()
    }

    /// Number of dimensions of the variable this window applies to
    ///
    pub fn ndim(&self) -> usize {
        2 + self.time.is_some() as usize + self.depth.is_some() as usize
    }

    /// Index ranges to read from a source for the given records of this window.
    ///
    /// `records` are indices into whichever file is being read, which for aggregated datasets
    /// differ from the indices of the logical time window. `records` is ignored for variables
    /// without a time dimension.
    ///
    pub fn ranges(&self, records: Range<usize>) -> Vec<Range<usize>> {
        let mut ranges = Vec::with_capacity(4);
        if self.time.is_some() {
            ranges.push(records);
        }
        if let Some(depth) = self.depth {
            ranges.push(depth.range());
        }
        ranges.push(self.y.range());
        ranges.push(self.x.range());

        ranges
    }

    /// Shape of retrieved data: `(records, [levels,] rows, cols)`.
    ///
    pub fn shape(&self, records: usize) -> Vec<usize> {
        let mut shape = Vec::with_capacity(4);
        shape.push(records);
        if let Some(levels) = self.levels() {
            shape.push(levels);
        }
        shape.push(self.rows());
        shape.push(self.cols());

        shape
    }
}
