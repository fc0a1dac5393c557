//! Packed source positions and spans.
//!
//! The evaluation service reports node locations as single integers packing
//! `(line, column)` as `(line << 12) | column`. All span containment and
//! ordering in the server is defined over that packing, so the packed order
//! must agree with lexicographic `(line, column)` order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of low bits reserved for the column.
pub const COLUMN_BITS: u32 = 12;

/// Largest representable column, inclusive.
pub const MAX_COLUMN: u32 = (1 << COLUMN_BITS) - 1;

/// A `(line, column)` pair packed into a single `u32`.
///
/// Columns occupy the low [`COLUMN_BITS`] bits, so integer order over the
/// packed value is exactly lexicographic `(line, column)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackedPos(pub u32);

impl PackedPos {
    pub fn new(line: u32, column: u32) -> Self {
        debug_assert!(column <= MAX_COLUMN, "column {} out of range", column);
        PackedPos((line << COLUMN_BITS) | (column & MAX_COLUMN))
    }

    pub fn line(self) -> u32 {
        self.0 >> COLUMN_BITS
    }

    pub fn column(self) -> u32 {
        self.0 & MAX_COLUMN
    }

    pub fn line_col(self) -> LineCol {
        LineCol { line: self.line(), column: self.column() }
    }
}

impl From<LineCol> for PackedPos {
    fn from(pos: LineCol) -> Self {
        PackedPos::new(pos.line, pos.column)
    }
}

impl fmt::Display for PackedPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line(), self.column())
    }
}

/// An unpacked `(line, column)` pair. Both components are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl LineCol {
    pub fn new(line: u32, column: u32) -> Self {
        LineCol { line, column }
    }

    pub fn packed(self) -> PackedPos {
        PackedPos::from(self)
    }
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Returns true iff `pos` lies within `[start, end]` under packed ordering.
pub fn is_within_start_end(start: PackedPos, end: PackedPos, pos: PackedPos) -> bool {
    start <= pos && pos <= end
}

/// A contiguous source range, inclusive of both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: LineCol,
    pub end: LineCol,
}

impl Span {
    pub fn new(start: LineCol, end: LineCol) -> Self {
        Span { start, end }
    }

    /// A span covering columns `[col_start, col_end]` of a single line.
    pub fn on_line(line: u32, col_start: u32, col_end: u32) -> Self {
        Span {
            start: LineCol::new(line, col_start),
            end: LineCol::new(line, col_end),
        }
    }

    pub fn contains(&self, pos: LineCol) -> bool {
        is_within_start_end(self.start.packed(), self.end.packed(), pos.packed())
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Line and column deltas from start to end. Columns may go negative for
    /// multi-line spans ending left of their start column.
    pub fn delta(&self) -> (i64, i64) {
        (
            self.end.line as i64 - self.start.line as i64,
            self.end.column as i64 - self.start.column as i64,
        )
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    #[test]
    fn round_trip_all_columns() {
        fn prop(line: u32, column: u32) -> TestResult {
            let line = line & 0x000f_ffff;
            if column > MAX_COLUMN {
                return TestResult::discard();
            }
            let packed = PackedPos::new(line, column);
            TestResult::from_bool(packed.line() == line && packed.column() == column)
        }
        QuickCheck::new()
            .tests(1000)
            .quickcheck(prop as fn(u32, u32) -> TestResult);
    }

    #[test]
    fn packed_order_is_lexicographic() {
        fn prop(a: (u32, u32), b: (u32, u32)) -> TestResult {
            let (al, ac) = (a.0 & 0x000f_ffff, a.1 & MAX_COLUMN);
            let (bl, bc) = (b.0 & 0x000f_ffff, b.1 & MAX_COLUMN);
            let lex = (al, ac).cmp(&(bl, bc));
            let packed = PackedPos::new(al, ac).cmp(&PackedPos::new(bl, bc));
            TestResult::from_bool(lex == packed)
        }
        QuickCheck::new()
            .tests(1000)
            .quickcheck(prop as fn((u32, u32), (u32, u32)) -> TestResult);
    }

    #[test]
    fn containment_is_inclusive() {
        let start = PackedPos::new(2, 4);
        let end = PackedPos::new(4, 1);
        assert!(is_within_start_end(start, end, start));
        assert!(is_within_start_end(start, end, end));
        assert!(is_within_start_end(start, end, PackedPos::new(3, 4000)));
        assert!(!is_within_start_end(start, end, PackedPos::new(2, 3)));
        assert!(!is_within_start_end(start, end, PackedPos::new(4, 2)));
    }

    #[test]
    fn span_delta_tracks_both_axes() {
        let span = Span::new(LineCol::new(1, 5), LineCol::new(3, 2));
        assert_eq!(span.delta(), (2, -3));
        assert!(!span.is_empty());
        assert!(span.contains(LineCol::new(2, 0)));
    }
}
