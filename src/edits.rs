//! Translation of editor change events into position adjusters.
//!
//! Every change event carries one or more range replacements. Each
//! replacement becomes one [`EditAdjuster`]: a pure function remapping an old
//! `(line, column)` to its best-guess value after the edit. Adjusters for one
//! event form a pipeline — later replacements are applied to the
//! already-adjusted coordinates of earlier ones.
//!
//! The remapping is an approximation. It is superseded by the corrected
//! locators the evaluation service returns on the next completed round trip.

use crate::position::{is_within_start_end, LineCol};

/// One range replacement from a change event: the range `[start, end)` is
/// replaced by `text`. `replaced` carries the pre-edit content of the range
/// when the document layer has it at hand, letting no-op replacements
/// translate to identity adjusters.
#[derive(Debug, Clone)]
pub struct RangeReplacement {
    pub start: LineCol,
    pub end: LineCol,
    pub text: String,
    pub replaced: Option<String>,
}

impl RangeReplacement {
    pub fn new(start: LineCol, end: LineCol, text: impl Into<String>) -> Self {
        RangeReplacement { start, end, text: text.into(), replaced: None }
    }

    pub fn with_replaced(mut self, replaced: impl Into<String>) -> Self {
        self.replaced = Some(replaced.into());
        self
    }
}

/// Shape of a piece of inserted text: how many lines it spans and how wide
/// its last line is. Lengths are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextShape {
    newlines: u32,
    tail_len: u32,
    total_len: u32,
}

impl TextShape {
    fn of(text: &str) -> Self {
        let newlines = text.matches('\n').count() as u32;
        let tail = match text.rfind('\n') {
            Some(idx) => &text[idx + 1..],
            None => text,
        };
        TextShape {
            newlines,
            tail_len: tail.chars().count() as u32,
            total_len: text.chars().count() as u32,
        }
    }
}

/// A pure position remapping derived from one range replacement.
///
/// The mapping composes a deletion step (collapse the replaced range onto its
/// start) with an insertion step (shift by the shape of the inserted text).
/// When a position sat inside a non-empty replaced range, the earlier of the
/// deletion-only and post-insertion candidates wins, so a selected node's
/// anchor never jumps past freshly typed replacement text.
#[derive(Debug, Clone)]
pub struct EditAdjuster {
    del_start: LineCol,
    del_end: LineCol,
    ins: TextShape,
    identity: bool,
}

impl EditAdjuster {
    pub fn from_replacement(replacement: &RangeReplacement) -> Self {
        let identity = replacement
            .replaced
            .as_deref()
            .map(|old| old == replacement.text)
            .unwrap_or(false);
        EditAdjuster {
            del_start: replacement.start,
            del_end: replacement.end,
            ins: TextShape::of(&replacement.text),
            identity,
        }
    }

    /// An adjuster that maps every position to itself.
    pub fn identity() -> Self {
        EditAdjuster {
            del_start: LineCol::new(0, 0),
            del_end: LineCol::new(0, 0),
            ins: TextShape { newlines: 0, tail_len: 0, total_len: 0 },
            identity: true,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Remaps one position through the deletion and insertion steps.
    pub fn adjust(&self, pos: LineCol) -> LineCol {
        if self.identity {
            return pos;
        }

        let inside_deleted = !self.del_start.eq(&self.del_end)
            && is_within_start_end(
                self.del_start.packed(),
                self.del_end.packed(),
                pos.packed(),
            );

        let after_deletion = self.delete_step(pos);
        let after_insertion = self.insert_step(after_deletion);

        if inside_deleted && after_insertion != after_deletion {
            // Two candidates exist; the earlier one wins.
            std::cmp::min(after_deletion, after_insertion)
        } else {
            after_insertion
        }
    }

    fn delete_step(&self, pos: LineCol) -> LineCol {
        let (start, end) = (self.del_start, self.del_end);
        if pos.packed() < start.packed() {
            return pos;
        }
        if pos.line == end.line && pos.column >= end.column {
            return if start.line == end.line {
                LineCol::new(pos.line, pos.column - (end.column - start.column))
            } else {
                LineCol::new(start.line, start.column + (pos.column - end.column))
            };
        }
        if pos.line > end.line {
            return LineCol::new(pos.line - (end.line - start.line), pos.column);
        }
        // Within [start, end): collapse onto the deletion start.
        start
    }

    fn insert_step(&self, pos: LineCol) -> LineCol {
        let at = self.del_start;
        if pos.packed() < at.packed() {
            return pos;
        }
        if pos.line == at.line {
            return if self.ins.newlines == 0 {
                LineCol::new(pos.line, pos.column + self.ins.total_len)
            } else {
                LineCol::new(
                    pos.line + self.ins.newlines,
                    self.ins.tail_len + (pos.column - at.column),
                )
            };
        }
        LineCol::new(pos.line + self.ins.newlines, pos.column)
    }
}

/// Translates one change event into its adjuster pipeline, in event order.
pub fn adjusters_for_event(replacements: &[RangeReplacement]) -> Vec<EditAdjuster> {
    replacements.iter().map(EditAdjuster::from_replacement).collect()
}

/// Applies a pipeline of adjusters to one position, in order.
pub fn adjust_through(adjusters: &[EditAdjuster], pos: LineCol) -> LineCol {
    adjusters.iter().fold(pos, |p, adj| adj.adjust(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    fn adjuster(start: (u32, u32), end: (u32, u32), text: &str) -> EditAdjuster {
        EditAdjuster::from_replacement(&RangeReplacement::new(
            LineCol::new(start.0, start.1),
            LineCol::new(end.0, end.1),
            text,
        ))
    }

    #[test]
    fn noop_replacement_is_identity() {
        let adj = EditAdjuster::from_replacement(
            &RangeReplacement::new(LineCol::new(2, 4), LineCol::new(2, 7), "abc")
                .with_replaced("abc"),
        );
        assert!(adj.is_identity());
        fn prop(line: u32, col: u32) -> TestResult {
            let pos = LineCol::new(line & 0xffff, col & 0xfff);
            let adj = EditAdjuster::from_replacement(
                &RangeReplacement::new(LineCol::new(2, 4), LineCol::new(2, 7), "abc")
                    .with_replaced("abc"),
            );
            TestResult::from_bool(adj.adjust(pos) == pos)
        }
        QuickCheck::new().tests(500).quickcheck(prop as fn(u32, u32) -> TestResult);
    }

    #[test]
    fn single_line_insertion_shifts_tail_only() {
        // Insert 3 chars at (5, 10).
        let adj = adjuster((5, 10), (5, 10), "foo");
        for col in 10..20 {
            assert_eq!(adj.adjust(LineCol::new(5, col)), LineCol::new(5, col + 3));
        }
        for col in 0..10 {
            assert_eq!(adj.adjust(LineCol::new(5, col)), LineCol::new(5, col));
        }
        assert_eq!(adj.adjust(LineCol::new(4, 30)), LineCol::new(4, 30));
        assert_eq!(adj.adjust(LineCol::new(6, 2)), LineCol::new(6, 2));
    }

    #[test]
    fn multi_line_insertion_shifts_later_lines_down() {
        // Two newlines inserted at (3, 2).
        let adj = adjuster((3, 2), (3, 2), "a\nbb\nccc");
        assert_eq!(adj.adjust(LineCol::new(7, 5)), LineCol::new(9, 5));
        assert_eq!(adj.adjust(LineCol::new(3, 1)), LineCol::new(3, 1));
        // On the insertion line at/after the insertion column the column is
        // rebased onto the inserted text's last line.
        assert_eq!(adj.adjust(LineCol::new(3, 6)), LineCol::new(5, 7));
    }

    #[test]
    fn single_line_deletion_collapses_and_shifts() {
        // Delete cols [4, 9) on line 2.
        let adj = adjuster((2, 4), (2, 9), "");
        assert_eq!(adj.adjust(LineCol::new(2, 3)), LineCol::new(2, 3));
        assert_eq!(adj.adjust(LineCol::new(2, 4)), LineCol::new(2, 4));
        assert_eq!(adj.adjust(LineCol::new(2, 6)), LineCol::new(2, 4));
        assert_eq!(adj.adjust(LineCol::new(2, 9)), LineCol::new(2, 4));
        assert_eq!(adj.adjust(LineCol::new(2, 12)), LineCol::new(2, 7));
        assert_eq!(adj.adjust(LineCol::new(3, 1)), LineCol::new(3, 1));
    }

    #[test]
    fn multi_line_deletion_rebases_end_line() {
        // Delete (1, 3) through (3, 2).
        let adj = adjuster((1, 3), (3, 2), "");
        assert_eq!(adj.adjust(LineCol::new(2, 40)), LineCol::new(1, 3));
        assert_eq!(adj.adjust(LineCol::new(3, 1)), LineCol::new(1, 3));
        assert_eq!(adj.adjust(LineCol::new(3, 6)), LineCol::new(1, 7));
        assert_eq!(adj.adjust(LineCol::new(5, 9)), LineCol::new(3, 9));
    }

    #[test]
    fn replace_keeps_interior_anchor_at_start() {
        // "hello" at (0, 2)..(0, 7) replaced by "hi".
        let adj = adjuster((0, 2), (0, 7), "hi");
        // Interior positions collapse onto the start and stay there; the
        // insertion must not push them past the replacement text.
        assert_eq!(adj.adjust(LineCol::new(0, 4)), LineCol::new(0, 2));
        assert_eq!(adj.adjust(LineCol::new(0, 7)), LineCol::new(0, 2));
        // Positions past the range shift by the length difference.
        assert_eq!(adj.adjust(LineCol::new(0, 10)), LineCol::new(0, 7));
    }

    #[test]
    fn replace_with_shorter_text_at_exact_boundary() {
        // Pins the earlier-candidate rule for replace-with-shorter edits so
        // any change to the heuristic fails loudly instead of drifting.
        let adj = adjuster((1, 5), (1, 9), "xy");
        assert_eq!(adj.adjust(LineCol::new(1, 5)), LineCol::new(1, 5));
        assert_eq!(adj.adjust(LineCol::new(1, 9)), LineCol::new(1, 5));
        assert_eq!(adj.adjust(LineCol::new(1, 11)), LineCol::new(1, 9));
    }

    #[test]
    fn pipeline_applies_in_event_order() {
        let replacements = vec![
            RangeReplacement::new(LineCol::new(0, 0), LineCol::new(0, 0), "ab"),
            RangeReplacement::new(LineCol::new(0, 4), LineCol::new(0, 6), ""),
        ];
        let adjusters = adjusters_for_event(&replacements);
        assert_eq!(adjusters.len(), 2);
        // (0, 5) -> insert shifts to (0, 7) -> deletion of [4, 6) leaves it
        // at (0, 5) after the two-char removal.
        assert_eq!(adjust_through(&adjusters, LineCol::new(0, 5)), LineCol::new(0, 5));
    }
}
