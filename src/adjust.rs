//! Application of edit adjusters to spans and locators.
//!
//! One document edit may batch several adjusters; they are always applied in
//! event order. Locator adjustment recurses through `tal` steps and through
//! locators nested inside `nta` arguments. External nodes are left alone —
//! their source document did not change.

use crate::edits::{adjust_through, EditAdjuster};
use crate::locator::{LocatorStep, NodeLocator, PropertyArg, TypeAtLoc};
use crate::position::{LineCol, Span};

/// Adjusts a start/end pair, restoring the original extent when both ends
/// collapse onto the same point. A zero-width collapse would otherwise
/// silently destroy a highlighted range.
fn adjust_range(adjusters: &[EditAdjuster], start: &mut LineCol, end: &mut LineCol) {
    let original = Span::new(*start, *end);
    let new_start = adjust_through(adjusters, *start);
    let mut new_end = adjust_through(adjusters, *end);

    if new_start == new_end && !original.is_empty() {
        let (dl, dc) = original.delta();
        new_end = LineCol::new(
            (new_start.line as i64 + dl).max(0) as u32,
            (new_start.column as i64 + dc).max(0) as u32,
        );
    }

    *start = new_start;
    *end = new_end;
}

/// Adjusts a span in place.
pub fn adjust_span(adjusters: &[EditAdjuster], span: &mut Span) {
    adjust_range(adjusters, &mut span.start, &mut span.end);
}

/// Adjusts a type-at-location in place. No-op for external nodes.
pub fn adjust_tal(adjusters: &[EditAdjuster], tal: &mut TypeAtLoc) {
    if tal.external {
        return;
    }
    let mut span = tal.span();
    adjust_range(adjusters, &mut span.start, &mut span.end);
    tal.set_span(span);
}

/// Adjusts a locator in place: its result, every `tal` step, and every
/// locator nested inside `nta` arguments.
pub fn adjust_locator(adjusters: &[EditAdjuster], locator: &mut NodeLocator) {
    adjust_tal(adjusters, &mut locator.result);
    for step in &mut locator.steps {
        match step {
            LocatorStep::Child(_) => {}
            LocatorStep::Tal(tal) => adjust_tal(adjusters, tal),
            LocatorStep::Nta(nta) => adjust_property_args(adjusters, &mut nta.args),
        }
    }
}

/// Adjusts every locator reachable from a property-argument list.
pub fn adjust_property_args(adjusters: &[EditAdjuster], args: &mut [PropertyArg]) {
    for arg in args {
        match arg {
            PropertyArg::Node(locator) => adjust_locator(adjusters, locator),
            PropertyArg::NodeArray(locators) => {
                for locator in locators {
                    adjust_locator(adjusters, locator);
                }
            }
            PropertyArg::Int(_)
            | PropertyArg::Bool(_)
            | PropertyArg::String(_)
            | PropertyArg::Null => {}
        }
    }
}
