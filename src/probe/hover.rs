//! Hover provider and highlight state for probe contents.
//!
//! Hover resolves the probe under the cursor and reports both the textual
//! token being hovered and the span of the AST node it currently resolves
//! to, so the hosting editor can flash the node. The active highlight lives
//! in an explicit [`InteractionState`] handed to the provider; each new hover
//! target replaces the previous highlight.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::position::{LineCol, Span};
use crate::probe::matcher::{lenient_match_at, parse_chain_only, LineMatch, ParseMode, TokenSpan};
use crate::probe::resolver::{ChainResolver, Resolution, VariableValue};
use crate::rpc::models::render_markdown;
use crate::rpc::provider::EvaluationProvider;

/// The pair of spans a hover highlights: the probe token under the cursor
/// and the AST node it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveHighlight {
    pub token: Span,
    pub node: Option<Span>,
}

/// Explicit pointer/interaction state. One instance is owned by the hosting
/// layer and passed into the hover provider; there is no ambient global.
#[derive(Debug, Default)]
pub struct InteractionState {
    active: Mutex<Option<ActiveHighlight>>,
}

impl InteractionState {
    /// Installs a new highlight (or none), returning the cancelled previous
    /// one.
    pub fn replace(&self, highlight: Option<ActiveHighlight>) -> Option<ActiveHighlight> {
        std::mem::replace(&mut *self.active.lock(), highlight)
    }

    pub fn clear(&self) -> Option<ActiveHighlight> {
        self.replace(None)
    }

    pub fn current(&self) -> Option<ActiveHighlight> {
        self.active.lock().clone()
    }
}

/// A computed hover: markdown contents plus the highlight pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverOutcome {
    pub contents: String,
    pub token_span: Span,
    pub node_span: Option<Span>,
}

fn line_span(line: u32, token: TokenSpan) -> Span {
    Span::on_line(line, token.start, token.end.saturating_sub(1).max(token.start))
}

/// Computes the hover for a cursor position and installs its highlight in
/// the interaction state. An abandoned resolution (transport failure or
/// `stopped`) yields `None` and clears the highlight — no failure is
/// rendered for it.
pub async fn hover_at(
    provider: &dyn EvaluationProvider,
    variables: &FxHashMap<String, VariableValue>,
    line_text: &str,
    pos: LineCol,
    interaction: &InteractionState,
) -> Option<HoverOutcome> {
    let outcome = compute_hover(provider, variables, line_text, pos).await;
    interaction.replace(outcome.as_ref().map(|o| ActiveHighlight {
        token: o.token_span,
        node: o.node_span,
    }));
    outcome
}

async fn compute_hover(
    provider: &dyn EvaluationProvider,
    variables: &FxHashMap<String, VariableValue>,
    line_text: &str,
    pos: LineCol,
) -> Option<HoverOutcome> {
    let found = lenient_match_at(pos.line, line_text, pos.column)?;
    let chain = match &found {
        LineMatch::Probe(probe) => probe.lhs.clone(),
        LineMatch::Assignment(assignment) => {
            if !assignment.src_val_span.contains_inclusive(pos.column) {
                return None;
            }
            let src_chars: Vec<char> = assignment.src_val.chars().collect();
            parse_chain_only(&src_chars, assignment.src_val_span.start, ParseMode::Lenient)?
        }
    };

    let resolver = ChainResolver::new(provider, variables);

    // Hovering the target token flashes the target node itself; hovering an
    // attribute flashes the node reached through the chain up to and
    // including that attribute.
    if chain.node_type_span.contains_inclusive(pos.column) {
        let target = resolver.resolve_target(&chain, pos.line).await.ok()?;
        let token_span = line_span(pos.line, chain.node_type_span);
        let node_span = target.span();
        let contents = format!(
            "`{}` at {}",
            target.result.short_name(),
            node_span
        );
        return Some(HoverOutcome { contents, token_span, node_span: Some(node_span) });
    }

    let hovered = chain
        .attr_names
        .iter()
        .position(|attr| attr.span.contains_inclusive(pos.column))?;
    let target = resolver.resolve_target(&chain, pos.line).await.ok()?;
    let prefix = &chain.attr_names[..=hovered];
    let resolved = match resolver.resolve_chain(target, prefix, pos.line).await {
        Resolution::Ok(resolved) => resolved,
        _ => return None,
    };

    let token_span = line_span(pos.line, chain.attr_names[hovered].span);
    let node_span = resolved.node.as_ref().map(|n| n.span());
    let contents = render_markdown(&resolved.body);
    Some(HoverOutcome { contents, token_span, node_span })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_state_replaces_previous_highlight() {
        let state = InteractionState::default();
        let first = ActiveHighlight {
            token: Span::on_line(0, 2, 5),
            node: Some(Span::on_line(0, 0, 1)),
        };
        assert_eq!(state.replace(Some(first.clone())), None);
        let second = ActiveHighlight { token: Span::on_line(1, 0, 3), node: None };
        assert_eq!(state.replace(Some(second.clone())), Some(first));
        assert_eq!(state.current(), Some(second.clone()));
        assert_eq!(state.clear(), Some(second));
        assert_eq!(state.current(), None);
    }
}
