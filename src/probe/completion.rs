//! Completion provider for probe contents.
//!
//! Reuses the matcher to find which probe contains the cursor, then
//! dispatches on the sub-range the cursor sits in: the target name, one
//! attribute segment, or the expected value. Candidates come from the same
//! resolver the evaluation passes use; nothing here re-derives the pipeline.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::position::LineCol;
use crate::probe::matcher::{
    lenient_match_at, parse_chain_only, Comparison, LineMatch, NodeAndAttrChain, ParseMode,
};
use crate::probe::resolver::{ChainResolver, Resolution, VariableValue};
use crate::rpc::models::any_on_line_predicate;
use crate::rpc::provider::EvaluationProvider;

/// What a completion candidate stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    NodeType,
    Variable,
    Attribute,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
    pub kind: CandidateKind,
}

impl CompletionCandidate {
    fn new(label: impl Into<String>, kind: CandidateKind) -> Self {
        CompletionCandidate { label: label.into(), kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorTarget {
    Target,
    Attr(usize),
    Value,
}

fn locate_cursor(chain: &NodeAndAttrChain, rhs: Option<&Comparison>, col: u32) -> Option<CursorTarget> {
    for (idx, attr) in chain.attr_names.iter().enumerate() {
        if attr.span.contains_inclusive(col) {
            return Some(CursorTarget::Attr(idx));
        }
    }
    if chain.node_type_span.contains_inclusive(col) {
        return Some(CursorTarget::Target);
    }
    if let Some(span) = rhs.and_then(|rhs| rhs.expect_span) {
        if span.contains_inclusive(col) {
            return Some(CursorTarget::Value);
        }
    }
    None
}

/// Computes completion candidates for a cursor position on one line.
///
/// `variables` is the variable table of the last completed pass; assignment
/// right-hand sides never offer variables, since a source chain must not
/// reference one.
pub async fn completions_at(
    provider: &dyn EvaluationProvider,
    variables: &FxHashMap<String, VariableValue>,
    line_text: &str,
    pos: LineCol,
) -> Vec<CompletionCandidate> {
    let Some(found) = lenient_match_at(pos.line, line_text, pos.column) else {
        return Vec::new();
    };

    match found {
        LineMatch::Probe(probe) => {
            let Some(target) = locate_cursor(&probe.lhs, probe.rhs.as_ref(), pos.column) else {
                return Vec::new();
            };
            chain_completions(provider, variables, &probe.lhs, target, pos.line, true).await
        }
        LineMatch::Assignment(assignment) => {
            if !assignment.src_val_span.contains_inclusive(pos.column) {
                return Vec::new();
            }
            let src_chars: Vec<char> = assignment.src_val.chars().collect();
            let Some(chain) = parse_chain_only(
                &src_chars,
                assignment.src_val_span.start,
                ParseMode::Lenient,
            ) else {
                // Empty source: offer the type candidates for this line.
                return type_candidates(provider, pos.line).await;
            };
            let Some(target) = locate_cursor(&chain, None, pos.column) else {
                return Vec::new();
            };
            chain_completions(provider, variables, &chain, target, pos.line, false).await
        }
    }
}

async fn chain_completions(
    provider: &dyn EvaluationProvider,
    variables: &FxHashMap<String, VariableValue>,
    chain: &NodeAndAttrChain,
    target: CursorTarget,
    line: u32,
    allow_variables: bool,
) -> Vec<CompletionCandidate> {
    let resolver = ChainResolver::new(provider, variables);
    match target {
        CursorTarget::Target => {
            if chain.is_variable() {
                if !allow_variables {
                    return Vec::new();
                }
                return variables
                    .keys()
                    .map(|name| CompletionCandidate::new(name.clone(), CandidateKind::Variable))
                    .collect();
            }
            let mut candidates = type_candidates(provider, line).await;
            if allow_variables {
                candidates.extend(
                    variables
                        .keys()
                        .map(|name| CompletionCandidate::new(name.clone(), CandidateKind::Variable)),
                );
            }
            candidates
        }
        CursorTarget::Attr(idx) => {
            let Resolution::Ok(node) = resolver.resolve_target(chain, line).await else {
                return Vec::new();
            };
            let prefix = &chain.attr_names[..idx];
            let Resolution::Ok(resolved) = resolver.resolve_chain(node, prefix, line).await else {
                return Vec::new();
            };
            let Some(node) = resolved.node else {
                return Vec::new();
            };
            match provider.list_properties(&node).await {
                Ok(properties) => properties
                    .into_iter()
                    .filter(|p| p.takes_no_args())
                    .map(|p| CompletionCandidate::new(p.name, CandidateKind::Attribute))
                    .collect(),
                Err(e) => {
                    debug!("Property listing failed: {}", e);
                    Vec::new()
                }
            }
        }
        CursorTarget::Value => match resolver.resolve(chain, line).await {
            Resolution::Ok(resolved) => {
                vec![CompletionCandidate::new(resolved.comparable(), CandidateKind::Value)]
            }
            _ => Vec::new(),
        },
    }
}

async fn type_candidates(provider: &dyn EvaluationProvider, line: u32) -> Vec<CompletionCandidate> {
    let predicate = any_on_line_predicate(line);
    match provider.search_nodes("", &predicate, line).await {
        Ok(Some(nodes)) => {
            let mut names: Vec<String> = nodes
                .iter()
                .map(|n| n.result.short_name().to_string())
                .collect();
            names.sort();
            names.dedup();
            names
                .into_iter()
                .map(|name| CompletionCandidate::new(name, CandidateKind::NodeType))
                .collect()
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            debug!("Type search failed: {}", e);
            Vec::new()
        }
    }
}
