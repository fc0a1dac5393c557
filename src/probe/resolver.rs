//! Node and attribute-chain resolution.
//!
//! Turns a parsed probe target into a concrete [`NodeLocator`] — via the
//! variable table or a line-scoped type search — and walks the dotted
//! attribute chain one evaluation call at a time. Every failure mode carries
//! the tightest column range that identifies the offending token; transport
//! failures and `stopped` results resolve to an indeterminate outcome that
//! produces no diagnostic at all.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::locator::NodeLocator;
use crate::position::PackedPos;
use crate::probe::matcher::{AttrName, NodeAndAttrChain, TokenSpan};
use crate::rpc::models::{
    flatten_body, subtype_on_line_predicate, EvaluateOutcome, ProbeDiagnostic, ResultLine,
    Severity,
};
use crate::rpc::provider::EvaluationProvider;

/// A resolution failure, anchored at the most specific sub-range possible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveFailure {
    #[error("No such variable")]
    NoSuchVariable { name: String, line: u32, span: TokenSpan },

    #[error("Duplicate definition of {name}")]
    DuplicateDefinition { name: String, line: u32, span: TokenSpan },

    #[error("Variable {name} is not a node")]
    VariableNotNode { name: String, line: u32, span: TokenSpan },

    #[error("No matching nodes")]
    NoMatchingNodes { node_type: String, line: u32, span: TokenSpan },

    #[error("{count} nodes match; disambiguate with an index like [0] or [{}]", .count - 1)]
    AmbiguousMatch { node_type: String, count: usize, line: u32, span: TokenSpan },

    #[error("Invalid index")]
    InvalidIndex { index: usize, count: usize, line: u32, span: TokenSpan },

    #[error("Invalid node reference")]
    MalformedSrcVal { line: u32, span: TokenSpan },

    #[error("'{attr}' did not yield a node (chain step {step_index})")]
    BrokenChain { attr: String, step_index: usize, line: u32, span: TokenSpan },

    #[error("{msg}")]
    AttributeError { attr: String, msg: String, line: u32, span: TokenSpan },
}

impl ResolveFailure {
    pub fn span(&self) -> (u32, TokenSpan) {
        match self {
            ResolveFailure::NoSuchVariable { line, span, .. }
            | ResolveFailure::DuplicateDefinition { line, span, .. }
            | ResolveFailure::VariableNotNode { line, span, .. }
            | ResolveFailure::NoMatchingNodes { line, span, .. }
            | ResolveFailure::AmbiguousMatch { line, span, .. }
            | ResolveFailure::InvalidIndex { line, span, .. }
            | ResolveFailure::MalformedSrcVal { line, span, .. }
            | ResolveFailure::BrokenChain { line, span, .. }
            | ResolveFailure::AttributeError { line, span, .. } => (*line, *span),
        }
    }

    pub fn diagnostic(&self) -> ProbeDiagnostic {
        let (line, span) = self.span();
        ProbeDiagnostic {
            severity: Severity::Error,
            start: PackedPos::new(line, span.start),
            end: PackedPos::new(line, span.end),
            msg: self.to_string(),
            source: Some("probe".to_string()),
        }
    }
}

/// Three-way resolution outcome. Indeterminate results are abandoned without
/// diagnostics and retried on the next relevant change.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Ok(T),
    Fail(ResolveFailure),
    Indeterminate,
}

impl<T> Resolution<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Resolution::Ok(value) => Some(value),
            _ => None,
        }
    }
}

/// The value a `$variable` is bound to: the evaluated body of its source
/// chain, plus the node reference it carries when it carries exactly one.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub node: Option<NodeLocator>,
    pub body: Vec<ResultLine>,
}

/// A fully resolved probe: the target node, the raw final result body, and
/// the node reference of the final attribute when there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProbe {
    pub target: NodeLocator,
    pub body: Vec<ResultLine>,
    pub node: Option<NodeLocator>,
}

impl ResolvedProbe {
    pub fn comparable(&self) -> String {
        flatten_body(&self.body)
    }
}

/// Extracts the single node reference a result body carries, if it carries
/// exactly one (an optional trailing blank line is tolerated).
pub fn extract_node_ref(body: &[ResultLine]) -> Option<NodeLocator> {
    let mut found: Option<&NodeLocator> = None;
    for line in body {
        match line {
            ResultLine::Node(node) => {
                if found.is_some() {
                    return None;
                }
                found = Some(node);
            }
            ResultLine::Plain(text) if text.is_empty() => {}
            _ => return None,
        }
    }
    found.cloned()
}

/// Resolves probe targets and attribute chains against one document version.
/// Holds the variable table built by the assignments that precede the probe
/// in document order.
pub struct ChainResolver<'a> {
    provider: &'a dyn EvaluationProvider,
    variables: &'a FxHashMap<String, VariableValue>,
}

impl<'a> ChainResolver<'a> {
    pub fn new(
        provider: &'a dyn EvaluationProvider,
        variables: &'a FxHashMap<String, VariableValue>,
    ) -> Self {
        ChainResolver { provider, variables }
    }

    /// Resolves the probe's target node: variable lookup when the target
    /// starts with `$`, a line-scoped subtype search otherwise.
    pub async fn resolve_target(
        &self,
        chain: &NodeAndAttrChain,
        line: u32,
    ) -> Resolution<NodeLocator> {
        if chain.is_variable() {
            return match self.variables.get(&chain.node_type) {
                Some(value) => match &value.node {
                    Some(node) => Resolution::Ok(node.clone()),
                    None => Resolution::Fail(ResolveFailure::VariableNotNode {
                        name: chain.node_type.clone(),
                        line,
                        span: chain.node_type_span,
                    }),
                },
                None => Resolution::Fail(ResolveFailure::NoSuchVariable {
                    name: chain.node_type.clone(),
                    line,
                    span: chain.node_type_span,
                }),
            };
        }

        let predicate = subtype_on_line_predicate(&chain.node_type, line);
        let matches = match self.provider.search_nodes("", &predicate, line).await {
            Ok(Some(matches)) => matches,
            Ok(None) => return Resolution::Indeterminate,
            Err(e) => {
                debug!("Node search failed, treating as indeterminate: {}", e);
                return Resolution::Indeterminate;
            }
        };

        let count = matches.len();
        if count == 0 {
            return Resolution::Fail(ResolveFailure::NoMatchingNodes {
                node_type: chain.node_type.clone(),
                line,
                span: chain.node_type_span,
            });
        }
        if let Some(index) = &chain.node_index {
            return match matches.into_iter().nth(index.value) {
                Some(found) => Resolution::Ok(found),
                None => Resolution::Fail(ResolveFailure::InvalidIndex {
                    index: index.value,
                    count,
                    line,
                    span: index.span,
                }),
            };
        }
        let mut matches = matches;
        if count == 1 {
            return Resolution::Ok(matches.swap_remove(0));
        }
        Resolution::Fail(ResolveFailure::AmbiguousMatch {
            node_type: chain.node_type.clone(),
            count,
            line,
            span: chain.node_type_span,
        })
    }

    /// Walks the attribute chain left to right. Every step but the last must
    /// yield exactly one node reference; the final step's raw body is
    /// returned as-is.
    pub async fn resolve_chain(
        &self,
        target: NodeLocator,
        attrs: &[AttrName],
        line: u32,
    ) -> Resolution<ResolvedProbe> {
        if attrs.is_empty() {
            let body = vec![ResultLine::Node(target.clone())];
            return Resolution::Ok(ResolvedProbe { node: Some(target.clone()), target, body });
        }

        let mut current = target.clone();
        let last = attrs.len() - 1;
        for (step_index, attr) in attrs.iter().enumerate() {
            if attr.name.is_empty() {
                return Resolution::Fail(ResolveFailure::BrokenChain {
                    attr: attr.name.clone(),
                    step_index,
                    line,
                    span: attr.span,
                });
            }

            let outcome = match self.provider.evaluate_property(&current, &attr.name, &[]).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    debug!("Property evaluation failed, treating as indeterminate: {}", e);
                    return Resolution::Indeterminate;
                }
            };
            let response = match outcome {
                EvaluateOutcome::Completed(response) => response,
                EvaluateOutcome::Stopped => return Resolution::Indeterminate,
            };

            if let Some(error) = response.errors.first() {
                return Resolution::Fail(ResolveFailure::AttributeError {
                    attr: attr.name.clone(),
                    msg: error.msg.clone(),
                    line,
                    span: attr.span,
                });
            }

            if step_index == last {
                let node = extract_node_ref(&response.body);
                return Resolution::Ok(ResolvedProbe {
                    target,
                    body: response.body,
                    node,
                });
            }

            current = match extract_node_ref(&response.body) {
                Some(node) => node,
                None => {
                    // The chain breaks at the step that can no longer be
                    // evaluated: the one after the non-node result.
                    let broken = &attrs[step_index + 1];
                    return Resolution::Fail(ResolveFailure::BrokenChain {
                        attr: broken.name.clone(),
                        step_index: step_index + 1,
                        line,
                        span: broken.span,
                    });
                }
            };
        }
        unreachable!("attribute chains are walked to their final step");
    }

    /// Target resolution plus chain walking, in one call.
    pub async fn resolve(
        &self,
        chain: &NodeAndAttrChain,
        line: u32,
    ) -> Resolution<ResolvedProbe> {
        let target = match self.resolve_target(chain, line).await {
            Resolution::Ok(target) => target,
            Resolution::Fail(failure) => return Resolution::Fail(failure),
            Resolution::Indeterminate => return Resolution::Indeterminate,
        };
        self.resolve_chain(target, &chain.attr_names, line).await
    }
}
