//! Node identity across reparses.
//!
//! The evaluation service owns the AST; the server only ever holds
//! [`NodeLocator`]s — recipes for re-finding one logical node after the
//! service reparses the document. Raw child indices are not stable once
//! on-demand (non-terminal attribute) nodes are involved, so a locator pairs
//! the best-known current position of the target with a replay path.

use serde::{Deserialize, Serialize};

use crate::position::{PackedPos, Span};

/// One candidate AST node as reported by the evaluation service:
/// a type anchored at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAtLoc {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub start: PackedPos,
    pub end: PackedPos,
    pub depth: u32,
    /// Set for nodes living in a different source document than the one
    /// being edited. External nodes are never adjusted by local edits.
    #[serde(default, skip_serializing_if = "is_false")]
    pub external: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TypeAtLoc {
    pub fn span(&self) -> Span {
        Span::new(self.start.line_col(), self.end.line_col())
    }

    pub fn set_span(&mut self, span: Span) {
        self.start = span.start.packed();
        self.end = span.end.packed();
    }

    /// The trailing segment of a dotted type name, used wherever a node is
    /// rendered as a single word.
    pub fn short_name(&self) -> &str {
        short_type_name(&self.node_type)
    }
}

/// Trailing segment of a dotted type name (`ast.expr.Add` -> `Add`).
pub fn short_type_name(node_type: &str) -> &str {
    node_type.rsplit('.').next().unwrap_or(node_type)
}

/// One step of a locator's replay path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum LocatorStep {
    /// Descend to the i-th structural child of the current node.
    Child(u32),
    /// Re-invoke a named non-terminal attribute on the current node and
    /// descend into its result.
    Nta(NtaStep),
    /// Anchor by type+span+depth; used when no structural path is known.
    Tal(TypeAtLoc),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NtaStep {
    pub property: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<PropertyArg>,
}

/// An argument to a property invocation. Arguments may nest locators, which
/// therefore take part in edit adjustment like any other locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PropertyArg {
    Int(i64),
    Bool(bool),
    String(String),
    Node(Box<NodeLocator>),
    NodeArray(Vec<NodeLocator>),
    Null,
}

/// A recipe for re-finding one logical AST node across reparses.
///
/// `result` is the best-known current position/type of the target; `steps`
/// lets the service re-derive the same logical node after a fresh reparse.
/// Nodes reached by direct search carry no steps; nodes reached through
/// attribute-chain navigation carry the full replay path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLocator {
    pub result: TypeAtLoc,
    #[serde(default)]
    pub steps: Vec<LocatorStep>,
}

impl NodeLocator {
    /// A locator for a node found by direct search: no replay steps.
    pub fn searched(result: TypeAtLoc) -> Self {
        NodeLocator { result, steps: Vec::new() }
    }

    pub fn span(&self) -> Span {
        self.result.span()
    }
}
