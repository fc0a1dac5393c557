//! Wire models for the evaluation-service boundary.
//!
//! The boundary is a shape, not a transport: requests and responses are plain
//! serde models. Every result-line kind is a variant of one closed sum type,
//! matched exhaustively wherever results are rendered.

use serde::{Deserialize, Serialize};

use crate::locator::{NodeLocator, PropertyArg};
use crate::position::PackedPos;

/// One line of an evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ResultLine {
    /// Plain text produced by the evaluated property.
    Plain(String),
    /// Captured standard output from the evaluation.
    Stdout(String),
    /// Captured standard error from the evaluation.
    Stderr(String),
    /// A nested list of result lines.
    Arr(Vec<ResultLine>),
    /// A reference to an AST node.
    Node(NodeLocator),
}

/// Diagnostic severity as reported across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// A diagnostic anchored at a precise sub-range of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDiagnostic {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub start: PackedPos,
    pub end: PackedPos,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Parameters for a structural node search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub attr_filter: String,
    pub predicate: String,
    pub line: u32,
}

/// Parameters for evaluating one property on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub locator: NodeLocator,
    pub property: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<PropertyArg>,
}

/// A completed property evaluation. `locator` carries the service's corrected
/// locator for the evaluated node, superseding any local adjustment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluateResponse {
    #[serde(default)]
    pub body: Vec<ResultLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ProbeDiagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<NodeLocator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<PropertyArg>>,
}

/// Outcome of a property evaluation. `Stopped` is a terminal non-error: the
/// service abandoned a long-running step, and the caller abandons with it.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluateOutcome {
    Completed(EvaluateResponse),
    Stopped,
}

/// One property offered by a node's type, as listed for completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

impl PropertyDescriptor {
    pub fn takes_no_args(&self) -> bool {
        self.args.as_ref().map(|a| a.is_empty()).unwrap_or(true)
    }
}

/// Builds the search predicate `this<:Type&@lineSpan~=N`.
pub fn subtype_on_line_predicate(type_name: &str, line: u32) -> String {
    format!("this<:{}&@lineSpan~={}", type_name, line)
}

/// Builds the search predicate `@lineSpan~=N`, unconstrained by type.
pub fn any_on_line_predicate(line: u32) -> String {
    format!("@lineSpan~={}", line)
}

/// Renders a result body to the single comparable string used by probe
/// comparisons.
///
/// A lone node (optionally followed by the trailing blank line the service
/// appends) collapses to the node's short type name. Arrays render as
/// `[a, b, c]`. Multiple lines join with `\n`.
pub fn flatten_body(body: &[ResultLine]) -> String {
    if let Some(ResultLine::Node(node)) = body.first() {
        let only_trailing_blank = match body {
            [_] => true,
            [_, ResultLine::Plain(rest)] => rest.is_empty(),
            _ => false,
        };
        if only_trailing_blank {
            return node.result.short_name().to_string();
        }
    }
    body.iter().map(flatten_line).collect::<Vec<_>>().join("\n")
}

fn flatten_line(line: &ResultLine) -> String {
    match line {
        ResultLine::Plain(text) => text.clone(),
        ResultLine::Stdout(text) => text.clone(),
        ResultLine::Stderr(text) => text.clone(),
        ResultLine::Arr(items) => {
            let rendered: Vec<String> = items.iter().map(flatten_line).collect();
            format!("[{}]", rendered.join(", "))
        }
        ResultLine::Node(node) => node.result.short_name().to_string(),
    }
}

/// Renders a result body as markdown for hover contents. Streams render as
/// fenced blocks; arrays as bullet lists.
pub fn render_markdown(body: &[ResultLine]) -> String {
    let mut out = String::new();
    for line in body {
        match line {
            ResultLine::Plain(text) => {
                out.push_str(text);
                out.push('\n');
            }
            ResultLine::Stdout(text) | ResultLine::Stderr(text) => {
                out.push_str("```\n");
                out.push_str(text);
                out.push_str("\n```\n");
            }
            ResultLine::Arr(items) => {
                for item in items {
                    out.push_str("- ");
                    out.push_str(&flatten_line(item));
                    out.push('\n');
                }
            }
            ResultLine::Node(node) => {
                out.push('`');
                out.push_str(node.result.short_name());
                out.push_str("` at ");
                out.push_str(&node.span().to_string());
                out.push('\n');
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::TypeAtLoc;

    fn node(node_type: &str) -> ResultLine {
        ResultLine::Node(NodeLocator::searched(TypeAtLoc {
            node_type: node_type.to_string(),
            label: None,
            start: PackedPos::new(0, 0),
            end: PackedPos::new(0, 4),
            depth: 2,
            external: false,
        }))
    }

    #[test]
    fn lone_node_collapses_to_short_name() {
        assert_eq!(flatten_body(&[node("ast.expr.Add")]), "Add");
        assert_eq!(
            flatten_body(&[node("ast.expr.Add"), ResultLine::Plain(String::new())]),
            "Add"
        );
    }

    #[test]
    fn node_followed_by_text_does_not_collapse() {
        let body = [node("ast.expr.Add"), ResultLine::Plain("extra".to_string())];
        assert_eq!(flatten_body(&body), "Add\nextra");
    }

    #[test]
    fn arrays_render_bracketed() {
        let body = [ResultLine::Arr(vec![
            ResultLine::Plain("a".to_string()),
            ResultLine::Plain("b".to_string()),
            node("ast.Var"),
        ])];
        assert_eq!(flatten_body(&body), "[a, b, Var]");
    }

    #[test]
    fn predicates_join_with_ampersand() {
        assert_eq!(subtype_on_line_predicate("Add", 7), "this<:Add&@lineSpan~=7");
        assert_eq!(any_on_line_predicate(3), "@lineSpan~=3");
    }

    #[test]
    fn result_lines_round_trip_json() {
        let body = vec![
            ResultLine::Plain("x".to_string()),
            ResultLine::Stderr("boom".to_string()),
            ResultLine::Arr(vec![ResultLine::Stdout("y".to_string())]),
            node("ast.Call"),
        ];
        let json = serde_json::to_string(&body).unwrap();
        let back: Vec<ResultLine> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, body);
    }
}
