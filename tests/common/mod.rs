//! In-process fake evaluation service for integration tests.
//!
//! The fake owns a small synthetic AST (a list of nodes with subtype
//! relations) and a property table keyed by node type and property name. It
//! implements the same provider trait the real subprocess client implements,
//! so the orchestrator, completion and hover run unmodified against it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use probe_language_server::locator::{NodeLocator, PropertyArg, TypeAtLoc};
use probe_language_server::position::PackedPos;
use probe_language_server::rpc::models::{
    EvaluateOutcome, EvaluateResponse, ProbeDiagnostic, PropertyDescriptor, ResultLine, Severity,
};
use probe_language_server::rpc::provider::EvaluationProvider;

/// One synthetic AST node: its locator plus every type name it is a subtype
/// of (including its own).
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub locator: NodeLocator,
    pub subtype_of: Vec<String>,
}

pub fn tal(node_type: &str, start: (u32, u32), end: (u32, u32), depth: u32) -> TypeAtLoc {
    TypeAtLoc {
        node_type: node_type.to_string(),
        label: None,
        start: PackedPos::new(start.0, start.1),
        end: PackedPos::new(end.0, end.1),
        depth,
        external: false,
    }
}

pub fn node(node_type: &str, start: (u32, u32), end: (u32, u32), depth: u32) -> FakeNode {
    let short = node_type.rsplit('.').next().unwrap_or(node_type).to_string();
    FakeNode {
        locator: NodeLocator::searched(tal(node_type, start, end, depth)),
        subtype_of: vec![node_type.to_string(), short],
    }
}

/// What a property evaluation should produce.
#[derive(Debug, Clone)]
pub enum FakeResult {
    Body(Vec<ResultLine>),
    Error(String),
    Stopped,
}

impl FakeResult {
    pub fn plain(text: &str) -> Self {
        FakeResult::Body(vec![ResultLine::Plain(text.to_string())])
    }

    pub fn node_ref(node: &FakeNode) -> Self {
        FakeResult::Body(vec![ResultLine::Node(node.locator.clone())])
    }
}

#[derive(Default)]
pub struct FakeService {
    nodes: Vec<FakeNode>,
    /// (node short type, property name) -> result
    properties: HashMap<(String, String), FakeResult>,
    pub search_calls: AtomicUsize,
    pub evaluate_calls: AtomicUsize,
    pub evaluated: Mutex<Vec<(String, String)>>,
}

impl FakeService {
    pub fn new(nodes: Vec<FakeNode>) -> Self {
        FakeService { nodes, ..Default::default() }
    }

    pub fn with_property(mut self, node_type: &str, property: &str, result: FakeResult) -> Self {
        self.properties
            .insert((node_type.to_string(), property.to_string()), result);
        self
    }

    fn short(node_type: &str) -> &str {
        node_type.rsplit('.').next().unwrap_or(node_type)
    }
}

#[async_trait::async_trait]
impl EvaluationProvider for FakeService {
    async fn search_nodes(
        &self,
        _attr_filter: &str,
        predicate: &str,
        _line: u32,
    ) -> anyhow::Result<Option<Vec<NodeLocator>>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let mut wanted_type: Option<&str> = None;
        let mut wanted_line: Option<u32> = None;
        for clause in predicate.split('&') {
            if let Some(ty) = clause.strip_prefix("this<:") {
                wanted_type = Some(ty);
            } else if let Some(line) = clause.strip_prefix("@lineSpan~=") {
                wanted_line = line.parse().ok();
            } else {
                anyhow::bail!("unsupported predicate clause: {}", clause);
            }
        }

        let matches: Vec<NodeLocator> = self
            .nodes
            .iter()
            .filter(|node| {
                wanted_type
                    .map(|ty| node.subtype_of.iter().any(|s| s == ty))
                    .unwrap_or(true)
            })
            .filter(|node| {
                wanted_line
                    .map(|line| {
                        node.locator.result.start.line() <= line
                            && line <= node.locator.result.end.line()
                    })
                    .unwrap_or(true)
            })
            .map(|node| node.locator.clone())
            .collect();
        Ok(Some(matches))
    }

    async fn evaluate_property(
        &self,
        locator: &NodeLocator,
        property: &str,
        _args: &[PropertyArg],
    ) -> anyhow::Result<EvaluateOutcome> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        let short = Self::short(&locator.result.node_type).to_string();
        self.evaluated
            .lock()
            .unwrap()
            .push((short.clone(), property.to_string()));

        match self.properties.get(&(short, property.to_string())) {
            Some(FakeResult::Body(body)) => Ok(EvaluateOutcome::Completed(EvaluateResponse {
                body: body.clone(),
                ..Default::default()
            })),
            Some(FakeResult::Error(msg)) => Ok(EvaluateOutcome::Completed(EvaluateResponse {
                errors: vec![ProbeDiagnostic {
                    severity: Severity::Error,
                    start: locator.result.start,
                    end: locator.result.end,
                    msg: msg.clone(),
                    source: Some("fake".to_string()),
                }],
                ..Default::default()
            })),
            Some(FakeResult::Stopped) => Ok(EvaluateOutcome::Stopped),
            None => Ok(EvaluateOutcome::Completed(EvaluateResponse {
                errors: vec![ProbeDiagnostic {
                    severity: Severity::Error,
                    start: locator.result.start,
                    end: locator.result.end,
                    msg: format!("No such attribute '{}'", property),
                    source: Some("fake".to_string()),
                }],
                ..Default::default()
            })),
        }
    }

    async fn list_properties(
        &self,
        locator: &NodeLocator,
    ) -> anyhow::Result<Vec<PropertyDescriptor>> {
        let short = Self::short(&locator.result.node_type);
        let mut names: Vec<String> = self
            .properties
            .keys()
            .filter(|(ty, _)| ty == short)
            .map(|(_, prop)| prop.clone())
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| PropertyDescriptor { name, args: None })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}
