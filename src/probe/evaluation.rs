//! Per-document probe evaluation passes.
//!
//! One pass scans the latest document text, resolves assignments in document
//! order, then resolves all probes concurrently. The pass produces a complete
//! snapshot — variable table, probe outcomes, diagnostics, summary — which the
//! hosting layer swaps in wholesale. A pass that has been superseded by a
//! newer edit is simply dropped by its caller; nothing here writes shared
//! state.

use std::sync::Arc;

use futures::future::join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::adjust::adjust_locator;
use crate::edits::EditAdjuster;
use crate::position::PackedPos;
use crate::probe::matcher::{
    parse_chain_only, Comparison, FullFileMatch, ParseMode, ProbeMatch,
};
use crate::probe::resolver::{
    ChainResolver, Resolution, ResolveFailure, ResolvedProbe, VariableValue,
};
use crate::rpc::models::{ProbeDiagnostic, ResultLine, Severity};
use crate::rpc::provider::EvaluationProvider;

/// Outcome of one probe within a completed pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Assertion held.
    Pass { actual: String },
    /// Assertion did not hold.
    Fail { expected: String, actual: String },
    /// Bare probe; informational only.
    Info,
    /// Resolution failed; a diagnostic was recorded.
    Error,
    /// Transport failure or `stopped`; neither pass nor fail, no diagnostic.
    Indeterminate,
}

/// One probe with its resolution and outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedProbe {
    pub probe: ProbeMatch,
    pub outcome: ProbeOutcome,
    pub resolved: Option<ResolvedProbe>,
}

/// Pass/fail bookkeeping for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub passed: usize,
    pub failed: usize,
    pub informational: usize,
    pub errors: usize,
    pub indeterminate: usize,
}

/// Snapshot of one completed evaluation pass over one document version.
#[derive(Debug, Clone)]
pub struct DocumentProbeState {
    pub version: i32,
    pub generation: u64,
    pub scan: FullFileMatch,
    pub variables: FxHashMap<String, VariableValue>,
    pub probes: Vec<EvaluatedProbe>,
    pub diagnostics: Vec<ProbeDiagnostic>,
    pub summary: PassSummary,
}

impl DocumentProbeState {
    pub fn empty(version: i32, generation: u64) -> Self {
        DocumentProbeState {
            version,
            generation,
            scan: FullFileMatch::default(),
            variables: FxHashMap::default(),
            probes: Vec::new(),
            diagnostics: Vec::new(),
            summary: PassSummary::default(),
        }
    }

    /// Optimistically remaps every locator held by this snapshot after a
    /// local edit, ahead of the next authoritative pass.
    pub fn adjust(&mut self, adjusters: &[EditAdjuster]) {
        for value in self.variables.values_mut() {
            if let Some(node) = &mut value.node {
                adjust_locator(adjusters, node);
            }
            adjust_result_lines(adjusters, &mut value.body);
        }
        for evaluated in &mut self.probes {
            if let Some(resolved) = &mut evaluated.resolved {
                adjust_locator(adjusters, &mut resolved.target);
                if let Some(node) = &mut resolved.node {
                    adjust_locator(adjusters, node);
                }
                adjust_result_lines(adjusters, &mut resolved.body);
            }
        }
    }
}

/// Adjusts every locator reachable from a result-line tree.
pub fn adjust_result_lines(adjusters: &[EditAdjuster], lines: &mut [ResultLine]) {
    for line in lines {
        match line {
            ResultLine::Node(node) => adjust_locator(adjusters, node),
            ResultLine::Arr(items) => adjust_result_lines(adjusters, items),
            ResultLine::Plain(_) | ResultLine::Stdout(_) | ResultLine::Stderr(_) => {}
        }
    }
}

/// Evaluates the comparison suffix of a probe against the flattened actual
/// value: substring test under `~`, equality otherwise, negated under `!`.
pub fn comparison_holds(rhs: &Comparison, actual: &str) -> bool {
    let expected = rhs.expect_val.as_deref().unwrap_or_default();
    let matched = if rhs.tilde {
        actual.contains(expected)
    } else {
        actual == expected
    };
    matched != rhs.exclamation
}

fn mismatch_message(rhs: &Comparison, actual: &str) -> String {
    let expected = rhs.expect_val.as_deref().unwrap_or_default();
    let relation = match (rhs.tilde, rhs.exclamation) {
        (false, false) => "expected",
        (false, true) => "expected anything but",
        (true, false) => "expected substring",
        (true, true) => "expected no substring",
    };
    format!("{} '{}', was '{}'", relation, expected, actual)
}

/// Drives evaluation passes against one evaluation provider.
pub struct Orchestrator {
    provider: Arc<dyn EvaluationProvider>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn EvaluationProvider>) -> Self {
        Orchestrator { provider }
    }

    pub fn provider(&self) -> &dyn EvaluationProvider {
        self.provider.as_ref()
    }

    /// Runs one full pass over the document text. The caller owns the
    /// decision to commit or drop the returned snapshot; a failure in one
    /// probe never prevents evaluation of the others.
    pub async fn evaluate_document(
        &self,
        text: &str,
        version: i32,
        generation: u64,
    ) -> DocumentProbeState {
        let scan = FullFileMatch::scan(text);
        let mut variables: FxHashMap<String, VariableValue> = FxHashMap::default();
        let mut indeterminate_vars: FxHashSet<String> = FxHashSet::default();
        let mut diagnostics: Vec<ProbeDiagnostic> = Vec::new();

        // Assignments resolve in document order; later assignments and all
        // probes see the bindings of earlier ones.
        for assignment in &scan.assignments {
            if variables.contains_key(&assignment.var_name)
                || indeterminate_vars.contains(&assignment.var_name)
            {
                let failure = ResolveFailure::DuplicateDefinition {
                    name: assignment.var_name.clone(),
                    line: assignment.line,
                    span: assignment.var_span,
                };
                diagnostics.push(failure.diagnostic());
                continue;
            }

            let src_chars: Vec<char> = assignment.src_val.chars().collect();
            let Some(src_chain) = parse_chain_only(
                &src_chars,
                assignment.src_val_span.start,
                ParseMode::Strict,
            ) else {
                let failure = ResolveFailure::MalformedSrcVal {
                    line: assignment.line,
                    span: assignment.src_val_span,
                };
                diagnostics.push(failure.diagnostic());
                continue;
            };

            // Assignment sources must not reference other variables.
            if src_chain.is_variable() {
                let failure = ResolveFailure::MalformedSrcVal {
                    line: assignment.line,
                    span: src_chain.node_type_span,
                };
                diagnostics.push(failure.diagnostic());
                continue;
            }

            let resolver = ChainResolver::new(self.provider.as_ref(), &variables);
            match resolver.resolve(&src_chain, assignment.line).await {
                Resolution::Ok(resolved) => {
                    variables.insert(
                        assignment.var_name.clone(),
                        VariableValue { node: resolved.node.clone(), body: resolved.body },
                    );
                }
                Resolution::Fail(failure) => diagnostics.push(failure.diagnostic()),
                Resolution::Indeterminate => {
                    // Probes referencing this variable must not report "no
                    // such variable" for a binding that merely timed out.
                    indeterminate_vars.insert(assignment.var_name.clone());
                }
            }
        }

        let resolver = ChainResolver::new(self.provider.as_ref(), &variables);
        let evaluations = join_all(scan.probes.iter().map(|probe| {
            let resolver = &resolver;
            let indeterminate_vars = &indeterminate_vars;
            async move {
                if probe.lhs.is_variable() && indeterminate_vars.contains(&probe.lhs.node_type) {
                    return (probe.clone(), Resolution::Indeterminate);
                }
                let resolution = resolver.resolve(&probe.lhs, probe.line).await;
                (probe.clone(), resolution)
            }
        }))
        .await;

        let mut probes = Vec::with_capacity(evaluations.len());
        let mut summary = PassSummary::default();
        for (probe, resolution) in evaluations {
            let evaluated = match resolution {
                Resolution::Ok(resolved) => {
                    let outcome = match &probe.rhs {
                        Some(rhs) if rhs.expect_val.is_some() => {
                            let actual = resolved.comparable();
                            if comparison_holds(rhs, &actual) {
                                summary.passed += 1;
                                ProbeOutcome::Pass { actual }
                            } else {
                                summary.failed += 1;
                                diagnostics.push(ProbeDiagnostic {
                                    severity: Severity::Info,
                                    start: PackedPos::new(probe.line, probe.inner_span.start),
                                    end: PackedPos::new(probe.line, probe.inner_span.end),
                                    msg: mismatch_message(rhs, &actual),
                                    source: Some("probe".to_string()),
                                });
                                ProbeOutcome::Fail {
                                    expected: rhs.expect_val.clone().unwrap_or_default(),
                                    actual,
                                }
                            }
                        }
                        _ => {
                            summary.informational += 1;
                            ProbeOutcome::Info
                        }
                    };
                    EvaluatedProbe { probe, outcome, resolved: Some(resolved) }
                }
                Resolution::Fail(failure) => {
                    summary.errors += 1;
                    diagnostics.push(failure.diagnostic());
                    EvaluatedProbe { probe, outcome: ProbeOutcome::Error, resolved: None }
                }
                Resolution::Indeterminate => {
                    summary.indeterminate += 1;
                    EvaluatedProbe { probe, outcome: ProbeOutcome::Indeterminate, resolved: None }
                }
            };
            probes.push(evaluated);
        }

        debug!(
            version,
            generation,
            passed = summary.passed,
            failed = summary.failed,
            informational = summary.informational,
            errors = summary.errors,
            indeterminate = summary.indeterminate,
            "probe evaluation pass complete"
        );

        DocumentProbeState { version, generation, scan, variables, probes, diagnostics, summary }
    }
}
