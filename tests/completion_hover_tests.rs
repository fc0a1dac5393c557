//! Completion and hover provider tests against the in-process fake service.

mod common;

use rustc_hash::FxHashMap;

use common::{node, FakeResult, FakeService};
use probe_language_server::position::{LineCol, Span};
use probe_language_server::probe::completion::{completions_at, CandidateKind};
use probe_language_server::probe::hover::{hover_at, InteractionState};
use probe_language_server::probe::resolver::VariableValue;

fn arithmetic_service() -> FakeService {
    let program = node("ast.Program", (0, 0), (0, 5), 0);
    let add = node("ast.expr.Add", (0, 0), (0, 5), 2);
    let var = node("ast.expr.Var", (0, 0), (0, 1), 3);
    let lit = node("ast.expr.Lit", (0, 4), (0, 5), 3);
    FakeService::new(vec![program, add, var.clone(), lit.clone()])
        .with_property("Add", "lhs", FakeResult::node_ref(&var))
        .with_property("Add", "rhs", FakeResult::node_ref(&lit))
        .with_property("Add", "value", FakeResult::plain("3"))
}

fn no_vars() -> FxHashMap<String, VariableValue> {
    FxHashMap::default()
}

#[tokio::test]
async fn hovering_the_type_token_flashes_the_target_node() {
    let service = arithmetic_service();
    let interaction = InteractionState::default();
    let outcome = hover_at(
        &service,
        &no_vars(),
        "a + 2 // [[Add.lhs]]",
        LineCol::new(0, 12),
        &interaction,
    )
    .await
    .expect("hover should resolve");

    assert_eq!(outcome.token_span, Span::on_line(0, 11, 13));
    assert_eq!(
        outcome.node_span,
        Some(Span::new(LineCol::new(0, 0), LineCol::new(0, 5)))
    );
    assert!(outcome.contents.contains("Add"));
    // The highlight is installed for the hosting layer to surface.
    let active = interaction.current().expect("highlight installed");
    assert_eq!(active.token, Span::on_line(0, 11, 13));
}

#[tokio::test]
async fn hovering_an_attribute_flashes_the_reached_node() {
    let service = arithmetic_service();
    let interaction = InteractionState::default();
    let outcome = hover_at(
        &service,
        &no_vars(),
        "a + 2 // [[Add.lhs]]",
        LineCol::new(0, 16),
        &interaction,
    )
    .await
    .expect("hover should resolve");

    assert_eq!(outcome.token_span, Span::on_line(0, 15, 17));
    assert_eq!(
        outcome.node_span,
        Some(Span::new(LineCol::new(0, 0), LineCol::new(0, 1)))
    );
    assert!(outcome.contents.contains("Var"));
}

#[tokio::test]
async fn new_hover_target_replaces_the_previous_highlight() {
    let service = arithmetic_service();
    let interaction = InteractionState::default();
    let line = "a + 2 // [[Add.lhs]]";

    hover_at(&service, &no_vars(), line, LineCol::new(0, 12), &interaction).await;
    let first = interaction.current().unwrap();

    hover_at(&service, &no_vars(), line, LineCol::new(0, 16), &interaction).await;
    let second = interaction.current().unwrap();
    assert_ne!(first, second);

    // Hovering plain text clears the highlight.
    hover_at(&service, &no_vars(), line, LineCol::new(0, 2), &interaction).await;
    assert_eq!(interaction.current(), None);
}

#[tokio::test]
async fn type_position_offers_types_on_the_line_and_variables() {
    let service = arithmetic_service();
    let mut variables = no_vars();
    variables.insert(
        "$c".to_string(),
        VariableValue { node: None, body: Vec::new() },
    );

    let candidates = completions_at(
        &service,
        &variables,
        "a + 2 // [[Ad]]",
        LineCol::new(0, 13),
    )
    .await;

    let labels: Vec<&str> = candidates.iter().map(|c| c.label.as_str()).collect();
    assert!(labels.contains(&"Add"), "{:?}", labels);
    assert!(labels.contains(&"Var"), "{:?}", labels);
    assert!(labels.contains(&"$c"), "{:?}", labels);
}

#[tokio::test]
async fn variable_prefix_offers_only_variables() {
    let service = arithmetic_service();
    let mut variables = no_vars();
    variables.insert("$c".to_string(), VariableValue { node: None, body: Vec::new() });
    variables.insert("$d".to_string(), VariableValue { node: None, body: Vec::new() });

    let candidates = completions_at(
        &service,
        &variables,
        "x // [[$c]]",
        LineCol::new(0, 8),
    )
    .await;

    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|c| c.kind == CandidateKind::Variable));
}

#[tokio::test]
async fn attribute_position_lists_zero_arg_properties() {
    let service = arithmetic_service();
    let candidates = completions_at(
        &service,
        &no_vars(),
        "a + 2 // [[Add.]]",
        LineCol::new(0, 15),
    )
    .await;

    let labels: Vec<&str> = candidates.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["lhs", "rhs", "value"]);
    assert!(candidates.iter().all(|c| c.kind == CandidateKind::Attribute));
}

#[tokio::test]
async fn value_position_offers_the_resolved_result() {
    let service = arithmetic_service();
    let candidates = completions_at(
        &service,
        &no_vars(),
        "a + 2 // [[Add.value=]]",
        LineCol::new(0, 21),
    )
    .await;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].label, "3");
    assert_eq!(candidates[0].kind, CandidateKind::Value);
}

#[tokio::test]
async fn assignment_source_excludes_variables() {
    let service = arithmetic_service();
    let mut variables = no_vars();
    variables.insert("$c".to_string(), VariableValue { node: None, body: Vec::new() });

    let candidates = completions_at(
        &service,
        &variables,
        "a + 2 // [[$x:=Ad]]",
        LineCol::new(0, 16),
    )
    .await;

    assert!(!candidates.is_empty());
    assert!(candidates.iter().all(|c| c.kind == CandidateKind::NodeType));
}

#[tokio::test]
async fn hover_on_assignment_source_resolves_the_target() {
    let outer = node("ast.Call", (0, 0), (0, 6), 2);
    let inner = node("ast.Call", (0, 2), (0, 5), 3);
    let service = FakeService::new(vec![outer, inner]);
    let interaction = InteractionState::default();

    let outcome = hover_at(
        &service,
        &no_vars(),
        "f(g(x)) // [[$c:=Call[0]]]",
        LineCol::new(0, 18),
        &interaction,
    )
    .await
    .expect("hover should resolve");

    assert_eq!(
        outcome.node_span,
        Some(Span::new(LineCol::new(0, 0), LineCol::new(0, 6)))
    );
}

#[tokio::test]
async fn completion_outside_probes_is_empty() {
    let service = arithmetic_service();
    let candidates =
        completions_at(&service, &no_vars(), "a + 2 // [[Add]]", LineCol::new(0, 3)).await;
    assert!(candidates.is_empty());
}
