use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use ropey::Rope;
use tokio::sync::RwLock;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionOptions, CompletionParams,
    CompletionResponse, Diagnostic, DiagnosticSeverity, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DocumentHighlight,
    DocumentHighlightKind, DocumentHighlightParams, Hover, HoverContents, HoverParams,
    HoverProviderCapability, InitializeParams, InitializeResult, InitializedParams,
    MarkupContent, MarkupKind, MessageType, OneOf, Position as LspPosition, Range,
    ServerCapabilities, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
};
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::{Client, LanguageServer};

use tracing::{debug, info, warn};

use crate::edits::adjusters_for_event;
use crate::lsp::document::AppliedChange;
use crate::lsp::models::{LspDocument, LspDocumentHistory, LspDocumentState};
use crate::position::{LineCol, Span};
use crate::probe::completion::{completions_at, CandidateKind};
use crate::probe::evaluation::{DocumentProbeState, Orchestrator};
use crate::probe::hover::{hover_at, InteractionState};
use crate::probe::resolver::VariableValue;
use crate::rpc::models::{ProbeDiagnostic, Severity};
use crate::rpc::provider::EvaluationProvider;

/// The probe language server backend.
///
/// Owns the open-document map, the per-document snapshot of the last
/// completed evaluation pass, and the hover interaction state. Snapshots are
/// committed wholesale: an in-flight pass that has been superseded by a newer
/// edit is dropped without touching shared state.
pub struct ProbeBackend {
    client: Client,
    documents_by_uri: Arc<RwLock<HashMap<Url, Arc<LspDocument>>>>,
    serial_document_id: AtomicU32,
    orchestrator: Arc<Orchestrator>,
    probe_states: DashMap<Url, DocumentProbeState>,
    generations: DashMap<Url, Arc<AtomicU64>>,
    interaction: InteractionState,
}

fn to_lsp_range(diag: &ProbeDiagnostic) -> Range {
    Range {
        start: LspPosition { line: diag.start.line(), character: diag.start.column() },
        end: LspPosition { line: diag.end.line(), character: diag.end.column() },
    }
}

fn to_lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

fn to_lsp_diagnostic(diag: &ProbeDiagnostic) -> Diagnostic {
    Diagnostic {
        range: to_lsp_range(diag),
        severity: Some(to_lsp_severity(diag.severity)),
        message: diag.msg.clone(),
        source: diag.source.clone(),
        ..Default::default()
    }
}

fn span_to_range(span: Span) -> Range {
    Range {
        start: LspPosition { line: span.start.line, character: span.start.column },
        end: LspPosition { line: span.end.line, character: span.end.column + 1 },
    }
}

impl ProbeBackend {
    pub fn new(client: Client, provider: Arc<dyn EvaluationProvider>) -> Self {
        info!("Using {} evaluation backend", provider.backend_name());
        ProbeBackend {
            client,
            documents_by_uri: Arc::new(RwLock::new(HashMap::new())),
            serial_document_id: AtomicU32::new(0),
            orchestrator: Arc::new(Orchestrator::new(provider)),
            probe_states: DashMap::new(),
            generations: DashMap::new(),
            interaction: InteractionState::default(),
        }
    }

    fn next_document_id(&self) -> u32 {
        self.serial_document_id.fetch_add(1, Ordering::SeqCst)
    }

    fn generation_counter(&self, uri: &Url) -> Arc<AtomicU64> {
        self.generations
            .entry(uri.clone())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Variable table of the last committed pass, for hover/completion.
    fn variables_for(&self, uri: &Url) -> rustc_hash::FxHashMap<String, VariableValue> {
        self.probe_states
            .get(uri)
            .map(|state| state.variables.clone())
            .unwrap_or_default()
    }

    /// Runs one evaluation pass and commits it unless a newer edit arrived
    /// while it was in flight.
    async fn reevaluate(&self, uri: &Url, text: String, version: i32) {
        let counter = self.generation_counter(uri);
        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;

        let state = self
            .orchestrator
            .evaluate_document(&text, version, generation)
            .await;

        if counter.load(Ordering::SeqCst) != generation {
            debug!(%uri, generation, "discarding superseded evaluation pass");
            return;
        }

        let diagnostics: Vec<Diagnostic> =
            state.diagnostics.iter().map(to_lsp_diagnostic).collect();
        let summary = state.summary;
        self.probe_states.insert(uri.clone(), state);

        // Publish only if the document is still at the evaluated version.
        let current_version = {
            let documents = self.documents_by_uri.read().await;
            match documents.get(uri) {
                Some(doc) => doc.version().await,
                None => return,
            }
        };
        if current_version != version {
            return;
        }

        self.client
            .publish_diagnostics(uri.clone(), diagnostics, Some(version))
            .await;
        debug!(
            %uri,
            passed = summary.passed,
            failed = summary.failed,
            informational = summary.informational,
            errors = summary.errors,
            indeterminate = summary.indeterminate,
            "published probe diagnostics"
        );
    }

    /// Optimistically remaps the last snapshot's locators after an edit,
    /// ahead of the authoritative re-evaluation.
    fn adjust_snapshot(&self, uri: &Url, applied: &AppliedChange) {
        if applied.full_replace {
            return;
        }
        let adjusters = adjusters_for_event(&applied.replacements);
        if let Some(mut state) = self.probe_states.get_mut(uri) {
            state.adjust(&adjusters);
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for ProbeBackend {
    async fn initialize(&self, _: InitializeParams) -> LspResult<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        ".".to_string(),
                        "$".to_string(),
                        "=".to_string(),
                        "[".to_string(),
                    ]),
                    ..Default::default()
                }),
                document_highlight_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Probe language server initialized")
            .await;
    }

    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let text = params.text_document.text;
        let version = params.text_document.version;
        let id = self.next_document_id();

        let document = Arc::new(LspDocument {
            id,
            state: RwLock::new(LspDocumentState {
                uri: uri.clone(),
                text: Rope::from_str(&text),
                version,
                history: LspDocumentHistory { text: text.clone(), changes: Vec::new() },
            }),
        });
        {
            let mut documents = self.documents_by_uri.write().await;
            documents.insert(uri.clone(), document);
        }
        debug!(%uri, id, version, "opened document");

        self.reevaluate(&uri, text, version).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let version = params.text_document.version;

        let document = {
            let documents = self.documents_by_uri.read().await;
            documents.get(&uri).cloned()
        };
        let Some(document) = document else {
            warn!(%uri, "change for unknown document");
            return;
        };

        let (applied, text) = {
            let mut state = document.state.write().await;
            let applied = match state.apply(params.content_changes, version) {
                Ok(applied) => applied,
                Err(e) => {
                    warn!(%uri, "rejecting change: {}", e);
                    return;
                }
            };
            (applied, state.text.to_string())
        };

        self.adjust_snapshot(&uri, &applied);
        self.reevaluate(&uri, text, version).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        {
            let mut documents = self.documents_by_uri.write().await;
            documents.remove(&uri);
        }
        self.probe_states.remove(&uri);
        self.generations.remove(&uri);
        self.interaction.clear();
        debug!(%uri, "closed document");

        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn hover(&self, params: HoverParams) -> LspResult<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let document = {
            let documents = self.documents_by_uri.read().await;
            documents.get(&uri).cloned()
        };
        let Some(document) = document else {
            return Ok(None);
        };
        let Some(line_text) = document.line_text(position.line).await else {
            return Ok(None);
        };

        let variables = self.variables_for(&uri);
        let outcome = hover_at(
            self.orchestrator.provider(),
            &variables,
            &line_text,
            LineCol::new(position.line, position.character),
            &self.interaction,
        )
        .await;

        Ok(outcome.map(|outcome| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: outcome.contents,
            }),
            range: Some(span_to_range(outcome.token_span)),
        }))
    }

    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let document = {
            let documents = self.documents_by_uri.read().await;
            documents.get(&uri).cloned()
        };
        let Some(document) = document else {
            return Ok(None);
        };
        let Some(line_text) = document.line_text(position.line).await else {
            return Ok(None);
        };

        let variables = self.variables_for(&uri);
        let candidates = completions_at(
            self.orchestrator.provider(),
            &variables,
            &line_text,
            LineCol::new(position.line, position.character),
        )
        .await;
        if candidates.is_empty() {
            return Ok(None);
        }

        let items: Vec<CompletionItem> = candidates
            .into_iter()
            .map(|candidate| CompletionItem {
                kind: Some(match candidate.kind {
                    CandidateKind::NodeType => CompletionItemKind::CLASS,
                    CandidateKind::Variable => CompletionItemKind::VARIABLE,
                    CandidateKind::Attribute => CompletionItemKind::PROPERTY,
                    CandidateKind::Value => CompletionItemKind::VALUE,
                }),
                label: candidate.label,
                ..Default::default()
            })
            .collect();
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> LspResult<Option<Vec<DocumentHighlight>>> {
        let _uri = params.text_document_position_params.text_document.uri;
        let Some(active) = self.interaction.current() else {
            return Ok(None);
        };
        let mut highlights = vec![DocumentHighlight {
            range: span_to_range(active.token),
            kind: Some(DocumentHighlightKind::TEXT),
        }];
        if let Some(node) = active.node {
            highlights.push(DocumentHighlight {
                range: span_to_range(node),
                kind: Some(DocumentHighlightKind::READ),
            });
        }
        Ok(Some(highlights))
    }
}
