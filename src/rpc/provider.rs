//! Evaluation-service provider abstraction.
//!
//! This module defines the core trait for evaluation backends and provides
//! factory functions for creating the appropriate backend based on
//! configuration. The service itself (the external compiler/analyzer) is a
//! black box: given a locator and a property, it returns a result value or a
//! "could not resolve" failure.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::locator::{NodeLocator, PropertyArg};
use crate::rpc::models::{
    EvaluateOutcome, EvaluateParams, EvaluateResponse, PropertyDescriptor, SearchParams,
};

/// Common interface to the evaluation service.
///
/// All three operations are shapes, not transports. Calls belonging to the
/// same attribute chain must be issued in order by the caller; calls for
/// independent probes may run concurrently.
#[async_trait::async_trait]
pub trait EvaluationProvider: Send + Sync {
    /// Structural node search. The predicate is the small string grammar
    /// `this<:TypeName` / `@lineSpan~=N`, joined with `&`. Returns `None`
    /// when the service could not run the search at all.
    async fn search_nodes(
        &self,
        attr_filter: &str,
        predicate: &str,
        line: u32,
    ) -> anyhow::Result<Option<Vec<NodeLocator>>>;

    /// Evaluates one property on one node.
    async fn evaluate_property(
        &self,
        locator: &NodeLocator,
        property: &str,
        args: &[PropertyArg],
    ) -> anyhow::Result<EvaluateOutcome>;

    /// Lists the properties available on a node's type. Used only by
    /// completion.
    async fn list_properties(&self, locator: &NodeLocator) -> anyhow::Result<Vec<PropertyDescriptor>>;

    /// Human-readable backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Configuration for selecting an evaluation backend.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// Spawn a subprocess speaking line-delimited JSON over stdio.
    Subprocess { command: String, args: Vec<String> },
}

impl ProviderConfig {
    /// Parse backend configuration from the environment or an explicit
    /// command line.
    ///
    /// Checks in order:
    /// 1. The explicit `--eval-command` argument
    /// 2. Environment variable PROBE_EVAL_COMMAND
    pub fn from_env_or_arg(arg: Option<&str>) -> anyhow::Result<Self> {
        let raw = match arg {
            Some(cmd) => cmd.to_string(),
            None => std::env::var("PROBE_EVAL_COMMAND").map_err(|_| {
                anyhow::anyhow!(
                    "no evaluation backend configured; pass --eval-command or set PROBE_EVAL_COMMAND"
                )
            })?,
        };
        let mut parts = raw.split_whitespace().map(str::to_string);
        let command = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("evaluation command is empty"))?;
        Ok(ProviderConfig::Subprocess { command, args: parts.collect() })
    }
}

/// Create an evaluation provider based on the configuration.
pub async fn create_provider(config: ProviderConfig) -> anyhow::Result<Box<dyn EvaluationProvider>> {
    match config {
        ProviderConfig::Subprocess { command, args } => {
            debug!("Creating subprocess evaluation provider: {} {:?}", command, args);
            let provider = SubprocessEvaluator::spawn(&command, &args).await?;
            Ok(Box::new(provider))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<T> {
    id: u64,
    method: &'static str,
    params: T,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: u64,
    #[serde(default)]
    stopped: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

enum Reply {
    Stopped,
    Result(Value),
    Error(String),
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Evaluation provider speaking line-delimited JSON to a spawned analyzer
/// process. One request per line out, one response per line in, correlated by
/// id; the reader task routes responses to their waiting callers.
pub struct SubprocessEvaluator {
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    _child: Child,
}

impl SubprocessEvaluator {
    pub async fn spawn(command: &str, args: &[String]) -> anyhow::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn evaluation service {}: {}", command, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("evaluation service has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("evaluation service has no stdout"))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let response: WireResponse = match serde_json::from_str(&line) {
                            Ok(response) => response,
                            Err(e) => {
                                warn!("Discarding malformed response line: {}", e);
                                continue;
                            }
                        };
                        let sender = reader_pending.lock().await.remove(&response.id);
                        let Some(sender) = sender else {
                            warn!("Response for unknown request id {}", response.id);
                            continue;
                        };
                        let reply = if response.stopped {
                            Reply::Stopped
                        } else if let Some(error) = response.error {
                            Reply::Error(error)
                        } else if let Some(result) = response.result {
                            Reply::Result(result)
                        } else {
                            Reply::Error("response carried neither result nor error".to_string())
                        };
                        let _ = sender.send(reply);
                    }
                    Ok(None) => {
                        debug!("Evaluation service closed its stdout");
                        break;
                    }
                    Err(e) => {
                        warn!("Evaluation service read failed: {}", e);
                        break;
                    }
                }
            }
            // Waiters see a dropped sender and report a transport failure.
            reader_pending.lock().await.clear();
        });

        Ok(SubprocessEvaluator {
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            _child: child,
        })
    }

    async fn call<T: Serialize>(&self, method: &'static str, params: T) -> anyhow::Result<Reply> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut line = serde_json::to_string(&WireRequest { id, method, params })?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().await.remove(&id);
                return Err(anyhow::anyhow!("evaluation service write failed: {}", e));
            }
        }

        rx.await
            .map_err(|_| anyhow::anyhow!("evaluation service dropped request {}", id))
    }
}

#[async_trait::async_trait]
impl EvaluationProvider for SubprocessEvaluator {
    async fn search_nodes(
        &self,
        attr_filter: &str,
        predicate: &str,
        line: u32,
    ) -> anyhow::Result<Option<Vec<NodeLocator>>> {
        let params = SearchParams {
            attr_filter: attr_filter.to_string(),
            predicate: predicate.to_string(),
            line,
        };
        match self.call("search", params).await? {
            Reply::Result(value) => Ok(serde_json::from_value(value)?),
            Reply::Stopped => Ok(None),
            Reply::Error(e) => Err(anyhow::anyhow!("search failed: {}", e)),
        }
    }

    async fn evaluate_property(
        &self,
        locator: &NodeLocator,
        property: &str,
        args: &[PropertyArg],
    ) -> anyhow::Result<EvaluateOutcome> {
        let params = EvaluateParams {
            locator: locator.clone(),
            property: property.to_string(),
            args: args.to_vec(),
        };
        match self.call("evaluateProperty", params).await? {
            Reply::Result(value) => {
                let response: EvaluateResponse = serde_json::from_value(value)?;
                Ok(EvaluateOutcome::Completed(response))
            }
            Reply::Stopped => Ok(EvaluateOutcome::Stopped),
            Reply::Error(e) => Err(anyhow::anyhow!("evaluateProperty failed: {}", e)),
        }
    }

    async fn list_properties(&self, locator: &NodeLocator) -> anyhow::Result<Vec<PropertyDescriptor>> {
        #[derive(Serialize)]
        struct Params<'a> {
            locator: &'a NodeLocator,
        }
        match self.call("listProperties", Params { locator }).await? {
            Reply::Result(value) => Ok(serde_json::from_value(value)?),
            Reply::Stopped => Ok(Vec::new()),
            Reply::Error(e) => Err(anyhow::anyhow!("listProperties failed: {}", e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "subprocess"
    }
}
