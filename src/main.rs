use std::sync::Arc;

use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::info;

use probe_language_server::logging::init_logger;
use probe_language_server::lsp::backend::ProbeBackend;
use probe_language_server::rpc::provider::{create_provider, ProviderConfig};

/// Language Server Protocol implementation for embedded AST text probes.
#[derive(Debug, Parser)]
#[command(name = "probe-language-server", version, about)]
struct Args {
    /// Command line for the evaluation service subprocess
    /// (overrides PROBE_EVAL_COMMAND).
    #[arg(long)]
    eval_command: Option<String>,

    /// Override the stderr log level (otherwise RUST_LOG or "info").
    #[arg(long)]
    log_level: Option<String>,

    /// Disable ANSI colors in stderr output.
    #[arg(long)]
    no_color: bool,

    /// Disable session log files in the cache directory.
    #[arg(long)]
    no_file_log: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _guard = init_logger(args.no_color, args.log_level.as_deref(), !args.no_file_log)?;

    let config = ProviderConfig::from_env_or_arg(args.eval_command.as_deref())?;
    let provider = Arc::from(create_provider(config).await?);

    info!("Starting probe language server on stdio");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| ProbeBackend::new(client, provider));

    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
