// Protolens Language Server Protocol (LSP) Binary
// Serves definition, hover, completion, outline and highlighting over stdio

use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use tower_lsp::{LspService, Server};
use tracing::Level;

use protolens_core::config::AnalyzerConfig;
use protolens_core::lsp::{Analyzer, Highlighter, ProtoTrees, ProtolensLanguageServer};

/// Protolens - language server for Protocol Buffers
#[derive(Parser)]
#[command(name = "protolens-lsp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Language server for Protocol Buffers", long_about = None)]
struct Cli {
    /// Extra import search root (repeatable), searched after workspace roots
    #[arg(short = 'I', long = "import-path")]
    import_path: Vec<PathBuf>,

    /// Communicate over stdio (the only transport; accepted for editor compatibility)
    #[arg(long = "stdio")]
    stdio: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries the protocol stream
    let level = std::env::var("PROTOLENS_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli_config = AnalyzerConfig::new(cli.import_path);
    let trees = ProtoTrees::new()?;
    let highlighter = Highlighter::new(&trees)?;
    let analyzer = Analyzer::new(trees, cli_config.clone())?;
    tracing::info!(stdio = cli.stdio, "starting protolens-lsp");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(move |client| {
        ProtolensLanguageServer::new(client, analyzer, highlighter, cli_config)
    });

    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}
