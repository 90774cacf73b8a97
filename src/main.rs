//! # askpdf CLI
//!
//! Command-line interface for the askpdf pipeline. Presentation only —
//! every command constructs a [`RagService`] and delegates to it.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askpdf status` | Check Ollama and required model availability |
//! | `askpdf layout` | Run layout analysis over the PDF directory |
//! | `askpdf build` | Extract, chunk, embed, and persist the index |
//! | `askpdf query "<question>"` | Answer a single question |
//! | `askpdf chat` | Interactive question loop |

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use askpdf::config;
use askpdf::models::QueryResult;
use askpdf::service::RagService;

/// askpdf — ask questions of your local PDF collection.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; with no file present the built-in defaults are used (PDFs in
/// `./pdfs`, index in `./storage`, Ollama at `http://localhost:11434`).
#[derive(Parser)]
#[command(
    name = "askpdf",
    about = "Local retrieval-augmented question answering over a directory of PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./askpdf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Report Ollama status and model availability.
    ///
    /// Checks that the server answers, lists every model it serves, and
    /// flags required models that still need to be pulled.
    Status,

    /// Run layout analysis over the PDF directory.
    ///
    /// Renders each page, runs the layout-detection service over it, and
    /// caches cropped regions plus per-page manifests. Documents with an
    /// existing cache entry are skipped.
    Layout,

    /// Build the vector index from the PDF directory.
    ///
    /// Loads every PDF (fusing cached layout descriptions into the
    /// text), chunks, embeds each chunk via Ollama, and persists the
    /// index — fully replacing any previous one.
    Build,

    /// Answer a single question against the index.
    ///
    /// Builds the index first if none exists in memory or on disk.
    Query {
        /// The question to answer.
        question: String,
    },

    /// Interactive question loop. Type `exit`, `quit`, or `q` to leave.
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Status => {
            let service = RagService::new(cfg).await?;
            run_status(&service).await;
        }
        Commands::Layout => {
            let service = RagService::new(cfg).await?;
            let summary = service.analyze_layouts().await?;
            println!("layout analysis");
            println!("  analyzed: {}", summary.analyzed);
            println!("  cached (skipped): {}", summary.cached);
            println!("  failed: {}", summary.failed);
        }
        Commands::Build => {
            let mut service = RagService::new(cfg).await?;
            let summary = service.build_index().await?;
            println!("index built");
            println!("  documents: {}", summary.documents);
            println!("  chunks: {}", summary.nodes);
        }
        Commands::Query { question } => {
            let mut service = RagService::new(cfg).await?;
            let response = service.query(&question).await?;
            print_response(response.as_ref());
        }
        Commands::Chat => {
            let mut service = RagService::new(cfg).await?;
            run_chat(&mut service).await?;
        }
    }

    Ok(())
}

/// Print Ollama status and model availability (the `status` command).
async fn run_status(service: &RagService) {
    println!("== Ollama Status ==");

    let report = service.check_environment().await;
    match &report.version {
        Some(version) => println!("Ollama is running (version {})", version),
        None => {
            println!("Ollama is not running. Please start Ollama.");
            println!("  expected at: {}", service.config().ollama.base_url);
            return;
        }
    }

    println!("\nRequired models:");
    for (model, present) in &report.models {
        if *present {
            println!("  [ok]      {}", model);
        } else {
            println!("  [missing] {} — pull with: ollama pull {}", model, model);
        }
    }

    println!("\nAll available models ({}):", report.available.len());
    for model in &report.available {
        println!("  - {}", model);
    }
}

/// Print a query result in the interactive format: the answer between
/// rules, then the numbered source documents.
fn print_response(response: Option<&QueryResult>) {
    match response {
        Some(result) => {
            println!("\nResponse:");
            println!("{}", "-".repeat(80));
            println!("{}", result.response);
            println!("{}", "-".repeat(80));

            println!("\nSources:");
            for (i, source) in result.sources.iter().enumerate() {
                println!("{}. From: {}", i + 1, source.metadata.source);
            }
        }
        None => {
            println!("\nFailed to get a response.");
            println!("Add PDF documents to the PDF directory and run `askpdf build`.");
        }
    }
}

/// Interactive query loop (the `chat` command).
async fn run_chat(service: &mut RagService) -> Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("{:^80}", "Retrieval Augmented Generation (RAG) System");
    println!("{}\n", "=".repeat(80));

    if !service.has_index() {
        println!("No index loaded. It will be built on your first question.");
    }

    println!("Enter your questions (type 'exit' to quit):");

    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }

        let response = service.query(question).await?;
        print_response(response.as_ref());
    }

    Ok(())
}
