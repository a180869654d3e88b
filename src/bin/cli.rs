//! athenaeum-cli: offline helper for indexing and querying a book without
//! starting the HTTP/MCP servers.

use std::sync::Arc;

use athenaeum::config::Config;
use athenaeum::embedding;
use athenaeum::library::BookLibrary;
use athenaeum::mcp::protocol::McpServer;
use athenaeum::mcp::transport::StdioHandler;
use athenaeum::retrieval;
use athenaeum::state::AppState;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "athenaeum-cli", about = "Offline book indexing and search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List books in the configured books directory.
    List,
    /// Build (or load) a book's index.
    Index { book: String },
    /// Run a hybrid search against an already-indexed book.
    Search {
        book: String,
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Serve the MCP JSON-RPC tools/resources over stdio instead of HTTP.
    McpStdio,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let config = Config::load();
    let cli = Cli::parse();

    if matches!(cli.command, Command::McpStdio) {
        let state = Arc::new(AppState::new(config)?);
        let server = McpServer::new(StdioHandler::new(state));
        return server.run().map_err(Into::into);
    }

    let embedder = embedding::create_embedder(&config.embedding_config())?;
    let library = BookLibrary::new(config.books_dir(), config.book_cache_dir(), embedder.clone());

    match cli.command {
        Command::List => {
            for entry in library.list() {
                println!("{}\t{}\t{}", entry.file, entry.title, entry.has_index);
            }
        }
        Command::Index { book } => {
            let index = library.get_or_build(&book)?;
            println!("indexed {} chunks for {book}", index.len());
        }
        Command::Search { book, query, top_k } => {
            let index = library.get_or_build(&book)?;
            let embedding: Arc<dyn athenaeum::embedding::Embedder> = embedder;
            let query_embedding = embedding.embed(&query).ok();
            let hits = retrieval::search(&index, &query, query_embedding.as_deref(), top_k, 0.5);
            for hit in hits {
                println!("[{:.4}] chunk {}: {}", hit.score, hit.chunk.id, truncate(&hit.chunk.text, 120));
            }
        }
        Command::McpStdio => unreachable!("handled above"),
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}
