//! Runtime configuration (spec §6 Environment variables; SPEC_FULL §10.3).
//!
//! Precedence: process env > `.env` file > built-in defaults. A `.env` file
//! in the working directory is loaded (if present) before `clap` parses
//! process args/env, so process env always wins over the file.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{AthenaeumError, Result};

/// A `host:port` pair for one of the three listeners.
#[derive(Debug, Clone)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AthenaeumError::Config(format!("invalid listen address: {e}")))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "athenaeum", about = "Multi-protocol AI-assisted book-analysis server")]
pub struct Config {
    /// Directory books are loaded/indexed from.
    #[arg(long, env = "BOOKS_DIR", default_value = "./books")]
    pub books_dir: String,

    /// Optional single-book override, bypassing the library listing.
    #[arg(long, env = "BOOK_PATH")]
    pub book_path: Option<String>,

    /// Directory per-book `{stem}_index.json` files are cached in.
    #[arg(long, env = "BOOK_CACHE", default_value = "./.book_cache")]
    pub book_cache: String,

    #[arg(long, env = "AI_PROVIDER", default_value = "gemini")]
    pub ai_provider: String,

    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "REDIS_PORT")]
    pub redis_port: Option<u16>,

    #[arg(long, env = "REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB")]
    pub redis_db: Option<u16>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[arg(long, env = "WEB_SERVER_HOST", default_value = "0.0.0.0")]
    pub web_server_host: String,

    #[arg(long, env = "WEB_SERVER_PORT", default_value_t = 8080)]
    pub web_server_port: u16,

    #[arg(long, env = "MCP_SERVER_HOST", default_value = "0.0.0.0")]
    pub mcp_server_host: String,

    #[arg(long, env = "MCP_SERVER_PORT", default_value_t = 8081)]
    pub mcp_server_port: u16,

    #[arg(long, env = "WS_SERVER_HOST", default_value = "0.0.0.0")]
    pub ws_server_host: String,

    #[arg(long, env = "WS_SERVER_PORT", default_value_t = 8082)]
    pub ws_server_port: u16,
}

impl Config {
    /// Load `.env` (if present) then parse process args/env over it.
    pub fn load() -> Self {
        let _ = dotenv_if_present();
        Config::parse()
    }

    pub fn web_server_addr(&self) -> ServerAddr {
        ServerAddr {
            host: self.web_server_host.clone(),
            port: self.web_server_port,
        }
    }

    pub fn mcp_server_addr(&self) -> ServerAddr {
        ServerAddr {
            host: self.mcp_server_host.clone(),
            port: self.mcp_server_port,
        }
    }

    pub fn ws_server_addr(&self) -> ServerAddr {
        ServerAddr {
            host: self.ws_server_host.clone(),
            port: self.ws_server_port,
        }
    }

    pub fn books_dir(&self) -> PathBuf {
        expand_path(&self.books_dir)
    }

    pub fn book_cache_dir(&self) -> PathBuf {
        expand_path(&self.book_cache)
    }

    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: self.ai_provider.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
            openai_api_key: self.openai_api_key.clone(),
        }
    }
}

/// Provider selection + credentials handed to `embedding::create_embedder`.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string()))
}

/// Minimal `.env` loader: `KEY=VALUE` lines, `#` comments, no interpolation.
/// Only sets variables not already present in the process environment, so
/// process env always takes precedence per spec §6.
fn dotenv_if_present() -> Result<()> {
    let path = PathBuf::from(".env");
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(&path)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_resolves_relative() {
        let p = expand_path("./books");
        assert_eq!(p, PathBuf::from("./books"));
    }
}
