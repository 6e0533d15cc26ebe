//! Configuration types and constants for the quad-web server.

use std::path::PathBuf;

use clap::Parser;

pub(crate) const WS_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;

/// Page size used when a message listing request does not specify one.
pub(crate) const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Result cap for people search.
pub(crate) const SEARCH_LIMIT: u32 = 10;

/// Web server for the quad campus messaging service.
///
/// Provides REST API + WebSocket for conversations and messages, and
/// persists state in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "quad-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: QUAD_WEB_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: QUAD_HOME] [default: ~/.quad]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("QUAD_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".quad"))
                    .unwrap_or_else(|_| PathBuf::from(".quad"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("QUAD_WEB_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        Self {
            bind_addr,
            data_dir,
        }
    }
}
