//! quad-web: REST + WebSocket server over the messaging service.
//!
//! Serves the conversation, message, read-state, and profile APIs backed by
//! SQLite, and fans newly appended messages out to WebSocket clients.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;

use crate::realtime::Notifier;
use crate::storage::{db_path, Storage};

use config::{Cli, Config, WS_CHANNEL_CAPACITY};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::qlog!("quad-web starting");
    crate::qlog!("  data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).expect("failed to create data directory");
    let storage = Storage::open(&db_path(&config.data_dir)).expect("failed to open database");
    crate::qlog!("  database: {}", db_path(&config.data_dir).display());

    let notifier = Notifier::new(WS_CHANNEL_CAPACITY);
    let ws_connection_count = Arc::new(AtomicUsize::new(0));

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        notifier,
        ws_connection_count,
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::qlog!("quad-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
