//! Shared application state.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::realtime::Notifier;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Storage,
    pub notifier: Notifier,
    pub ws_connection_count: Arc<AtomicUsize>,
}

pub type SharedState = Arc<Mutex<AppState>>;
