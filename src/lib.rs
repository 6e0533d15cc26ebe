pub mod directory;
pub mod error;
pub mod logging;
pub mod message_log;
pub mod read_state;
pub mod realtime;
pub mod resolver;
pub mod storage;
pub mod web;
