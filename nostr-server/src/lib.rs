pub mod auth;
pub mod fanout;
pub mod frame;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod quality;
pub mod session_registry;
pub mod state;
pub mod topics;
pub mod websocket;
