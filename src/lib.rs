pub mod config;
pub mod core;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod security;
pub mod server;
pub mod session;
pub mod state;
pub mod vector;
pub mod websearch;
