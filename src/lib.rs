// src/lib.rs
// Library interface for ct-ingest
pub mod cert_parser;
pub mod cli;
pub mod config;
pub mod ct_log;
pub mod cursor;
pub mod database;
pub mod export;
pub mod filter;
pub mod progress;
pub mod stats;
pub mod types;
pub mod upsert;
