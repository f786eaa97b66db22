// src/ct_log/mod.rs
pub mod client;
pub mod crawler;
pub mod leaf;
pub mod retry;
pub mod types;

pub use client::{CtLogClient, FetchError};
pub use crawler::{CrawlError, CrawlOptions, CrawlState, CrawlSummary, Crawler};
pub use leaf::{DecodeError, LeafHeader, LogEntryType};
pub use retry::RetryPolicy;
pub use types::{LeafEntry, SignedTreeHead};
