//! twin-crawler library crate.
//!
//! Crawls a federated graph of digital twin records: a job starts from one
//! root item, fans out one asynchronous transfer per item, expands the
//! frontier from every completed transfer and assembles the per-item results
//! into one deduplicated aggregate once nothing is outstanding.

pub mod assembler;
pub mod collaborators;
pub mod config;
pub mod crawl;
pub mod domain;
pub mod error;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod query;

pub use error::{Error, Result, TransportError};
