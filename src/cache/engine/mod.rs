//! Public engine facade.

pub mod core;

#[cfg(test)]
mod scenarios;

pub use self::core::{CacheEngine, StreamRequest};
pub use crate::cache::ingest::committer::RepairReport;
