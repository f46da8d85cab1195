//! Ant: multi-tenant IVF-Flat vector index with append-only-file and
//! snapshot persistence.

pub mod aof;
pub mod backup;
pub mod config;
pub mod error;
pub mod index;
pub mod instance;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod snapshot;
pub mod startup;
pub mod types;
