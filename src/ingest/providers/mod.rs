// src/ingest/providers/mod.rs
pub mod twitter;

pub use twitter::TwitterProvider;
