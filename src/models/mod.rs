// src/models/mod.rs

//! Domain models for the backfill pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod item;
mod run;

// Re-export all public types
pub use config::{
    Config, HtmlIndexConfig, HttpConfig, JsonApiConfig, RateLimitPolicy, RetryConfig, SourceConfig,
    StoreConfig,
};
pub use item::{Candidate, DiscoveredItem, DiscoveryMethod};
pub use run::{Run, RunCounters, RunParams, RunReport, RunStatus, SkipReason};
