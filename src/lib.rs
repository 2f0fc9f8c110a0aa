//! curator - LLM-driven movie discovery with quality-gated library sync
//!
//! Three subsystems: a multi-agent discovery orchestrator, a quality
//! analysis engine that aggregates multi-provider ratings into one verdict,
//! and an idempotent sync engine in front of a Radarr-style library API.

pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod quality;
pub mod services;
pub mod sync;
