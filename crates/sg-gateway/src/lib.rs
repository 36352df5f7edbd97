//! SafeGate Moderation Gateway
//!
//! The backend half of the SafeGate content filter. An incoming check runs
//! through a fixed pipeline:
//!
//! 1. resolve the child profile for the device identifier
//! 2. static policy gate (allow/block lists, time windows) — no I/O
//! 3. on `Defer`, fan out to external classifiers (url / text / image)
//!    concurrently, each behind the two-tier result cache
//! 4. aggregate, log blocked outcomes fire-and-forget, respond
//!
//! Every failure inside the pipeline resolves to a conservative fail-open
//! default; the browsing flow never sees a hard error.
//!
//! # Modules
//!
//! - `cache`: fingerprinting and the two-tier (memory + sqlite) verdict cache
//! - `classify`: classifier capability trait, remote providers, defensive parsing
//! - `config`: gateway configuration (clap derive, env-overridable)
//! - `orchestrator`: the moderation decision pipeline
//! - `rate_limit`: per-device token buckets
//! - `server`: axum HTTP API
//! - `store`: profile and activity store contracts + sqlite implementations

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod rate_limit;
pub mod server;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use orchestrator::Orchestrator;
