//! SafeGate Core Library
//!
//! This crate provides the pure decision logic for the SafeGate parental
//! content filter. It has no I/O and no async: everything here is callable
//! from both the backend gateway and the WebAssembly browser agent, which
//! guarantees that client and server agree on canonical domain keys and
//! policy semantics.
//!
//! # Modules
//!
//! - `hash`: Murmur3 hash functions for domain set membership
//! - `domain`: URL-to-domain normalization (single canonical key)
//! - `policy`: child profiles, domain sets, and the static policy gate
//! - `verdict`: the structured safe/unsafe decision unit
//! - `extract`: bounded page text/image extraction filters
//! - `scan`: the client-side scan state machine

pub mod domain;
pub mod extract;
pub mod hash;
pub mod policy;
pub mod scan;
pub mod verdict;

// Re-export commonly used types
pub use domain::normalize_domain;
pub use hash::{hash64, hash_domain, Hash64};
pub use policy::{DomainSet, FilteringLevel, PolicyDecision, PolicyGate, Profile};
pub use scan::{ScanEffect, ScanEvent, ScanMachine, ScanState};
pub use verdict::{CheckType, Status, Verdict};
