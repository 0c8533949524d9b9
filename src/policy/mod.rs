//! Policy catalog and version resolution
//!
//! This module stores versioned policy artifacts, lists them for browsing and
//! resolves batches of (name, version, strategy) requests to concrete releases.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Strategy   │────▶│  Resolver   │────▶│ Repository  │
//! │ (classify)  │     │  (fan-out)  │     │  (lookups)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲                   ▲
//!                            │                   │
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Catalog   │────▶│    Store    │
//!                     │ (list, get) │     │  (SQLite)   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`catalog`]: Listing, version lookup, docs and publishing
//! - [`error`]: Store and catalog error types
//! - [`pagination`]: Page clamping and total page computation
//! - [`repository`]: Persistence trait including the bulk strategy lookups
//! - [`resolver`]: Concurrent batch resolution with fail-fast semantics
//! - [`store`]: SQLite implementation of the repository
//! - [`strategy`]: Resolution strategies and batch classification
//! - [`types`]: Domain types like `PolicyVersion` and `ResolvedItem`
//! - [`version`]: Version parsing, validation and ordering

pub mod catalog;
pub mod error;
pub mod pagination;
pub mod repository;
pub mod resolver;
pub mod store;
pub mod strategy;
pub mod types;
pub mod version;
