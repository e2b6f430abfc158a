//! # TerraClaw Template Registry
//!
//! Owns the local cache of reusable workspace templates: fetch, version,
//! validate, remove, and per-workspace materialization. Independent of
//! scheduling — the lifecycle engine calls `resolve` when it needs a
//! configuration directory, nothing more.
//!
//! ## Layout
//! ```text
//! ~/.terraclaw/registry.db          # records (name, source, ref, version, ...)
//! ~/.terraclaw/templates/<name>/    # cached copy, replaced atomically on update
//! ```
//!
//! Fetching is pluggable by URL scheme (local path, git repository, remote
//! file); the registry itself is scheme-agnostic.

pub mod db;
pub mod fetch;
pub mod record;
pub mod registry;

pub use db::RegistryDb;
pub use fetch::{Fetcher, GitFetcher, HttpFetcher, LocalFetcher};
pub use record::TemplateRecord;
pub use registry::TemplateRegistry;
