//! Gitloom - version-control integration for a mutable application
//! definition.
//!
//! Gitloom binds one logical "application" to a Git repository and exposes
//! a bounded operation surface over it: connect, commit, push, pull,
//! branch, checkout, merge, mergeability-check, status, log, and detach.
//! Conflict and mergeability information is surfaced to callers before any
//! destructive operation occurs.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`service`] - The operation surface; resolves bindings and delegates
//! - [`git`] - Single interface for all Git operations
//! - [`artifact`] - Application state, file trees, and the serializer
//!   boundary
//! - [`store`] - Document-store boundary and records
//! - [`core`] - Strong types, path routing, locking, configuration
//! - [`error`] - The service-level error taxonomy
//!
//! # Correctness Invariants
//!
//! 1. At most one structural operation is in flight per
//!    `(application, branch)` key
//! 2. Structural mutations are atomic: failure restores the pre-operation
//!    tree (a conflicted pull is the single documented exception)
//! 3. The mergeability dry run never mutates a ref or the working tree
//! 4. Exports are deterministic, so diffs reflect real changes only
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gitloom::artifact::JsonTreeSerializer;
//! use gitloom::core::config::CoreConfig;
//! use gitloom::git::RemoteAuth;
//! use gitloom::service::{GitSyncService, StaticCredentials};
//! use gitloom::store::InMemoryDocumentStore;
//!
//! # fn main() -> Result<(), gitloom::error::SyncError> {
//! let service = GitSyncService::new(
//!     Arc::new(InMemoryDocumentStore::new()),
//!     Arc::new(JsonTreeSerializer),
//!     Arc::new(StaticCredentials(RemoteAuth::Anonymous)),
//!     CoreConfig::with_root("/var/lib/gitloom".into()),
//! )?;
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod core;
pub mod error;
pub mod git;
pub mod service;
pub mod store;

pub use error::{ErrorKind, SyncError};
pub use service::GitSyncService;
