//! Hierarchical test-result tree.
//!
//! A test runner reports (possibly partial) results per test file; this crate
//! merges them into a live tree of suites and tests, keeps parent statuses
//! aggregated, and tracks selection and queueing across selective re-runs.
//!
//! - **[`core`]**: The tree itself: merge protocol, status precedence,
//!   selection, events and lazy loading. No I/O.
//! - **[`io`]**: The `.testtree/` store (config, schema, snapshot).
//!
//! [`framework`] owns one tree plus its run ledger. Orchestration modules
//! ([`store`], [`merge`], [`summary`], [`validate`]) implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod framework;
pub mod io;
pub mod logging;
pub mod merge;
pub mod store;
pub mod summary;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
