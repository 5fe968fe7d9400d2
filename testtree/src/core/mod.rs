//! Deterministic, in-memory result tree.
//!
//! Core modules are free of I/O. Collaborators reach the tree through
//! [`tree::Tree`] and hear back from it through [`events`].

pub mod debrief;
pub mod error;
pub mod events;
pub mod invariants;
pub mod nugget;
pub mod selection;
pub mod status;
pub mod tree;
pub mod types;
