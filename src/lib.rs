//! `beadstore`: storage and identity engine for the beads issue
//! tracker.
//!
//! Issues, dependencies, labels, comments, and events live in a
//! relational store backed by a version-controlled SQL engine, so the
//! whole issue graph can be branched, merged, and federated between
//! peers. This crate is the engine under the CLI:
//!
//! - the multi-table issue graph and its ID rename cascade
//! - permanent issues vs ephemeral wisps (bulk-burned)
//! - the auto-close state machine for hierarchical molecules
//! - the encrypted federation-credential subsystem
//! - staleness tracking against the `issues.jsonl` export
//! - the read-only doctor check suite

pub mod config;
pub mod doctor;
pub mod error;
pub mod model;
pub mod molecule;
pub mod staleness;
pub mod storage;
pub mod util;

pub use error::{BeadsError, Result};
pub use model::{
    BlockedIssue, BurnResult, Comment, Dependency, DependencyType, Event, EventType,
    FederationPeer, Issue, IssueType, Priority, StaleMolecule, Status,
};
pub use storage::{BeadStore, IssueUpdate, ListFilters};
