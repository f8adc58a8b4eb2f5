//! Storage engine: relational store, wisps, rename cascades, credential
//! vault, and federation peer registry.

pub mod credentials;
pub mod events;
pub mod federation;
pub mod remote;
pub mod rename;
pub mod schema;
pub mod sqlite;
pub mod wisp;

pub use federation::{is_ssh_url, shell_quote, validate_peer_name};
pub use remote::{LocalRemotes, RemoteEngine};
pub use sqlite::{BeadStore, IssueUpdate, ListFilters};
