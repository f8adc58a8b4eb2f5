//! Shared utilities: identifier service and timestamp parsing.

pub mod id;
pub mod time;

pub use id::{
    child_id, is_hash_id, is_valid_identifier, IdConfig, IdGenerator,
};
pub use time::parse_import_timestamp;
