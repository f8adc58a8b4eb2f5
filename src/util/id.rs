//! Identifier service: ID generation, classification, and validation.
//!
//! Issue IDs have the form `<prefix>-<hash>` where hash is base36
//! lowercase (0-9, a-z) with adaptive length based on DB size.
//! Hierarchical IDs append `.N` segments to a root ID: `bd-abc123.1.2`.

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Classify an identifier as hash-based.
///
/// The leaf is the suffix after the `<prefix>-` separator with any
/// dot-separated hierarchical tail removed. A leaf of five or more
/// characters qualifies when it is all lowercase alphanumeric; a shorter
/// leaf must additionally contain at least one lowercase letter, so short
/// pure-numeric suffixes read as sequential IDs. Uppercase letters,
/// special characters, and empty suffixes never qualify.
#[must_use]
pub fn is_hash_id(id: &str) -> bool {
    let Some(pos) = id.find('-') else {
        return false;
    };
    let suffix = &id[pos + 1..];
    let leaf = suffix.split('.').next().unwrap_or("");
    if leaf.is_empty() {
        return false;
    }
    if !leaf
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return false;
    }
    leaf.len() >= 5 || leaf.chars().any(|c| c.is_ascii_lowercase())
}

/// Check that a name is a safe SQL identifier.
///
/// Gates identifier interpolation into SQL text to prevent injection.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    });
    !name.is_empty() && re.is_match(name)
}

/// Generate a child ID from a parent.
///
/// Child IDs have format `<parent>.<n>` where n is the child number.
#[must_use]
pub fn child_id(parent_id: &str, child_number: u32) -> String {
    format!("{parent_id}.{child_number}")
}

/// Check if an ID is a child ID (contains a dot after the hash).
#[must_use]
pub fn is_child_id(id: &str) -> bool {
    id.find('-')
        .map_or_else(|| id.contains('.'), |pos| id[pos + 1..].contains('.'))
}

/// Get the parent of a hierarchical ID, or `None` for root IDs.
#[must_use]
pub fn parent_id(id: &str) -> Option<String> {
    let hash_start = id.find('-').map_or(0, |pos| pos + 1);
    let last_dot = id[hash_start..].rfind('.')?;
    Some(id[..hash_start + last_dot].to_string())
}

/// ID generation configuration.
#[derive(Debug, Clone)]
pub struct IdConfig {
    /// Issue ID prefix (e.g., "bd").
    pub prefix: String,
    /// Minimum hash length.
    pub min_hash_length: usize,
    /// Maximum hash length.
    pub max_hash_length: usize,
    /// Maximum collision probability before increasing length.
    pub max_collision_prob: f64,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: "bd".to_string(),
            min_hash_length: 3,
            max_hash_length: 8,
            max_collision_prob: 0.25,
        }
    }
}

impl IdConfig {
    /// Create a new ID config with the given prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }
}

/// ID generator that produces unique hash-based issue IDs.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    config: IdConfig,
}

impl IdGenerator {
    #[must_use]
    pub const fn new(config: IdConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(IdConfig::default())
    }

    /// Get the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Compute the optimal hash length for a given issue count.
    ///
    /// Uses the birthday problem approximation to estimate collision
    /// probability.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    pub fn optimal_length(&self, issue_count: usize) -> usize {
        let n = issue_count as f64;
        let max_prob = self.config.max_collision_prob;

        for len in self.config.min_hash_length..=self.config.max_hash_length {
            let space = 36_f64.powi(len as i32);
            // P(collision) ≈ 1 - e^(-n²/2d)
            let prob = 1.0 - (-n * n / (2.0 * space)).exp();
            if prob < max_prob {
                return len;
            }
        }
        self.config.max_hash_length
    }

    /// Generate a candidate ID with the given parameters.
    #[must_use]
    pub fn generate_candidate(
        &self,
        title: &str,
        creator: Option<&str>,
        created_at: DateTime<Utc>,
        nonce: u32,
        hash_length: usize,
    ) -> String {
        let seed = id_seed(title, creator, created_at, nonce);
        let hash_str = compute_id_hash(&seed, hash_length);
        format!("{}-{hash_str}", self.config.prefix)
    }

    /// Generate an ID, checking for collisions with the provided checker.
    ///
    /// The checker function should return `true` if the ID already exists.
    pub fn generate<F>(
        &self,
        title: &str,
        creator: Option<&str>,
        created_at: DateTime<Utc>,
        issue_count: usize,
        exists: F,
    ) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut length = self.optimal_length(issue_count);

        loop {
            for nonce in 0..10 {
                let id = self.generate_candidate(title, creator, created_at, nonce, length);
                if !exists(&id) {
                    return id;
                }
            }

            // All nonces collided at this length
            if length < self.config.max_hash_length {
                length += 1;
            } else {
                let mut nonce = 10;
                loop {
                    let seed = id_seed(title, creator, created_at, nonce);
                    let hash_str = compute_id_hash(&seed, 12);
                    let id = format!("{}-{hash_str}", self.config.prefix);
                    if !exists(&id) {
                        return id;
                    }
                    nonce += 1;
                    if nonce > 1000 {
                        // Desperate fallback: append the nonce to guarantee uniqueness
                        return format!("{}-{}-{}", self.config.prefix, hash_str, nonce);
                    }
                }
            }
        }
    }
}

fn id_seed(title: &str, creator: Option<&str>, created_at: DateTime<Utc>, nonce: u32) -> String {
    format!(
        "{}|{}|{}|{}",
        title,
        creator.unwrap_or(""),
        created_at.timestamp_nanos_opt().unwrap_or(0),
        nonce
    )
}

/// Compute a base36 hash of the input string with a specific length.
#[must_use]
pub fn compute_id_hash(input: &str, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();

    // First 8 bytes as a u64
    let mut num = 0u64;
    for &byte in result.iter().take(8) {
        num = (num << 8) | u64::from(byte);
    }

    let mut s = base36_encode(num);
    if s.len() < length {
        s = format!("{s:0>length$}");
    }
    s.chars().take(length).collect()
}

fn base36_encode(mut num: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if num == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while num > 0 {
        chars.push(ALPHABET[(num % 36) as usize] as char);
        num /= 36;
    }
    chars.into_iter().rev().collect()
}
