//! Utility functions for Relay
//!
//! Identifier generation and name validation shared by the bus, storage, and
//! service crates.

use std::sync::LazyLock;

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of generated record identifiers
pub const ID_LENGTH: usize = 14;

/// Regex pattern for a single subject token (service and method names)
static TOKEN_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_:$-]+$").expect("Invalid regex pattern"));

/// Validate that a name can be used as exactly one subject token
///
/// Allowed characters: alphanumeric, underscore, colon, dollar, hyphen.
/// Dots, wildcards and whitespace are rejected because they change how the
/// broker splits and matches subjects.
///
/// # Examples
///
/// ```
/// use relay_common::is_valid_token;
///
/// assert!(is_valid_token("user-service"));
/// assert!(is_valid_token("addUser"));
/// assert!(!is_valid_token("user.service"));
/// assert!(!is_valid_token("*"));
/// assert!(!is_valid_token(""));
/// ```
pub fn is_valid_token(name: &str) -> bool {
    TOKEN_PATTERN.is_match(name)
}

/// Generate a random base62 identifier
///
/// Keys are shared by every service on the same store, so identifiers must be
/// globally collision-resistant rather than unique per service.
pub fn generate_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}
