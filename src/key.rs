//! Cache key derivation
//!
//! Free text in, bounded key out. Lower-cased (full Unicode, so `İ` and the
//! Kelvin sign fold to ASCII), ASCII alphanumerics only, first 50 characters.
//! Queries with no alphanumerics all share the empty key.

/// Maximum key length in characters
pub const MAX_KEY_LEN: usize = 50;

/// Derive the cache key for a user query
pub fn derive_key(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_KEY_LEN)
        .collect()
}
