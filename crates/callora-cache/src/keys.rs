//! Cache key builders for Callora
//!
//! Standardized key naming for everything this core stores in Redis,
//! keeping keys consistent and collision-free.
//!
//! # Key Patterns
//!
//! - `presence:{account_id}` - TTL-keyed presence heartbeat; the key
//!   lapsing is what marks an account offline after a client crash

/// Prefix for presence heartbeat keys
///
/// Format: `presence:{account_id}`
pub const PRESENCE_KEY_PREFIX: &str = "presence";

/// Build the presence heartbeat key for an account
///
/// # Example
///
/// ```
/// use callora_cache::keys::presence_key;
///
/// assert_eq!(presence_key(42), "presence:42");
/// ```
pub fn presence_key(account_id: i64) -> String {
    format!("{}:{}", PRESENCE_KEY_PREFIX, account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_key_format() {
        assert_eq!(presence_key(1), "presence:1");
        assert_eq!(presence_key(9_000_000_000), "presence:9000000000");
    }
}
