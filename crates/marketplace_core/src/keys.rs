//! crates/marketplace_core/src/keys.rs
//!
//! Per-purchase archive passwords.

use std::fmt;

/// Number of random bytes behind every key (256 bits).
pub const KEY_BYTES: usize = 32;

/// Length of the rendered key: two hex characters per byte.
pub const KEY_LEN: usize = KEY_BYTES * 2;

/// The secret bound to one purchase and used as its archive password.
///
/// `Debug` is redacted so the key cannot end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    /// Wraps a key that was previously generated and persisted.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw key text.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(***)")
    }
}

/// Mints a fresh key from the operating system's CSPRNG.
///
/// The only failure is the entropy source being unavailable, which callers
/// treat as fatal for the operation in progress.
pub fn generate_key() -> Result<EncryptionKey, getrandom::Error> {
    let mut bytes = [0u8; KEY_BYTES];
    getrandom::getrandom(&mut bytes)?;
    Ok(EncryptionKey(hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_have_fixed_length_hex_form() {
        let key = generate_key().unwrap();
        assert_eq!(key.expose().len(), KEY_LEN);
        assert!(key.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ten_thousand_keys_do_not_collide() {
        let keys: HashSet<String> = (0..10_000)
            .map(|_| generate_key().unwrap().expose().to_string())
            .collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn debug_output_hides_the_key() {
        let key = generate_key().unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(key.expose()));
    }
}
