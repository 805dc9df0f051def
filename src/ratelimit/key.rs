//! Composite store key generation.

/// A key that uniquely identifies a counter in the shared store.
///
/// Keys from different operations share one store, so the operation's
/// prefix is folded into the key as `prefix:identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Build the key for `identifier` under an optional prefix.
    pub fn new(prefix: Option<&str>, identifier: &str) -> Self {
        match prefix {
            Some(prefix) => Self(format!("{}:{}", prefix, identifier)),
            None => Self(identifier.to_string()),
        }
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RateLimitKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
