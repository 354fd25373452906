//! Instance key extraction.
//!
//! The sidecar names the configured component a call is for in the
//! `x-component-instance` metadata field. One socket may serve many
//! configured components; the key tells them apart.

use std::fmt;

/// Metadata field naming the target component instance.
pub const INSTANCE_ID_METADATA_KEY: &str = "x-component-instance";

/// Identifies one component instance behind a socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKey {
    /// No instance field on the call.
    Default,
    /// Instance named by the call's metadata. May be empty.
    Named(String),
}

impl InstanceKey {
    /// Extract the key using a metadata lookup callback.
    ///
    /// A field that is present but empty is still a named key; only a
    /// missing field selects [`InstanceKey::Default`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: FnOnce(&str) -> Option<String>,
    {
        match lookup(INSTANCE_ID_METADATA_KEY) {
            Some(id) => Self::Named(id),
            None => Self::Default,
        }
    }

    /// Instance id, `None` for the default key.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(id) => Some(id),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("<default>"),
            Self::Named(id) => f.write_str(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_selects_default() {
        assert_eq!(InstanceKey::from_lookup(|_| None), InstanceKey::Default);
    }

    #[test]
    fn test_lookup_uses_reserved_field_name() {
        let key = InstanceKey::from_lookup(|name| {
            (name == INSTANCE_ID_METADATA_KEY).then(|| "tenant-a".to_string())
        });
        assert_eq!(key, InstanceKey::Named("tenant-a".to_string()));
        assert_eq!(key.id(), Some("tenant-a"));
    }

    #[test]
    fn test_empty_field_is_distinct_from_default() {
        let key = InstanceKey::from_lookup(|_| Some(String::new()));
        assert_eq!(key, InstanceKey::Named(String::new()));
        assert_ne!(key, InstanceKey::Default);
    }
}
