use serde::{Deserialize, Serialize};

use turnstile_core::ResourceName;

/// The kind of entity a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Exclusive lock record: holder token with a lease.
    Lock,
    /// Semaphore timeout index: token scored by acquisition time (ms).
    Timeout,
    /// Fair semaphore owner index: token scored by issuance number.
    Owner,
    /// Fair semaphore issuance counter.
    Counter,
}

impl KeyKind {
    /// Return a string representation of the key kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lock => "lock",
            Self::Timeout => "timeout",
            Self::Owner => "owner",
            Self::Counter => "counter",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address entries in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: KeyKind,
    pub name: ResourceName,
}

impl StateKey {
    /// Create a new state key.
    #[must_use]
    pub fn new(kind: KeyKind, name: impl Into<ResourceName>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn lock(name: impl Into<ResourceName>) -> Self {
        Self::new(KeyKind::Lock, name)
    }

    #[must_use]
    pub fn timeout(name: impl Into<ResourceName>) -> Self {
        Self::new(KeyKind::Timeout, name)
    }

    #[must_use]
    pub fn owner(name: impl Into<ResourceName>) -> Self {
        Self::new(KeyKind::Owner, name)
    }

    #[must_use]
    pub fn counter(name: impl Into<ResourceName>) -> Self {
        Self::new(KeyKind::Counter, name)
    }

    /// Return a canonical string representation: `kind:name`
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_as_str() {
        assert_eq!(KeyKind::Lock.as_str(), "lock");
        assert_eq!(KeyKind::Timeout.as_str(), "timeout");
        assert_eq!(KeyKind::Owner.as_str(), "owner");
        assert_eq!(KeyKind::Counter.as_str(), "counter");
    }

    #[test]
    fn state_key_canonical() {
        assert_eq!(StateKey::timeout("printer").canonical(), "timeout:printer");
        assert_eq!(StateKey::lock("printer").to_string(), "lock:printer");
    }

    #[test]
    fn keys_of_one_resource_differ_by_kind() {
        assert_ne!(StateKey::owner("r"), StateKey::timeout("r"));
        assert_eq!(StateKey::counter("r").name.as_str(), "r");
    }
}
