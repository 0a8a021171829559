use std::cell::Cell;
use std::fmt;

/// Identifier under which a source, layer or image is registered with the engine.
///
/// Either supplied by the author or produced by an [`IdGenerator`]. Once a
/// binding has resolved its id it never changes for that mount.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(String);

impl BindingId {
    pub fn new(id: impl Into<String>) -> Self {
        BindingId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BindingId {
    fn from(id: &str) -> Self {
        BindingId::new(id)
    }
}

impl From<String> for BindingId {
    fn from(id: String) -> Self {
        BindingId(id)
    }
}

impl AsRef<str> for BindingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Monotonic id source shared by every binding of one mounted tree.
///
/// Ids are `"{prefix}-{n}"` with `n` counting from 1 across all prefixes, so
/// two generated ids from the same generator never collide.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: Cell<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, prefix: &str) -> BindingId {
        let n = self.next.get().wrapping_add(1);
        self.next.set(n);
        BindingId(format!("{prefix}-{n}"))
    }

    /// Uses `supplied` when present, otherwise generates a fresh id.
    pub fn resolve(&self, supplied: Option<&str>, prefix: &str) -> BindingId {
        match supplied {
            Some(id) => BindingId::new(id),
            None => self.next_id(prefix),
        }
    }
}
