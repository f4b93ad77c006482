//! String-reference resolution.

use std::sync::Arc;

use dashmap::DashMap;

/// Largest valid string reference.
pub const MAX_STRING_REF: u32 = 0x01FF_FFFF;

/// Looks up localized text by reference id.
pub trait StringResolver: Send + Sync {
    fn get_string(&self, ref_id: u32) -> Option<String>;
}

impl<F> StringResolver for F
where
    F: Fn(u32) -> Option<String> + Send + Sync,
{
    fn get_string(&self, ref_id: u32) -> Option<String> {
        self(ref_id)
    }
}

/// Cache of resolved string references in front of an optional resolver.
///
/// Lookups that the resolver cannot answer are remembered too, so each
/// reference reaches the resolver at most once.
#[derive(Default)]
pub struct StringTable {
    entries: DashMap<u32, Option<Arc<str>>>,
    fallback: Option<Arc<dyn StringResolver>>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: Arc<dyn StringResolver>) -> Self {
        Self {
            entries: DashMap::new(),
            fallback: Some(resolver),
        }
    }

    /// True if `value` lies in the string-reference range. Zero never does.
    pub fn is_reference(value: i64) -> bool {
        (1..=MAX_STRING_REF as i64).contains(&value)
    }

    /// Seed the cache with known text.
    pub fn insert(&self, ref_id: u32, text: impl Into<Arc<str>>) {
        self.entries.insert(ref_id, Some(text.into()));
    }

    pub fn resolve(&self, ref_id: u32) -> Option<Arc<str>> {
        if let Some(cached) = self.entries.get(&ref_id) {
            return cached.clone();
        }
        let resolved: Option<Arc<str>> = self
            .fallback
            .as_ref()
            .and_then(|r| r.get_string(ref_id))
            .map(Arc::from);
        self.entries.insert(ref_id, resolved.clone());
        resolved
    }

    /// Number of cached references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop cached lookups, keeping the resolver.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for StringTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringTable")
            .field("entries", &self.entries.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
