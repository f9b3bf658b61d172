use super::AudioTag;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name-ordered store of registered tags.
///
/// Ordering by name gives `name_at` a stable meaning across registrations.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: BTreeMap<String, Arc<AudioTag>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, replacing any tag already registered under the same name.
    pub fn register(&mut self, tag: AudioTag) -> Arc<AudioTag> {
        let tag = Arc::new(tag);
        if self
            .tags
            .insert(tag.name().to_string(), Arc::clone(&tag))
            .is_some()
        {
            log::debug!("Replaced audio tag '{}'", tag.name());
        }
        tag
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<AudioTag>> {
        self.tags.get(name).cloned()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.tags.keys().nth(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_replace() {
        let mut registry = TagRegistry::new();
        registry.register(AudioTag::silent("door").with_priority(1));
        registry.register(AudioTag::silent("door").with_priority(5));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("door").unwrap().priority(), 5);
        assert!(registry.lookup("window").is_none());
    }

    #[test]
    fn test_name_at_is_sorted() {
        let mut registry = TagRegistry::new();
        for name in ["zap", "alarm", "music"] {
            registry.register(AudioTag::silent(name));
        }

        assert_eq!(registry.name_at(0), Some("alarm"));
        assert_eq!(registry.name_at(2), Some("zap"));
        assert_eq!(registry.name_at(3), None);
        assert_eq!(registry.names().collect::<Vec<_>>(), ["alarm", "music", "zap"]);
    }

    #[test]
    fn test_clear() {
        let mut registry = TagRegistry::new();
        registry.register(AudioTag::silent("a"));
        registry.clear();
        assert!(registry.is_empty());
    }
}
