//! Volume name → CSI identity cache.

use std::collections::HashMap;

use libcsi::proto::{VolumeId, VolumeMetadata};
use parking_lot::RwLock;

/// What the bridge remembers about one volume.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVolume {
    pub id: VolumeId,
    pub metadata: VolumeMetadata,
    /// Statically mapped NFS entry; survives list refreshes.
    pub static_nfs: bool,
}

#[derive(Debug, Default)]
pub struct VolumeCache {
    entries: RwLock<HashMap<String, CachedVolume>>,
}

impl VolumeCache {
    pub fn get(&self, name: &str) -> Option<CachedVolume> {
        self.entries.read().get(name).cloned()
    }

    pub fn insert(&self, name: impl Into<String>, volume: CachedVolume) {
        self.entries.write().insert(name.into(), volume);
    }

    pub fn remove(&self, name: &str) -> Option<CachedVolume> {
        self.entries.write().remove(name)
    }

    /// Remove every entry whose name matches `name` ignoring ASCII case.
    pub fn remove_ignore_case(&self, name: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.eq_ignore_ascii_case(name));
        before - entries.len()
    }

    /// Replace the cache with `fresh`, keeping static NFS entries.
    pub fn replace(&self, fresh: HashMap<String, CachedVolume>) {
        let mut entries = self.entries.write();
        let mut next = fresh;
        for (name, volume) in entries.drain() {
            if volume.static_nfs {
                next.insert(name, volume);
            }
        }
        *entries = next;
    }

    /// All entries, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, CachedVolume)> {
        let mut all: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(name, volume)| (name.clone(), volume.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(id: &str, static_nfs: bool) -> CachedVolume {
        CachedVolume {
            id: VolumeId::from_pairs([("id", id)]),
            metadata: VolumeMetadata::named(id),
            static_nfs,
        }
    }

    #[test]
    fn replace_is_wholesale_but_keeps_static_nfs() {
        let cache = VolumeCache::default();
        cache.insert("old", volume("old", false));
        cache.insert("share", volume("share", true));

        cache.replace(HashMap::from([("new".to_owned(), volume("new", false))]));

        let names: Vec<_> = cache.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["new", "share"]);
    }

    #[test]
    fn remove_ignores_case() {
        let cache = VolumeCache::default();
        cache.insert("Data", volume("a", true));
        assert_eq!(cache.remove_ignore_case("data"), 1);
        assert!(cache.is_empty());
    }
}
