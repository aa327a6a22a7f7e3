//! Mount reference counts keyed by target path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct RefCounts {
    counts: Mutex<HashMap<PathBuf, usize>>,
}

impl RefCounts {
    /// Record one more holder; returns the new count.
    pub fn increment(&self, target: &Path) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(target.to_path_buf()).or_insert(0);
        *count += 1;
        *count
    }

    /// Release one holder; returns the holders that remain. A target with no
    /// recorded holders stays at zero.
    pub fn decrement(&self, target: &Path) -> usize {
        let mut counts = self.counts.lock();
        match counts.get_mut(target) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                counts.remove(target);
                0
            }
            None => 0,
        }
    }

    pub fn get(&self, target: &Path) -> usize {
        self.counts.lock().get(target).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up_and_down() {
        let refs = RefCounts::default();
        let target = Path::new("/mnt/v1");
        assert_eq!(refs.increment(target), 1);
        assert_eq!(refs.increment(target), 2);
        assert_eq!(refs.decrement(target), 1);
        assert_eq!(refs.decrement(target), 0);
        assert_eq!(refs.decrement(target), 0);
        assert_eq!(refs.get(target), 0);
    }
}
