//! Static NFS volume mappings.
//!
//! NFS volumes are not created through CSI. Each one is a line
//! `name=host:export` in a mapping file (or an inline configuration list),
//! loaded wholesale at startup, appended on Create and rewritten on Remove.
//! Names follow the same rules as every other volume name, so a record can
//! never spill into a second line.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::{Path, PathBuf};

use libcsi::backend::nfs::nfs_volume_id;
use libcsi::proto::{VolumeId, VolumeMetadata};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{EXPORT_OPT, HOST_OPT, check_name};
use crate::error::DriverError;

/// One `name=host:export` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsMapping {
    pub name: String,
    pub host: String,
    pub export: String,
}

impl NfsMapping {
    /// Validate the parts of a record. Every part must survive a write and a
    /// re-parse of the mapping file unchanged.
    pub fn new(name: &str, host: &str, export: &str) -> Result<Self, DriverError> {
        check_name(name)?;
        if host.is_empty() || host.contains([':', '=']) || host.chars().any(char::is_whitespace) {
            return Err(DriverError::invalid_option(
                HOST_OPT,
                format!("{host:?} is not a host name or address"),
            ));
        }
        if export.trim() != export || export.is_empty() || export.chars().any(char::is_control) {
            return Err(DriverError::invalid_option(
                EXPORT_OPT,
                format!("{export:?} is not an export path"),
            ));
        }
        Ok(Self {
            name: name.to_owned(),
            host: host.to_owned(),
            export: export.to_owned(),
        })
    }

    pub fn parse(line: &str) -> Option<Self> {
        let (name, source) = line.trim().split_once('=')?;
        let (host, export) = source.split_once(':')?;
        Self::new(name.trim(), host.trim(), export.trim()).ok()
    }

    pub fn volume_id(&self) -> VolumeId {
        nfs_volume_id(&self.host, &self.export)
    }

    pub fn metadata(&self) -> VolumeMetadata {
        VolumeMetadata::named(self.name.clone())
    }
}

impl fmt::Display for NfsMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.name, self.host, self.export)
    }
}

/// Where the mappings come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfsSource {
    /// A mapping file; Create and Remove rewrite it.
    File(PathBuf),
    /// Inline records; Create and Remove only touch memory.
    Inline(Vec<String>),
}

impl Default for NfsSource {
    fn default() -> Self {
        Self::Inline(Vec::new())
    }
}

/// The mappings, keyed by lowercased name, and the file they persist to.
/// The lock is held across file writes.
#[derive(Debug)]
pub struct NfsStore {
    file: Option<PathBuf>,
    mappings: Mutex<HashMap<String, NfsMapping>>,
}

impl NfsStore {
    /// Open `source` and return the mappings it holds. A missing file holds
    /// none; malformed lines are skipped and the first record of a name wins.
    pub async fn load(source: &NfsSource) -> Result<(Self, Vec<NfsMapping>), DriverError> {
        let (file, lines) = match source {
            NfsSource::File(path) => {
                let contents = match tokio::fs::read_to_string(path).await {
                    Ok(contents) => contents,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(e) => {
                        return Err(DriverError::io(format!("read {}", path.display()), e));
                    }
                };
                let lines = contents.lines().map(str::to_owned).collect();
                (Some(path.clone()), lines)
            }
            NfsSource::Inline(lines) => (None, lines.clone()),
        };

        let mut mappings = HashMap::new();
        let mut loaded = Vec::new();
        for line in lines.iter().filter(|line| !line.trim().is_empty()) {
            let Some(mapping) = NfsMapping::parse(line) else {
                warn!(line = %line, "skipping malformed nfs mapping");
                continue;
            };
            match mappings.entry(mapping.name.to_ascii_lowercase()) {
                Entry::Occupied(_) => warn!(line = %line, "skipping duplicate nfs mapping"),
                Entry::Vacant(slot) => {
                    slot.insert(mapping.clone());
                    loaded.push(mapping);
                }
            }
        }

        Ok((
            Self {
                file,
                mappings: Mutex::new(mappings),
            },
            loaded,
        ))
    }

    pub fn is_file_backed(&self) -> bool {
        self.file.is_some()
    }

    /// Record `mapping`, appending it to the file. Returns `false` when the
    /// identical record already exists; a different record under the same
    /// name (ASCII case insensitive) is a [`DriverError::Conflict`].
    pub async fn add(&self, mapping: &NfsMapping) -> Result<bool, DriverError> {
        let mut mappings = self.mappings.lock().await;
        let key = mapping.name.to_ascii_lowercase();
        if let Some(existing) = mappings.get(&key) {
            if existing == mapping {
                debug!(mapping = %mapping, "nfs mapping already present");
                return Ok(false);
            }
            return Err(DriverError::Conflict {
                name: mapping.name.clone(),
                existing: existing.to_string(),
            });
        }

        if let Some(path) = &self.file {
            append_line(path, mapping).await?;
        }
        mappings.insert(key, mapping.clone());
        debug!(mapping = %mapping, "nfs mapping added");
        Ok(true)
    }

    /// Drop the records named `name` (ASCII case insensitive) and rewrite
    /// the file without them. Other lines are kept verbatim.
    pub async fn remove(&self, name: &str) -> Result<(), DriverError> {
        let mut mappings = self.mappings.lock().await;
        mappings.remove(&name.to_ascii_lowercase());
        let Some(path) = &self.file else {
            return Ok(());
        };
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(DriverError::io(format!("read {}", path.display()), e)),
        };

        let mut kept = String::with_capacity(contents.len());
        for line in contents.lines() {
            let matches = NfsMapping::parse(line).is_some_and(|m| m.name.eq_ignore_ascii_case(name));
            if !matches {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, kept)
            .await
            .map_err(|e| DriverError::io(format!("write {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| DriverError::io(format!("replace {}", path.display()), e))?;
        debug!(volume = name, "nfs mapping removed");
        Ok(())
    }
}

async fn append_line(path: &Path, mapping: &NfsMapping) -> Result<(), DriverError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DriverError::io(format!("create {}", parent.display()), e))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| DriverError::io(format!("open {}", path.display()), e))?;
    file.write_all(format!("{mapping}\n").as_bytes())
        .await
        .map_err(|e| DriverError::io(format!("append to {}", path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| DriverError::io(format!("flush {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use libcsi::backend::nfs::{EXPORT_KEY, HOST_KEY};

    use super::*;

    #[test]
    fn parse_mapping_lines() {
        let m = NfsMapping::parse("media=10.0.0.5:/exports/media").unwrap();
        assert_eq!(m.name, "media");
        assert_eq!(m.host, "10.0.0.5");
        assert_eq!(m.export, "/exports/media");
        assert_eq!(m.to_string(), "media=10.0.0.5:/exports/media");

        assert!(NfsMapping::parse("no-separator").is_none());
        assert!(NfsMapping::parse("name=hostonly").is_none());
        assert!(NfsMapping::parse("=h:/e").is_none());
    }

    #[test]
    fn identity_and_metadata() {
        let m = NfsMapping::parse("media=nas:/m").unwrap();
        assert_eq!(m.volume_id().values[HOST_KEY], "nas");
        assert_eq!(m.volume_id().values[EXPORT_KEY], "/m");
        assert_eq!(m.metadata().name(), Some("media"));
    }

    #[test]
    fn records_that_would_not_reparse_are_rejected() {
        assert!(matches!(
            NfsMapping::new("evil\nroot=attacker:/", "nas", "/m"),
            Err(DriverError::InvalidName { .. })
        ));
        assert!(matches!(
            NfsMapping::new("a=b", "nas", "/m"),
            Err(DriverError::InvalidName { .. })
        ));
        assert!(matches!(
            NfsMapping::new("media", "nas:/x", "/m"),
            Err(DriverError::InvalidOption { .. })
        ));
        assert!(matches!(
            NfsMapping::new("media", "nas\nb=h", "/m"),
            Err(DriverError::InvalidOption { .. })
        ));
        assert!(matches!(
            NfsMapping::new("media", "nas", "/m\nb=h:/x"),
            Err(DriverError::InvalidOption { .. })
        ));
        assert!(NfsMapping::parse("../up=h:/e").is_none());

        let m = NfsMapping::new("media", "10.0.0.5", "/exports/media").unwrap();
        assert_eq!(NfsMapping::parse(&m.to_string()), Some(m));
    }

    #[tokio::test]
    async fn add_then_remove_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nfs").join("volumes");
        let (store, loaded) = NfsStore::load(&NfsSource::File(path.clone())).await.unwrap();
        assert!(loaded.is_empty());

        assert!(store.add(&NfsMapping::parse("a=h:/a").unwrap()).await.unwrap());
        assert!(store.add(&NfsMapping::parse("B=h:/b").unwrap()).await.unwrap());
        store.remove("b").await.unwrap();

        let (_, loaded) = NfsStore::load(&NfsSource::File(path)).await.unwrap();
        assert_eq!(loaded, vec![NfsMapping::parse("a=h:/a").unwrap()]);
    }

    #[tokio::test]
    async fn second_add_of_a_name_never_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes");
        let (store, _) = NfsStore::load(&NfsSource::File(path.clone())).await.unwrap();

        let one = NfsMapping::parse("a=h:/one").unwrap();
        assert!(store.add(&one).await.unwrap());
        assert!(!store.add(&one).await.unwrap());
        match store.add(&NfsMapping::parse("A=h:/two").unwrap()).await {
            Err(DriverError::Conflict { existing, .. }) => assert_eq!(existing, "a=h:/one"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "a=h:/one\n");

        store.remove("a").await.unwrap();
        assert!(store.add(&NfsMapping::parse("a=h:/two").unwrap()).await.unwrap());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "a=h:/two\n");
    }

    #[tokio::test]
    async fn duplicate_lines_keep_the_first_record() {
        let source = NfsSource::Inline(vec!["a=h:/one".into(), "A=h:/two".into()]);
        let (store, loaded) = NfsStore::load(&source).await.unwrap();
        assert_eq!(loaded, vec![NfsMapping::parse("a=h:/one").unwrap()]);
        assert!(store.add(&NfsMapping::parse("a=h:/two").unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn inline_source_skips_bad_lines() {
        let source = NfsSource::Inline(vec!["a=h:/a".into(), "junk".into(), "".into()]);
        let (store, loaded) = NfsStore::load(&source).await.unwrap();
        assert!(!store.is_file_backed());
        assert_eq!(loaded.len(), 1);
        store.remove("a").await.unwrap();
    }
}
