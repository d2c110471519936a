use crate::{Entity, Id, Result};
use anyhow::Context as _;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

const NEXT_ID: &str = "next_id";

// Problems found while loading. None of these stop the load:
// the affected data is skipped and the rest is kept.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorruptError {
    #[error("Could not read {path:?}, starting empty: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Invalid identifier counter: {0}")]
    Counter(String),

    #[error("Could not load record #{index}: {reason}")]
    Record { index: usize, reason: String },
}

// The result of loading a collection.
#[derive(Debug)]
pub struct Loaded<E> {
    pub items: Vec<E>,
    pub next_id: Id,
    pub warnings: Vec<CorruptError>,
}

impl<E: Entity> Loaded<E> {
    fn empty() -> Self {
        Self {
            items: vec![],
            next_id: 1,
            warnings: vec![],
        }
    }

    fn warn(&mut self, err: CorruptError) {
        log::warn!("{err}");
        self.warnings.push(err);
    }

    // Rebuild entities from snapshots, skipping any that fail validation
    // or reuse an identifier. The counter is raised past every loaded id.
    fn restore(&mut self, snapshots: impl IntoIterator<Item = anyhow::Result<E::Snapshot>>) {
        let mut seen = BTreeSet::new();
        for (index, snapshot) in snapshots.into_iter().enumerate() {
            let entity = snapshot.and_then(|s| {
                log::trace!("Restoring {s:?}");
                Ok(E::from_snapshot(s)?)
            });
            let entity = match entity {
                Ok(e) => e,
                Err(e) => {
                    self.warn(CorruptError::Record {
                        index,
                        reason: format!("{e:#}"),
                    });
                    continue;
                }
            };
            let Some(next_id) = entity.id().checked_add(1) else {
                self.warn(CorruptError::Record {
                    index,
                    reason: format!("id {} is out of range", entity.id()),
                });
                continue;
            };
            if !seen.insert(entity.id()) {
                self.warn(CorruptError::Record {
                    index,
                    reason: format!("duplicate id {}", entity.id()),
                });
                continue;
            }
            self.next_id = self.next_id.max(next_id);
            self.items.push(entity);
        }
        self.items.sort_by_key(|e| e.id());
    }
}

// Persists a collection of entities and the identifier counter.
pub trait Storage<E: Entity> {
    // Load everything that can be loaded. Never fails: an absent medium is
    // an empty collection, and corruption is reported through `warnings`.
    fn load(&self) -> Loaded<E>;

    // Replace the stored collection.
    fn save(&mut self, next_id: Id, snapshots: Vec<E::Snapshot>) -> Result<()>;
}

// JsonStorage keeps a collection in a single JSON file:
// ```
// {
//   "contacts": [ { "id": 1, "name": "Alice Johnson", ... } ],
//   "next_id": 2
// }
// ```
#[derive(Debug, Clone)]
pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unreadable<E: Entity>(&self, loaded: &mut Loaded<E>, reason: impl ToString) {
        loaded.warn(CorruptError::Unreadable {
            path: self.path.clone(),
            reason: reason.to_string(),
        });
    }
}

impl<E: Entity> Storage<E> for JsonStorage {
    fn load(&self) -> Loaded<E> {
        let mut loaded = Loaded::empty();
        log::debug!("Loading {:?}", self.path);
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{:?} does not exist, starting empty", self.path);
                return loaded;
            }
            Err(e) => {
                self.unreadable(&mut loaded, e);
                return loaded;
            }
        };
        let mut record = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(record)) => record,
            Ok(_) => {
                self.unreadable(&mut loaded, "expected a JSON object");
                return loaded;
            }
            Err(e) => {
                self.unreadable(&mut loaded, e);
                return loaded;
            }
        };

        match record.get(NEXT_ID) {
            None => {}
            Some(v) => match v.as_u64() {
                Some(n) => loaded.next_id = n.max(1),
                None => loaded.warn(CorruptError::Counter(v.to_string())),
            },
        }

        let items = match record.remove(E::COLLECTION) {
            None => vec![],
            Some(serde_json::Value::Array(items)) => items,
            Some(other) => {
                let reason = format!("expected {:?} to be a list, got {other}", E::COLLECTION);
                self.unreadable(&mut loaded, reason);
                return loaded;
            }
        };
        loaded.restore(
            items
                .into_iter()
                .map(|v| serde_json::from_value(v).context("malformed record")),
        );
        log::debug!(
            "Loaded {} {} from {:?}",
            loaded.items.len(),
            E::COLLECTION,
            self.path
        );
        loaded
    }

    // Written to a temporary file in the same directory, then renamed into
    // place, so a crash mid-write leaves the previous file intact.
    fn save(&mut self, next_id: Id, snapshots: Vec<E::Snapshot>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut record = serde_json::Map::new();
        record.insert(NEXT_ID.into(), next_id.into());
        record.insert(E::COLLECTION.into(), serde_json::to_value(&snapshots)?);

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &record)?;
            writeln!(writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        log::debug!("Saved {} {} to {:?}", snapshots.len(), E::COLLECTION, self.path);
        Ok(())
    }
}

// MemoryStorage holds the last saved collection in memory.
// It goes through the same snapshot round-trip as JsonStorage.
#[derive(Debug, Clone)]
pub struct MemoryStorage<E: Entity> {
    next_id: Id,
    snapshots: Vec<E::Snapshot>,
    saves: usize,
}

impl<E: Entity> Default for MemoryStorage<E> {
    fn default() -> Self {
        Self {
            next_id: 1,
            snapshots: vec![],
            saves: 0,
        }
    }
}

impl<E: Entity> MemoryStorage<E> {
    pub fn new() -> Self {
        Self::default()
    }

    // Start from an existing set of snapshots, as if loaded from disk.
    pub fn with_snapshots(next_id: Id, snapshots: Vec<E::Snapshot>) -> Self {
        Self {
            next_id,
            snapshots,
            saves: 0,
        }
    }

    pub fn snapshots(&self) -> &[E::Snapshot] {
        &self.snapshots
    }

    pub fn next_id(&self) -> Id {
        self.next_id
    }

    // Number of times `save` has been called.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl<E: Entity> Storage<E> for MemoryStorage<E> {
    fn load(&self) -> Loaded<E> {
        let mut loaded = Loaded::empty();
        loaded.next_id = self.next_id.max(1);
        loaded.restore(self.snapshots.iter().cloned().map(Ok));
        loaded
    }

    fn save(&mut self, next_id: Id, snapshots: Vec<E::Snapshot>) -> Result<()> {
        self.next_id = next_id;
        self.snapshots = snapshots;
        self.saves += 1;
        Ok(())
    }
}
