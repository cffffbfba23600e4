//! Scratch space for video export output
//!
//! Exports are written under `<documents>/.temp`. With [`ScratchNaming::Fixed`]
//! every export targets the same `video.mp4`, so at most one finalized video
//! scratch file exists at a time. [`ScratchNaming::PerExport`] hands out
//! `video-<pid>-<stamp>-<seq>.mp4` leases instead so exports can run side by
//! side.
//!
//! Leases and the fixed-name export gate are process-wide and keyed by
//! directory: two `ScratchSpace`s over the same directory share them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const SCRATCH_DIR: &str = ".temp";
const VIDEO_FILE: &str = "video.mp4";
const LEASE_PREFIX: &str = "video-";
const LEASE_SUFFIX: &str = ".mp4";

/// Unique exports left behind for longer than this are purged on the next lease
pub const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);
static LEASES: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
static GATES: OnceLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> = OnceLock::new();

fn leases() -> &'static Mutex<HashSet<PathBuf>> {
    LEASES.get_or_init(|| Mutex::new(HashSet::new()))
}

fn is_leased(path: &Path) -> bool {
    leases().lock().map(|l| l.contains(path)).unwrap_or(false)
}

/// How export destinations are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScratchNaming {
    /// Single well-known file; exports must be serialized
    #[default]
    Fixed,
    /// Unique file per export, tracked until the lease is dropped
    PerExport,
}

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    base: Option<PathBuf>,
}

impl ScratchSpace {
    /// Scratch space rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { base: Some(dir.into()) }
    }

    /// `<documents>/.temp`, falling back to the system temp directory
    pub fn for_user() -> Self {
        let base = dirs::document_dir()
            .or_else(|| Some(std::env::temp_dir()))
            .map(|dir| dir.join(SCRATCH_DIR));

        Self { base }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    /// Gate serializing fixed-name exports into this directory
    ///
    /// Every `ScratchSpace` over the same directory gets the same gate.
    pub fn export_gate(&self) -> Arc<tokio::sync::Mutex<()>> {
        let key = self.base.clone().unwrap_or_default();
        let gates = GATES.get_or_init(|| Mutex::new(HashMap::new()));
        match gates.lock() {
            Ok(mut gates) => Arc::clone(gates.entry(key).or_default()),
            // poisoned map
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Clean, writable path for the fixed-name export destination
    pub fn prepare_destination(&self) -> Option<PathBuf> {
        let dir = self.ensure_dir()?;
        let path = dir.join(VIDEO_FILE);
        clear_if_taken(&path);
        Some(path)
    }

    /// Unique destination registered until the returned lease is dropped
    ///
    /// The file is reserved with an exclusive create, so a name already on
    /// disk (from this or another process) is never reused.
    pub fn prepare_unique(&self) -> Option<ScratchLease> {
        let dir = self.ensure_dir()?;
        self.purge_stale(STALE_AFTER);

        let pid = std::process::id();
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        for _ in 0..16 {
            let id = NEXT_LEASE.fetch_add(1, Ordering::Relaxed);
            let path = dir.join(format!("{}{}-{}-{}{}", LEASE_PREFIX, pid, stamp, id, LEASE_SUFFIX));

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    warn!("Cannot reserve scratch destination {}: {}", path.display(), e);
                    return None;
                }
            }

            if let Ok(mut active) = leases().lock() {
                active.insert(path.clone());
            }
            debug!("Leased scratch destination #{}: {}", id, path.display());
            return Some(ScratchLease { id, path });
        }

        warn!("No free scratch name in {}", dir.display());
        None
    }

    /// Number of unique destinations currently leased in this directory
    pub fn active_leases(&self) -> usize {
        let Some(dir) = self.base.as_deref() else {
            return 0;
        };
        leases()
            .lock()
            .map(|active| active.iter().filter(|p| p.parent() == Some(dir)).count())
            .unwrap_or(0)
    }

    /// Remove unleased unique exports older than `max_age`; returns how many went
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let Some(dir) = self.base.as_deref() else {
            return 0;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };

        let now = SystemTime::now();
        let mut purged = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_lease_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LEASE_PREFIX) && n.ends_with(LEASE_SUFFIX));
            if !is_lease_file || is_leased(&path) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_some_and(|age| age > max_age) && std::fs::remove_file(&path).is_ok() {
                debug!("Purged stale export {}", path.display());
                purged += 1;
            }
        }
        purged
    }

    fn ensure_dir(&self) -> Option<&Path> {
        let dir = self.base.as_deref()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Cannot create scratch directory {}: {}", dir.display(), e);
            return None;
        }
        Some(dir)
    }
}

impl Default for ScratchSpace {
    fn default() -> Self {
        Self::for_user()
    }
}

/// Registered unique export destination
///
/// Dropping the lease deregisters the path; the file itself stays, since it
/// is the finalized artifact.
#[derive(Debug)]
pub struct ScratchLease {
    id: u64,
    path: PathBuf,
}

impl ScratchLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchLease {
    fn drop(&mut self) {
        if let Ok(mut active) = leases().lock() {
            active.remove(&self.path);
        }
    }
}

fn clear_if_taken(path: &Path) {
    // best-effort: a leftover file would make the export fail
    let _ = std::fs::remove_file(path);
}
