//! Last-known job states, owned by the watcher and threaded through cycles.
//!
//! The store lives for the whole process. Each cycle reads it to detect
//! changes and writes back only the changes it managed to deliver, then
//! [`StateStore::save`] persists it as JSON if a state file is configured.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::posting::{JobKey, JobPosting, JobState, StateChange};
use crate::error::StoreError;

const STORE_VERSION: u32 = 1;

/// What the watcher remembers about one posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub state: JobState,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub url: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl JobRecord {
    /// Rebuild a posting from what was stored, for changes whose posting is
    /// no longer listed.
    pub fn to_posting(&self, key: &JobKey) -> JobPosting {
        JobPosting {
            source: key.source().to_string(),
            id: key.id().to_string(),
            title: self.title.clone(),
            company: self.company.clone(),
            location: self.location.clone(),
            description: String::new(),
            url: self.url.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    jobs: BTreeMap<JobKey, JobRecord>,
}

// Older watchers kept a flat list of seen keys, either as a JSON array or
// as plain text with one key per line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Current(StoreFile),
    Legacy(Vec<JobKey>),
}

#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    jobs: BTreeMap<JobKey, JobRecord>,
    dirty: bool,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path: Some(path),
                ..Self::default()
            });
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let jobs = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            match serde_json::from_str::<OnDisk>(&contents) {
                Ok(OnDisk::Current(file)) => file.jobs,
                Ok(OnDisk::Legacy(keys)) => legacy_records(keys),
                Err(source) => match key_lines(&contents) {
                    Some(keys) => legacy_records(keys),
                    None => return Err(StoreError::Corrupt { path, source }),
                },
            }
        };

        tracing::info!(path = %path.display(), jobs = jobs.len(), "Loaded state store");
        Ok(Self {
            path: Some(path),
            jobs,
            dirty: false,
        })
    }

    /// Like [`StateStore::open`], but a fault never stops the watcher.
    ///
    /// A corrupt file is moved aside to `<path>.corrupt` and the store starts
    /// empty at the same path. Any other failure falls back to memory only.
    pub fn open_or_recover(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(e @ StoreError::Corrupt { .. }) => {
                let mut backup = path.clone().into_os_string();
                backup.push(".corrupt");
                let backup = PathBuf::from(backup);
                match std::fs::rename(&path, &backup) {
                    Ok(()) => {
                        tracing::error!(
                            error = %e,
                            backup = %backup.display(),
                            "State file unreadable, moved aside; starting empty",
                        );
                        Self {
                            path: Some(path),
                            ..Self::default()
                        }
                    }
                    Err(rename_err) => {
                        tracing::error!(
                            error = %e,
                            rename_error = %rename_err,
                            "State file unreadable, keeping state in memory only",
                        );
                        Self::in_memory()
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot open state file, keeping state in memory only");
                Self::in_memory()
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &JobKey) -> Option<&JobRecord> {
        self.jobs.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&JobKey, &JobRecord)> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record a delivered change.
    pub fn apply(&mut self, change: &StateChange, at: DateTime<Utc>) {
        let p = &change.posting;
        let record = self.jobs.entry(change.key.clone()).or_insert_with(|| JobRecord {
            state: change.new,
            title: String::new(),
            company: String::new(),
            location: String::new(),
            url: String::new(),
            first_seen: at,
            last_seen: at,
        });
        record.state = change.new;
        if change.new == JobState::Open {
            record.title = p.title.clone();
            record.company = p.company.clone();
            record.location = p.location.clone();
            record.url = p.url.clone();
            record.last_seen = at;
        }
        self.dirty = true;
    }

    /// Refresh `last_seen` for a posting that is still listed and unchanged.
    pub fn touch(&mut self, key: &JobKey, at: DateTime<Utc>) {
        if let Some(record) = self.jobs.get_mut(key) {
            record.last_seen = at;
            self.dirty = true;
        }
    }

    /// Forget closed postings not listed since `cutoff`. Returns how many.
    pub fn prune_closed(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, record| record.state == JobState::Open || record.last_seen >= cutoff);
        let pruned = before - self.jobs.len();
        if pruned > 0 {
            self.dirty = true;
        }
        pruned
    }

    /// Persist to the state file, if any. Writes a temp file then renames it
    /// so a crash mid-write never leaves a truncated store.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };

        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = StoreFile {
            version: STORE_VERSION,
            jobs: self.jobs.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;

        self.dirty = false;
        tracing::debug!(path = %path.display(), jobs = self.jobs.len(), "Saved state store");
        Ok(())
    }
}

// Plain-text key list; `None` unless every non-blank line is a key.
fn key_lines(contents: &str) -> Option<Vec<JobKey>> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(JobKey::parse)
        .collect()
}

// Legacy lists only say "seen", so every key comes back as open.
fn legacy_records(keys: Vec<JobKey>) -> BTreeMap<JobKey, JobRecord> {
    let now = Utc::now();
    keys.into_iter()
        .map(|key| {
            let record = JobRecord {
                state: JobState::Open,
                title: String::new(),
                company: String::new(),
                location: String::new(),
                url: String::new(),
                first_seen: now,
                last_seen: now,
            };
            (key, record)
        })
        .collect()
}
