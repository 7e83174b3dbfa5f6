//! Bounded ban-event history.
//!
//! Keeps the rolling window of classified failures that feeds adaptive
//! training and statistics. Optionally persisted as a flat JSON file; a
//! corrupted file is reset rather than treated as fatal.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::classify::{BanEvent, BanKind};

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct BanHistoryFile {
    #[serde(default)]
    entries: Vec<BanEvent>,
}

#[derive(Debug)]
pub struct BanEventStore {
    path: Option<PathBuf>,
    inner: Mutex<VecDeque<BanEvent>>,
    capacity: usize,
    window_ms: i64,
}

impl BanEventStore {
    pub fn in_memory(capacity: usize, window_ms: i64) -> Self {
        Self {
            path: None,
            inner: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            window_ms,
        }
    }

    pub fn load_or_init_from_file(path: &Path, capacity: usize, window_ms: i64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let file = if path.exists() {
            let data = fs::read(path)
                .with_context(|| format!("read ban history: {}", path.display()))?;
            match serde_json::from_slice::<BanHistoryFile>(&data) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(
                        target = "reputation",
                        path = %path.display(),
                        error = %err,
                        "ban history corrupted, resetting"
                    );
                    BanHistoryFile::default()
                }
            }
        } else {
            let default = BanHistoryFile::default();
            Self::persist(Some(path), &default.entries)?;
            default
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: Mutex::new(file.entries.into()),
            capacity: capacity.max(1),
            window_ms,
        })
    }

    /// Append one event, pruning entries that fall outside the capacity or
    /// age window.
    pub fn push(&self, event: BanEvent) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("ban history poisoned"))?;
        let horizon = event.at_ms.saturating_sub(self.window_ms);
        while guard.front().is_some_and(|e| e.at_ms < horizon) {
            guard.pop_front();
        }
        guard.push_back(event);
        while guard.len() > self.capacity {
            guard.pop_front();
        }
        let entries: Vec<BanEvent> = guard.iter().cloned().collect();
        drop(guard);
        Self::persist(self.path.as_deref(), &entries)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<BanEvent> {
        self.inner
            .lock()
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events for one (endpoint, domain) pair, oldest first.
    pub fn for_pair(&self, endpoint: &crate::core::pool::EndpointId, domain: &str) -> Vec<BanEvent> {
        self.inner
            .lock()
            .map(|g| {
                g.iter()
                    .filter(|e| &e.endpoint == endpoint && e.domain == domain)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Occurrence count per category, for statistics and trend inspection.
    pub fn counts_by_kind(&self) -> Vec<(BanKind, usize)> {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return Vec::new(),
        };
        let mut counts: Vec<(BanKind, usize)> = Vec::new();
        for event in guard.iter() {
            match counts.iter_mut().find(|(kind, _)| *kind == event.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((event.kind, 1)),
            }
        }
        counts
    }

    pub fn clear(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("ban history poisoned"))?;
        guard.clear();
        drop(guard);
        Self::persist(self.path.as_deref(), &[])
    }

    fn persist(path: Option<&Path>, entries: &[BanEvent]) -> Result<()> {
        if let Some(path) = path {
            let file = BanHistoryFile {
                entries: entries.to_vec(),
            };
            let json = serde_json::to_string_pretty(&file).context("serialize ban history")?;
            fs::write(path, json)
                .with_context(|| format!("write ban history: {}", path.display()))
        } else {
            Ok(())
        }
    }
}
