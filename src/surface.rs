//! Shared read surface: the latest ranked snapshot, digest text and run status.
//!
//! Any number of readers take cheap clones via [`ReadSurface::snapshot`]. Writing needs a
//! [`RunPermit`], obtained by an atomic check-and-set of the status flag; at most one
//! permit exists at a time, so the batch coordinator holding it is the only writer.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::NO_DIGEST;
use crate::item::DisplayItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub items: Vec<DisplayItem>,
    pub digest: String,
    pub last_update: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub status: Status,
}

impl Default for SurfaceSnapshot {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            digest: NO_DIGEST.to_string(),
            last_update: None,
            run_count: 0,
            status: Status::Idle,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadSurface {
    inner: Arc<RwLock<SurfaceSnapshot>>,
}

impl ReadSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SurfaceSnapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SurfaceSnapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.read().clone()
    }

    pub fn status(&self) -> Status {
        self.read().status
    }

    pub fn is_processing(&self) -> bool {
        self.status() == Status::Processing
    }

    /// Flips the status to `Processing` unless a run already holds it.
    /// Returns `None` (and changes nothing) when a run is in flight.
    pub fn try_begin(&self) -> Option<RunPermit> {
        let mut g = self.write();
        if g.status == Status::Processing {
            return None;
        }
        g.status = Status::Processing;
        Some(RunPermit {
            surface: self.clone(),
            finished: false,
        })
    }
}

/// Write access for one run. Dropping it unfinished returns the surface to `Idle`.
#[derive(Debug)]
pub struct RunPermit {
    surface: ReadSurface,
    finished: bool,
}

impl RunPermit {
    /// Replaces the item list with a progress snapshot; status stays `Processing`.
    pub fn publish_progress(&self, items: Vec<DisplayItem>) {
        let mut g = self.surface.write();
        g.items = items;
        g.last_update = Some(Utc::now());
    }

    /// Publishes the final snapshot and digest, marks the run completed.
    pub fn finish(mut self, items: Vec<DisplayItem>, digest: String) {
        {
            let mut g = self.surface.write();
            g.items = items;
            g.digest = digest;
            g.last_update = Some(Utc::now());
            g.run_count = g.run_count.saturating_add(1);
            g.status = Status::Completed;
        }
        self.finished = true;
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if !self.finished {
            self.surface.write().status = Status::Idle;
        }
    }
}
