// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Session store: a generational arena of processing sessions.
//!
//! Each slot carries a generation counter that is bumped whenever the slot
//! is freed, so a stale [`SessionId`] can never observe a newer session
//! that reused its slot. Only the orchestrator mutates records; everyone
//! else reads cloned [`SessionInfo`] snapshots.

use crate::UpscaleError;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Handle to one session in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl SessionId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}g{}", self.index, self.generation)
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Planning,
    Executing,
    /// A stage failed recoverably and the remaining stages are being replanned.
    Stalled,
    Complete,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed)
    }
}

/// Snapshot of one session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub label: String,
    pub state: SessionState,
    /// Index of the stage currently running or next to run.
    pub current_stage_index: usize,
    pub total_stages: usize,
    pub progress_percent: f64,
    pub last_error: Option<String>,
    /// GPU disabled for the rest of this session.
    pub gpu_disabled: bool,
    /// Number of GPU-to-CPU fallbacks so far.
    pub fallbacks: usize,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

impl SessionInfo {
    fn new(id: SessionId, label: String) -> Self {
        Self {
            id,
            label,
            state: SessionState::Planning,
            current_stage_index: 0,
            total_stages: 0,
            progress_percent: 0.0,
            last_error: None,
            gpu_disabled: false,
            fallbacks: 0,
            finished_at: None,
        }
    }

    /// Moves to a terminal state.
    pub(crate) fn finish(&mut self, result: Result<(), &UpscaleError>) {
        match result {
            Ok(()) => {
                self.state = SessionState::Complete;
                self.progress_percent = 100.0;
            }
            Err(e) => {
                self.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
            }
        }
        self.finished_at = Some(Instant::now());
    }
}

struct Slot {
    generation: u32,
    session: Option<SessionInfo>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// Owner of all session records.
#[derive(Default)]
pub struct SessionStore {
    arena: Mutex<Arena>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a session in the `Planning` state.
    pub fn insert(&self, label: &str) -> SessionId {
        let mut arena = self.lock();
        let index = match arena.free.pop() {
            Some(i) => i,
            None => {
                arena.slots.push(Slot { generation: 0, session: None });
                (arena.slots.len() - 1) as u32
            }
        };
        let slot = &mut arena.slots[index as usize];
        let id = SessionId { index, generation: slot.generation };
        slot.session = Some(SessionInfo::new(id, label.to_string()));
        id
    }

    /// Returns a snapshot of `id`, or `None` if it was removed.
    pub fn get(&self, id: SessionId) -> Option<SessionInfo> {
        let arena = self.lock();
        let slot = arena.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.session.clone()
    }

    /// Applies `f` to the record of `id`. Returns `false` for stale ids.
    pub(crate) fn update(&self, id: SessionId, f: impl FnOnce(&mut SessionInfo)) -> bool {
        let mut arena = self.lock();
        match arena.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => match slot.session.as_mut() {
                Some(session) => {
                    f(session);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Removes `id` and frees its slot.
    pub fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        let mut arena = self.lock();
        let slot = arena.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let session = slot.session.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        arena.free.push(id.index);
        Some(session)
    }

    /// Removes terminal sessions finished more than `ttl` ago.
    pub fn gc_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<SessionId> = {
            let arena = self.lock();
            arena
                .slots
                .iter()
                .filter_map(|slot| slot.session.as_ref())
                .filter(|s| s.finished_at.is_some_and(|t| now.duration_since(t) >= ttl))
                .map(|s| s.id)
                .collect()
        };
        let removed = expired.iter().filter(|&&id| self.remove(id).is_some()).count();
        if removed > 0 {
            tracing::debug!(removed, "Expired finished sessions");
        }
        removed
    }

    /// Snapshots of every live session.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.lock()
            .slots
            .iter()
            .filter_map(|slot| slot.session.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.iter().filter(|s| s.session.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").field("live", &self.len()).finish()
    }
}
