//! Draft persistence: dirty tracking, debounced autosave, manual save and
//! restore-on-load.
//!
//! This is the only component that touches the [`KeyValueStore`] and the
//! [`Clock`].

use std::sync::Arc;
use std::time::Duration;
use carematch_core::{AssessmentConfig, AssessmentDraft, MemberId, Time, TimerId};
use carematch_storage::{KeyValueStore, StorageError};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Scheduler};

/// Storage key for a member's draft: `{namespace}:v{version}:{memberId}`.
pub fn draft_key(config: &AssessmentConfig, member_id: &MemberId) -> String {
    format!(
        "{}:v{}:{}",
        config.storage_namespace, config.schema_version, member_id
    )
}

/// What is written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEnvelope {
    /// Schema version the draft was written with
    pub schema_version: u32,

    /// When it was written
    pub saved_at: Time,

    /// Step the user was on
    #[serde(default)]
    pub current_step: usize,

    /// The draft itself
    pub draft: AssessmentDraft,
}

/// Owns dirty state, the autosave timer and the store.
pub struct DraftPersistence {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    key: String,
    schema_version: u32,
    autosave_interval: Duration,
    dirty: bool,
    last_saved_at: Option<Time>,
    saved_step: Option<usize>,
    autosave_timer: Option<TimerId>,
}

impl DraftPersistence {
    /// Create persistence for one draft key.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        schema_version: u32,
        autosave_interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            scheduler: Scheduler::new(),
            key: key.into(),
            schema_version,
            autosave_interval,
            dirty: false,
            last_saved_at: None,
            saved_step: None,
            autosave_timer: None,
        }
    }

    /// Storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current time from the injected clock.
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Whether there are edits since the last successful write.
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Time of the last successful write in this session.
    pub fn last_saved_at(&self) -> Option<Time> {
        self.last_saved_at
    }

    /// When the pending autosave will fire, if one is armed.
    pub fn next_autosave_at(&self) -> Option<Time> {
        self.autosave_timer.and_then(|id| self.scheduler.due_at(id))
    }

    /// Load the persisted envelope.
    ///
    /// Read failures, undecodable payloads and other schema versions are
    /// logged and treated as "nothing persisted".
    pub async fn load(&mut self) -> Option<DraftEnvelope> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read draft {}: {}", self.key, e);
                return None;
            }
        };

        let envelope: DraftEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Ignoring undecodable draft {}: {}", self.key, e);
                return None;
            }
        };

        if envelope.schema_version != self.schema_version {
            tracing::warn!(
                "Ignoring draft {} written with schema v{} (expected v{})",
                self.key,
                envelope.schema_version,
                self.schema_version
            );
            return None;
        }

        tracing::debug!("Restored draft {} saved at {}", self.key, envelope.saved_at);
        self.saved_step = Some(envelope.current_step);
        Some(envelope)
    }

    /// Record an edit. Arms the autosave timer unless one is already pending.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        if self.autosave_timer.is_none() {
            let id = self.scheduler.schedule(self.clock.now(), self.autosave_interval);
            self.autosave_timer = Some(id);
        }
    }

    /// Write the draft if dirty. Returns whether a write happened.
    ///
    /// A clean draft is never rewritten, so repeated calls without edits
    /// produce a single write.
    pub async fn save(&mut self, draft: &AssessmentDraft, current_step: usize) -> Result<bool, StorageError> {
        if !self.dirty {
            return Ok(false);
        }
        self.write(draft, current_step).await?;
        Ok(true)
    }

    /// Write when dirty, or when the stored copy records another step.
    ///
    /// Lets a host that reopens the session per command keep the
    /// navigation position without treating moves as edits.
    pub async fn save_position(&mut self, draft: &AssessmentDraft, current_step: usize) -> Result<bool, StorageError> {
        let moved = self.saved_step.is_some_and(|step| step != current_step);
        if !self.dirty && !moved {
            return Ok(false);
        }
        self.write(draft, current_step).await?;
        Ok(true)
    }

    async fn write(&mut self, draft: &AssessmentDraft, current_step: usize) -> Result<(), StorageError> {
        let now = self.clock.now();
        let envelope = DraftEnvelope {
            schema_version: self.schema_version,
            saved_at: now,
            current_step,
            draft: draft.clone(),
        };
        let json = serde_json::to_string(&envelope)?;
        self.store.set(&self.key, &json).await?;

        self.dirty = false;
        self.last_saved_at = Some(now);
        self.saved_step = Some(current_step);
        if let Some(id) = self.autosave_timer.take() {
            self.scheduler.cancel(id);
        }
        tracing::info!("Saved draft {}", self.key);
        Ok(())
    }

    /// [`Self::save`], logging and swallowing failures.
    pub async fn save_best_effort(&mut self, draft: &AssessmentDraft, current_step: usize) -> bool {
        match self.save(draft, current_step).await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!("Draft save failed for {}: {}", self.key, e);
                false
            }
        }
    }

    /// Fire the autosave if its deadline has passed. Returns whether a write
    /// happened.
    ///
    /// A failed autosave re-arms the timer for another interval.
    pub async fn run_due(&mut self, draft: &AssessmentDraft, current_step: usize) -> bool {
        let fired = self.scheduler.take_due(self.clock.now());
        let Some(timer) = self.autosave_timer else {
            return false;
        };
        if !fired.contains(&timer) {
            return false;
        }
        self.autosave_timer = None;

        if !self.dirty {
            return false;
        }

        tracing::debug!("Autosave fired for {}", self.key);
        let written = self.save_best_effort(draft, current_step).await;
        if !written && self.dirty {
            self.mark_dirty();
        }
        written
    }

    /// Cancel the pending autosave, if any.
    pub fn cancel_autosave(&mut self) {
        if let Some(id) = self.autosave_timer.take() {
            self.scheduler.cancel(id);
            tracing::debug!("Cancelled autosave {} for {}", id, self.key);
        }
    }

    /// Cancel the autosave, forget dirty state and remove the persisted copy.
    pub async fn clear(&mut self) {
        self.cancel_autosave();
        self.dirty = false;
        self.last_saved_at = None;
        self.saved_step = None;
        if let Err(e) = self.store.remove(&self.key).await {
            tracing::warn!("Failed to remove draft {}: {}", self.key, e);
        }
    }
}
