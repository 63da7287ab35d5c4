//! The assessment session: one handle composing validation, progress,
//! persistence and sequencing.

use std::sync::Arc;
use chrono::Datelike;
use carematch_core::{
    AssessmentConfig, AssessmentDraft, ConfigError, Field, FieldErrors, FieldKind, FieldValue,
    MemberId, StepDefinition, StepPlan, SubscriptionId, Time, ValidationResult,
};
use carematch_progress::{
    CareTier, CareTierClassifier, ProgressSnapshot, ScoreAggregator, ThresholdClassifier, TierError,
};
use carematch_quality::{ValidationCache, ValidationEngine};
use carematch_storage::{KeyValueStore, StorageError};

use crate::clock::{Clock, SystemClock};
use crate::persistence::{draft_key, DraftPersistence};
use crate::sequencer::{InvalidStep, StepMove, StepSequencer};
use crate::submit::{SubmissionReceipt, SubmitError, Submitter};

/// Errors returned by session commands.
///
/// User input problems are never errors: they land in the snapshot's
/// `errors` map.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Jump target out of range
    #[error(transparent)]
    InvalidStep(#[from] InvalidStep),

    /// Value of the wrong kind for the field
    #[error("{field} expects a {expected} value")]
    TypeMismatch {
        /// Field written
        field: Field,
        /// Kind it accepts
        expected: FieldKind,
    },

    /// Edits are refused while a submission is in flight
    #[error("a submission is in flight")]
    SubmissionInFlight,

    /// Bad configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bad care-tier thresholds
    #[error("care tier configuration error: {0}")]
    Tier(#[from] TierError),

    /// Explicit save failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Immutable view of the session, handed to the UI and to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Bumped on every state change
    pub revision: u64,
    /// Draft under edit
    pub draft: AssessmentDraft,
    /// Current step
    pub current_step_index: usize,
    /// Number of steps
    pub total_steps: usize,
    /// Field errors to display
    pub errors: FieldErrors,
    /// Unsaved edits exist
    pub dirty: bool,
    /// Last successful write
    pub last_saved_at: Option<Time>,
    /// A submission is in flight
    pub submitting: bool,
    /// Failure of the last submission attempt
    pub submit_error: Option<SubmitError>,
    /// Derived progress values
    pub progress: ProgressSnapshot,
}

/// Why a submission did not start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitBlocked {
    /// Another submission is in flight
    InFlight,
    /// The draft does not validate; errors are in the snapshot
    Invalid(FieldErrors),
}

/// Outcome of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted; draft and persisted copy cleared
    Submitted(SubmissionReceipt),
    /// Collaborator failed; draft kept
    Failed(SubmitError),
    /// Never sent
    Blocked(SubmitBlocked),
}

impl SubmitOutcome {
    /// Whether the submission was rejected because one was in flight.
    pub fn is_in_flight_rejection(&self) -> bool {
        matches!(self, SubmitOutcome::Blocked(SubmitBlocked::InFlight))
    }
}

/// A started submission, to be completed with [`AssessmentSession::finish_submit`].
#[derive(Debug)]
#[must_use = "a ticket must be finished or the session stays in the submitting state"]
pub struct SubmitTicket {
    draft: AssessmentDraft,
}

impl SubmitTicket {
    /// Draft to send.
    pub fn draft(&self) -> &AssessmentDraft {
        &self.draft
    }
}

type Listener = Box<dyn Fn(&SessionSnapshot) + Send + Sync>;

/// Builder for [`AssessmentSession`].
pub struct SessionBuilder {
    member_id: MemberId,
    store: Arc<dyn KeyValueStore>,
    submitter: Arc<dyn Submitter>,
    config: AssessmentConfig,
    clock: Option<Arc<dyn Clock>>,
    plan: Option<StepPlan>,
    classifier: Option<Arc<dyn CareTierClassifier>>,
    overrides: Vec<(Field, FieldValue)>,
}

impl SessionBuilder {
    /// Use a configuration.
    pub fn with_config(mut self, config: AssessmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a clock (defaults to the wall clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a custom step plan instead of the standard one.
    pub fn with_plan(mut self, plan: StepPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Use a care-tier classifier (overrides configured thresholds).
    pub fn with_classifier(mut self, classifier: Arc<dyn CareTierClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Pre-fill a field supplied by the host. Only seeds a fresh draft:
    /// ignored when a stored draft is restored, and not reapplied by
    /// `reset`.
    pub fn with_override(mut self, field: Field, value: FieldValue) -> Self {
        self.overrides.push((field, value));
        self
    }

    /// Build the session, restoring any persisted draft for the member.
    pub async fn open(self) -> Result<AssessmentSession, SessionError> {
        self.config.validate()?;

        let plan = match self.plan {
            Some(plan) => plan,
            None => StepPlan::standard(self.config.demographics),
        };

        let classifier = match (self.classifier, self.config.care_tier_thresholds) {
            (Some(c), _) => Some(c),
            (None, Some(t)) => Some(Arc::new(ThresholdClassifier::new(t)?) as Arc<dyn CareTierClassifier>),
            (None, None) => None,
        };

        let mut defaults = AssessmentDraft::new(self.member_id.clone());
        for (field, value) in self.overrides {
            defaults
                .set(field, value)
                .map_err(|expected| SessionError::TypeMismatch { field, expected })?;
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let mut persistence = DraftPersistence::new(
            self.store,
            clock,
            draft_key(&self.config, &self.member_id),
            self.config.schema_version,
            self.config.autosave_interval(),
        );

        let (draft, resume_step) = match persistence.load().await {
            Some(envelope) if envelope.draft.member_id == self.member_id => {
                let resume = envelope.current_step.min(plan.last_index());
                // The stored draft is taken as-is; host defaults only seed
                // a fresh draft.
                (envelope.draft, Some(resume))
            }
            Some(envelope) => {
                tracing::warn!(
                    "Persisted draft under {} belongs to {}, ignoring",
                    persistence.key(),
                    envelope.draft.member_id
                );
                (defaults, None)
            }
            None => (defaults, None),
        };

        let current_year = i64::from(persistence.now().year());
        let engine = ValidationEngine::new(current_year, self.config.min_birth_year);

        tracing::info!(
            "Opened assessment for {} ({} steps, restored: {})",
            self.member_id,
            plan.len(),
            resume_step.is_some()
        );

        Ok(AssessmentSession {
            sequencer: StepSequencer::new(plan.len()),
            plan,
            engine,
            cache: ValidationCache::new(),
            persistence,
            submitter: self.submitter,
            classifier,
            draft,
            resume_step,
            errors: FieldErrors::new(),
            submitting: false,
            submit_error: None,
            revision: 0,
            listeners: Vec::new(),
            next_subscription: 0,
        })
    }
}

/// The multi-step assessment engine.
///
/// Every command runs to completion against in-memory state. The two
/// deferred operations are the autosave, fired from [`Self::run_due_tasks`],
/// and submission, which can be split into [`Self::begin_submit`] and
/// [`Self::finish_submit`] around the collaborator call.
pub struct AssessmentSession {
    plan: StepPlan,
    engine: ValidationEngine,
    cache: ValidationCache,
    sequencer: StepSequencer,
    persistence: DraftPersistence,
    submitter: Arc<dyn Submitter>,
    classifier: Option<Arc<dyn CareTierClassifier>>,
    draft: AssessmentDraft,
    resume_step: Option<usize>,
    errors: FieldErrors,
    submitting: bool,
    submit_error: Option<SubmitError>,
    revision: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl AssessmentSession {
    /// Start building a session for `member_id`.
    pub fn builder(
        member_id: impl Into<MemberId>,
        store: Arc<dyn KeyValueStore>,
        submitter: Arc<dyn Submitter>,
    ) -> SessionBuilder {
        SessionBuilder {
            member_id: member_id.into(),
            store,
            submitter,
            config: AssessmentConfig::default(),
            clock: None,
            plan: None,
            classifier: None,
            overrides: Vec::new(),
        }
    }

    // === Commands ===

    /// Write a field.
    ///
    /// Marks the session dirty, invalidates cached validation of every step
    /// requiring the field, and replaces the field's displayed error with
    /// the result of its format check.
    pub fn update_field(&mut self, field: Field, value: FieldValue) -> Result<(), SessionError> {
        if self.submitting {
            return Err(SessionError::SubmissionInFlight);
        }
        self.draft
            .set(field, value)
            .map_err(|expected| SessionError::TypeMismatch { field, expected })?;

        self.cache.invalidate_field(&self.plan, field);
        match self.engine.check_field(field, &self.draft) {
            Some(message) => {
                self.errors.insert(field, message);
            }
            None => {
                self.errors.remove(&field);
            }
        }
        self.persistence.mark_dirty();
        self.changed();
        Ok(())
    }

    /// Validate the current step and move forward if it passes.
    ///
    /// On success errors are cleared and a best-effort save is attempted;
    /// a failed save never blocks the move.
    pub async fn next_step(&mut self) -> StepMove {
        let current = self.sequencer.current();
        let result = self.validate_step(current);
        let step_move = self.sequencer.advance(&result);

        match step_move {
            StepMove::Blocked => {
                tracing::debug!("Step {} blocked by {} field error(s)", current, result.errors.len());
                self.errors = result.errors;
            }
            StepMove::AtTerminal => {
                self.errors.clear();
            }
            StepMove::Moved { .. } => {
                self.errors.clear();
                self.persistence
                    .save_best_effort(&self.draft, self.sequencer.current())
                    .await;
            }
        }

        self.changed();
        step_move
    }

    /// Move back one step. Never gated.
    pub fn previous_step(&mut self) {
        self.sequencer.retreat();
        self.errors.clear();
        self.changed();
    }

    /// Jump to step `index`.
    ///
    /// If that step failed validation earlier and has not been touched
    /// since, its errors are shown again.
    pub fn go_to_step(&mut self, index: usize) -> Result<(), SessionError> {
        self.sequencer.go_to(index)?;
        self.errors = match self.cache.get(index) {
            Some(result) if !result.is_valid => result.errors.clone(),
            _ => FieldErrors::new(),
        };
        self.changed();
        Ok(())
    }

    /// Persist now. Returns whether a write happened (false when clean).
    pub async fn save_draft(&mut self) -> Result<bool, SessionError> {
        let written = self
            .persistence
            .save(&self.draft, self.sequencer.current())
            .await
            .inspect_err(|e| tracing::warn!("Manual save failed: {}", e))?;
        if written {
            self.changed();
        }
        Ok(written)
    }

    /// Persist edits, or the navigation position when it differs from the
    /// stored copy's. Returns whether a write happened.
    pub async fn save_position(&mut self) -> Result<bool, SessionError> {
        let written = self
            .persistence
            .save_position(&self.draft, self.sequencer.current())
            .await?;
        if written {
            self.changed();
        }
        Ok(written)
    }

    /// Fire deferred work whose deadline has passed (the autosave).
    pub async fn run_due_tasks(&mut self) -> bool {
        let saved = self
            .persistence
            .run_due(&self.draft, self.sequencer.current())
            .await;
        if saved {
            self.changed();
        }
        saved
    }

    /// Validate the whole draft and mark the session as submitting.
    pub fn begin_submit(&mut self) -> Result<SubmitTicket, SubmitBlocked> {
        if self.submitting {
            tracing::debug!("Submit rejected: already in flight");
            return Err(SubmitBlocked::InFlight);
        }

        let errors = self.engine.validate_for_submission(&self.plan, &self.draft);
        if !errors.is_empty() {
            self.errors = errors.clone();
            self.changed();
            return Err(SubmitBlocked::Invalid(errors));
        }

        self.submitting = true;
        self.submit_error = None;
        self.changed();
        tracing::info!("Submitting assessment for {}", self.draft.member_id);
        Ok(SubmitTicket {
            draft: self.draft.clone(),
        })
    }

    /// Apply the collaborator's answer to a started submission.
    pub async fn finish_submit(
        &mut self,
        _ticket: SubmitTicket,
        result: Result<SubmissionReceipt, SubmitError>,
    ) -> SubmitOutcome {
        self.submitting = false;

        let outcome = match result {
            Ok(receipt) => {
                tracing::info!("Submission {} accepted for {}", receipt.id, receipt.member_id);
                self.clear_all().await;
                SubmitOutcome::Submitted(receipt)
            }
            Err(e) => {
                tracing::warn!("Submission failed for {}: {}", self.draft.member_id, e);
                if let SubmitError::Validation { errors } = &e {
                    for (name, message) in errors {
                        if let Ok(field) = name.parse::<Field>() {
                            self.errors.insert(field, message.clone());
                        }
                    }
                }
                self.submit_error = Some(e.clone());
                SubmitOutcome::Failed(e)
            }
        };

        self.changed();
        outcome
    }

    /// End a started submission whose collaborator call never produced a
    /// result. The draft is kept and `error` surfaced as the failure.
    pub(crate) fn abort_submit(&mut self, error: SubmitError) -> SubmitOutcome {
        self.submitting = false;
        tracing::warn!("Submission aborted for {}: {}", self.draft.member_id, error);
        self.submit_error = Some(error.clone());
        self.changed();
        SubmitOutcome::Failed(error)
    }

    /// Validate, send and apply the result in one call.
    pub async fn submit(&mut self) -> SubmitOutcome {
        let ticket = match self.begin_submit() {
            Ok(ticket) => ticket,
            Err(blocked) => return SubmitOutcome::Blocked(blocked),
        };
        let result = self.submitter.submit(ticket.draft()).await;
        self.finish_submit(ticket, result).await
    }

    /// Discard the draft: cancel autosave, return to the built-in empty
    /// draft, remove the persisted copy and go back to step 0.
    ///
    /// Refused while a submission is in flight, so a failed submission
    /// always finds its draft intact.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        if self.submitting {
            return Err(SessionError::SubmissionInFlight);
        }
        self.clear_all().await;
        self.submit_error = None;
        tracing::info!("Reset assessment for {}", self.draft.member_id);
        self.changed();
        Ok(())
    }

    // === Observation ===

    /// Register a listener called with a fresh snapshot after each change.
    pub fn subscribe(
        &mut self,
        listener: impl Fn(&SessionSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    // === Reads ===

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            revision: self.revision,
            draft: self.draft.clone(),
            current_step_index: self.sequencer.current(),
            total_steps: self.plan.len(),
            errors: self.errors.clone(),
            dirty: self.persistence.has_unsaved_changes(),
            last_saved_at: self.persistence.last_saved_at(),
            submitting: self.submitting,
            submit_error: self.submit_error.clone(),
            progress: self.progress_snapshot(),
        }
    }

    /// Draft under edit.
    pub fn draft(&self) -> &AssessmentDraft {
        &self.draft
    }

    /// Displayed field errors.
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Current step index.
    pub fn current_step(&self) -> usize {
        self.sequencer.current()
    }

    /// Definition of the current step.
    pub fn current_step_definition(&self) -> &StepDefinition {
        &self.plan.steps()[self.sequencer.current()]
    }

    /// The step plan.
    pub fn plan(&self) -> &StepPlan {
        &self.plan
    }

    /// Completion percentage.
    pub fn progress(&self) -> u8 {
        ScoreAggregator::completion_percentage(&self.plan, &self.draft, self.sequencer.current())
    }

    /// All derived progress values.
    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        ScoreAggregator::snapshot(&self.plan, &self.draft, self.sequencer.current())
    }

    /// Whether every mandatory field is present, wherever the user is.
    pub fn can_submit(&self) -> bool {
        ScoreAggregator::can_submit(&self.plan, &self.draft)
    }

    /// Whether a submission is in flight.
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// For "confirm before leaving" prompts.
    pub fn has_unsaved_changes(&self) -> bool {
        self.persistence.has_unsaved_changes()
    }

    /// Last successful write.
    pub fn last_saved_at(&self) -> Option<Time> {
        self.persistence.last_saved_at()
    }

    /// When the armed autosave will fire.
    pub fn next_autosave_at(&self) -> Option<Time> {
        self.persistence.next_autosave_at()
    }

    /// Step the restored draft was saved on, if a draft was restored.
    pub fn resume_step(&self) -> Option<usize> {
        self.resume_step
    }

    /// Care tier from the ADL levels, when a classifier is configured and
    /// all four levels are present and valid.
    pub fn care_tier(&self) -> Option<CareTier> {
        let classifier = self.classifier.as_ref()?;
        let total = ScoreAggregator::adl_total(&self.draft)?;
        Some(classifier.classify(total))
    }

    /// The submission collaborator.
    pub fn submitter(&self) -> Arc<dyn Submitter> {
        Arc::clone(&self.submitter)
    }

    // === Internals ===

    fn validate_step(&mut self, index: usize) -> ValidationResult {
        if let Some(cached) = self.cache.get(index) {
            return cached.clone();
        }
        let step = &self.plan.steps()[index];
        let result = self.engine.validate(step, &self.draft);
        self.cache.insert(result.clone());
        result
    }

    async fn clear_all(&mut self) {
        self.persistence.clear().await;
        self.draft = AssessmentDraft::new(self.draft.member_id.clone());
        self.sequencer.reset();
        self.cache.clear();
        self.errors.clear();
        self.resume_step = None;
    }

    fn changed(&mut self) {
        self.revision += 1;
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for (_, listener) in &self.listeners {
            listener(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use carematch_core::{DemographicsPolicy, Gender, SubmissionId};
    use carematch_storage::MemoryStore;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies from a script; accepts when the script runs out.
    #[derive(Default)]
    struct ScriptedSubmitter {
        replies: Mutex<VecDeque<Result<(), SubmitError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSubmitter {
        fn replying(replies: Vec<Result<(), SubmitError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Submitter for ScriptedSubmitter {
        async fn submit(&self, draft: &AssessmentDraft) -> Result<SubmissionReceipt, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()));
            reply.map(|_| SubmissionReceipt {
                id: SubmissionId::new(),
                member_id: draft.member_id.clone(),
                submitted_at: chrono::Utc::now(),
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> carematch_storage::Result<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str) -> carematch_storage::Result<()> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }
        async fn remove(&self, _key: &str) -> carematch_storage::Result<()> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }
    }

    struct Harness {
        store: MemoryStore,
        clock: ManualClock,
        submitter: Arc<ScriptedSubmitter>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_submitter(ScriptedSubmitter::default())
        }

        fn with_submitter(submitter: ScriptedSubmitter) -> Self {
            Self {
                store: MemoryStore::new(),
                clock: ManualClock::new(chrono::Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()),
                submitter: Arc::new(submitter),
            }
        }

        fn builder(&self, member: &str) -> SessionBuilder {
            AssessmentSession::builder(
                member,
                Arc::new(self.store.clone()),
                self.submitter.clone(),
            )
            .with_clock(Arc::new(self.clock.clone()))
        }

        async fn open(&self, member: &str) -> AssessmentSession {
            self.builder(member).open().await.unwrap()
        }

        async fn persisted(&self, member: &str) -> Option<String> {
            self.store
                .get(&format!("assessment-draft:v1:{}", member))
                .await
                .unwrap()
        }
    }

    fn fill_basic(session: &mut AssessmentSession) {
        session.update_field(Field::Gender, FieldValue::Gender(Gender::F)).unwrap();
        session.update_field(Field::BirthYear, FieldValue::Integer(1944)).unwrap();
    }

    fn fill_adl(session: &mut AssessmentSession, level: i64) {
        for field in Field::ADL {
            session.update_field(field, FieldValue::Integer(level)).unwrap();
        }
    }

    #[tokio::test]
    async fn test_go_to_every_step() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        let total = session.plan().len();
        for i in 0..total {
            session.go_to_step(i).unwrap();
            assert_eq!(session.current_step(), i);
            assert_eq!(session.snapshot().current_step_index, i);
        }
        assert!(matches!(
            session.go_to_step(total),
            Err(SessionError::InvalidStep(InvalidStep { index: 8, total: 8 }))
        ));
        assert_eq!(session.current_step(), total - 1);
    }

    #[tokio::test]
    async fn test_next_step_blocked_reports_missing_fields() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.update_field(Field::Gender, FieldValue::Gender(Gender::M)).unwrap();

        assert_eq!(session.next_step().await, StepMove::Blocked);
        assert_eq!(session.current_step(), 0);
        assert_eq!(
            session.errors().keys().copied().collect::<Vec<_>>(),
            vec![Field::BirthYear]
        );

        session.update_field(Field::BirthYear, FieldValue::Integer(1950)).unwrap();
        assert_eq!(session.next_step().await, StepMove::Moved { from: 0, to: 1 });
        assert!(session.errors().is_empty());
    }

    #[tokio::test]
    async fn test_adl_range_boundaries() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        session.next_step().await;

        for bad in [0, 4] {
            session.update_field(Field::MobilityLevel, FieldValue::Integer(bad)).unwrap();
            assert_eq!(
                session.errors().get(&Field::MobilityLevel).map(String::as_str),
                Some("mobilityLevel must be between 1 and 3")
            );
            assert_eq!(session.next_step().await, StepMove::Blocked);
            assert_eq!(session.current_step(), 1);
        }

        for good in [1, 2, 3] {
            session.update_field(Field::MobilityLevel, FieldValue::Integer(good)).unwrap();
            assert!(session.errors().is_empty());
        }
        assert!(session.next_step().await.moved());
    }

    #[tokio::test]
    async fn test_go_to_step_reshows_cached_errors() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        assert_eq!(session.next_step().await, StepMove::Blocked);
        let failed = session.errors().clone();
        assert_eq!(failed.len(), 2);

        session.go_to_step(3).unwrap();
        assert!(session.errors().is_empty());

        session.go_to_step(0).unwrap();
        assert_eq!(session.errors(), &failed);
    }

    #[tokio::test]
    async fn test_editing_invalidates_cached_errors() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.next_step().await;

        session.go_to_step(5).unwrap();
        session.update_field(Field::Gender, FieldValue::Gender(Gender::F)).unwrap();
        session.update_field(Field::BirthYear, FieldValue::Integer(1939)).unwrap();

        // The stale failure must not come back after the fix.
        session.go_to_step(0).unwrap();
        assert!(session.errors().is_empty());
        assert!(session.next_step().await.moved());
    }

    #[tokio::test]
    async fn test_previous_step_always_succeeds() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.go_to_step(2).unwrap();
        session.next_step().await;
        assert!(!session.errors().is_empty());

        session.previous_step();
        assert_eq!(session.current_step(), 1);
        assert!(session.errors().is_empty());

        session.previous_step();
        session.previous_step();
        assert_eq!(session.current_step(), 0);
    }

    #[tokio::test]
    async fn test_terminal_step_does_not_advance() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.go_to_step(7).unwrap();
        assert_eq!(session.next_step().await, StepMove::AtTerminal);
        assert_eq!(session.current_step(), 7);
    }

    #[tokio::test]
    async fn test_completion_grows_and_resets_to_zero() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        assert_eq!(session.progress(), 0);

        let mut last = 0;
        fill_basic(&mut session);
        for (field, level) in Field::ADL.into_iter().zip([1, 2, 3, 1]) {
            let progress = session.progress();
            assert!(progress >= last);
            last = progress;
            assert!(session.next_step().await.moved());
            session.update_field(field, FieldValue::Integer(level)).unwrap();
        }
        assert!(session.progress() >= last);
        assert_eq!(session.progress(), 63);

        session.reset().await.unwrap();
        assert_eq!(session.progress(), 0);
        assert_eq!(session.current_step(), 0);
    }

    #[tokio::test]
    async fn test_save_draft_is_idempotent() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.update_field(Field::Notes, FieldValue::Text("walks with a frame".into())).unwrap();

        assert!(session.save_draft().await.unwrap());
        let first = h.persisted("m-1").await.unwrap();

        h.clock.advance(Duration::from_secs(5));
        assert!(!session.save_draft().await.unwrap());
        let second = h.persisted("m-1").await.unwrap();

        assert_eq!(h.store.write_count(), 1);
        assert_eq!(first, second);
        assert!(!session.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_manual_save_failure_is_reported_and_stays_dirty() {
        let h = Harness::new();
        let mut session = AssessmentSession::builder("m-1", Arc::new(BrokenStore), h.submitter.clone())
            .with_clock(Arc::new(h.clock.clone()))
            .open()
            .await
            .unwrap();
        session.update_field(Field::Notes, FieldValue::Text("x".into())).unwrap();

        assert!(matches!(session.save_draft().await, Err(SessionError::Storage(_))));
        assert!(session.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_restore_roundtrip() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 2);
        session.update_field(Field::AssessorRelation, FieldValue::Text("son".into())).unwrap();
        session.go_to_step(4).unwrap();
        session.save_draft().await.unwrap();
        let saved = session.draft().clone();
        drop(session);

        let restored = h.open("m-1").await;
        assert_eq!(restored.draft(), &saved);
        assert_eq!(restored.resume_step(), Some(4));
        assert_eq!(restored.current_step(), 0);
        assert!(!restored.has_unsaved_changes());

        // Other members do not see it.
        let other = h.open("m-2").await;
        assert_eq!(other.draft(), &AssessmentDraft::new(MemberId::new("m-2")));
        assert_eq!(other.resume_step(), None);
    }

    #[tokio::test]
    async fn test_save_position_keeps_navigation() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.go_to_step(3).unwrap();
        assert!(!session.save_position().await.unwrap());

        session.update_field(Field::ToiletLevel, FieldValue::Integer(2)).unwrap();
        assert!(session.save_position().await.unwrap());
        drop(session);

        let mut reopened = h.open("m-1").await;
        assert_eq!(reopened.resume_step(), Some(3));
        reopened.go_to_step(6).unwrap();
        assert!(reopened.save_position().await.unwrap());
        assert_eq!(h.open("m-1").await.resume_step(), Some(6));
    }

    #[tokio::test]
    async fn test_overrides_seed_only_fresh_drafts() {
        let h = Harness::new();
        let fresh = h
            .builder("m-1")
            .with_override(Field::Gender, FieldValue::Gender(Gender::M))
            .open()
            .await
            .unwrap();
        assert_eq!(fresh.draft().gender, Some(Gender::M));
        drop(fresh);

        let mut session = h
            .builder("m-1")
            .with_override(Field::Gender, FieldValue::Gender(Gender::M))
            .open()
            .await
            .unwrap();
        session.update_field(Field::Gender, FieldValue::Empty).unwrap();
        session.update_field(Field::BirthYear, FieldValue::Integer(1931)).unwrap();
        session.save_draft().await.unwrap();
        let saved = session.draft().clone();
        drop(session);

        let restored = h
            .builder("m-1")
            .with_override(Field::Gender, FieldValue::Gender(Gender::M))
            .with_override(Field::BirthYear, FieldValue::Integer(1960))
            .open()
            .await
            .unwrap();
        assert_eq!(restored.draft(), &saved);
        assert_eq!(restored.draft().gender, None);
        assert_eq!(restored.draft().birth_year, Some(1931));
    }

    #[tokio::test]
    async fn test_can_submit_independent_of_position() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        session.go_to_step(1).unwrap();
        assert!(!session.can_submit());

        fill_adl(&mut session, 1);
        assert_eq!(session.current_step(), 1);
        assert!(session.can_submit());
        assert!(session.snapshot().progress.can_submit);
    }

    #[tokio::test]
    async fn test_autosave_fires_once_after_interval() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        let t = h.clock.now();
        session.update_field(Field::EatingLevel, FieldValue::Integer(2)).unwrap();
        assert!(session.snapshot().dirty);

        h.clock.advance(Duration::from_secs(10));
        session.update_field(Field::ToiletLevel, FieldValue::Integer(1)).unwrap();
        h.clock.advance(Duration::from_secs(19));
        assert!(!session.run_due_tasks().await);
        assert_eq!(h.store.write_count(), 0);

        h.clock.advance(Duration::from_secs(1));
        assert!(session.run_due_tasks().await);
        assert!(!session.run_due_tasks().await);

        let snapshot = session.snapshot();
        assert_eq!(h.store.write_count(), 1);
        assert!(!snapshot.dirty);
        assert!(snapshot.last_saved_at.unwrap() >= t);
    }

    #[tokio::test]
    async fn test_next_step_saves_and_tolerates_storage_failure() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        assert!(session.next_step().await.moved());
        assert_eq!(h.store.write_count(), 1);
        assert!(!session.has_unsaved_changes());

        let mut broken = AssessmentSession::builder("m-1", Arc::new(BrokenStore), h.submitter.clone())
            .with_clock(Arc::new(h.clock.clone()))
            .open()
            .await
            .unwrap();
        fill_basic(&mut broken);
        assert!(broken.next_step().await.moved());
        assert_eq!(broken.current_step(), 1);
        assert!(broken.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_reset_cancels_autosave_and_removes_copy() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        session.update_field(Field::Notes, FieldValue::Text("a".into())).unwrap();
        session.save_draft().await.unwrap();
        session.update_field(Field::Notes, FieldValue::Text("b".into())).unwrap();
        assert!(session.next_autosave_at().is_some());

        session.reset().await.unwrap();
        assert!(h.persisted("m-1").await.is_none());
        assert!(session.next_autosave_at().is_none());
        assert!(!session.has_unsaved_changes());
        assert_eq!(session.draft(), &AssessmentDraft::new(MemberId::new("m-1")));

        h.clock.advance(Duration::from_secs(120));
        assert!(!session.run_due_tasks().await);
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_success_clears_everything() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 3);
        session.save_draft().await.unwrap();

        let outcome = session.submit().await;
        assert!(matches!(outcome, SubmitOutcome::Submitted(ref r) if r.member_id.as_str() == "m-1"));
        assert_eq!(h.submitter.calls(), 1);
        assert!(h.persisted("m-1").await.is_none());
        assert_eq!(session.draft(), &AssessmentDraft::new(MemberId::new("m-1")));
        assert!(!session.is_submitting());
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_draft_for_retry() {
        let h = Harness::with_submitter(ScriptedSubmitter::replying(vec![
            Err(SubmitError::Network("connection reset".into())),
            Ok(()),
        ]));
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 2);
        let before = session.draft().clone();

        let outcome = session.submit().await;
        assert_eq!(
            outcome,
            SubmitOutcome::Failed(SubmitError::Network("connection reset".into()))
        );
        assert_eq!(session.draft(), &before);
        assert!(session.snapshot().submit_error.is_some());
        assert!(!session.is_submitting());

        assert!(matches!(session.submit().await, SubmitOutcome::Submitted(_)));
        assert_eq!(h.submitter.calls(), 2);
        assert!(session.snapshot().submit_error.is_none());
    }

    #[tokio::test]
    async fn test_server_validation_errors_land_on_fields() {
        let mut errors = BTreeMap::new();
        errors.insert("birthYear".to_string(), "does not match member record".to_string());
        errors.insert("unknownThing".to_string(), "ignored".to_string());
        let h = Harness::with_submitter(ScriptedSubmitter::replying(vec![Err(
            SubmitError::Validation { errors },
        )]));
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 1);

        assert!(matches!(session.submit().await, SubmitOutcome::Failed(SubmitError::Validation { .. })));
        assert_eq!(
            session.errors().get(&Field::BirthYear).map(String::as_str),
            Some("does not match member record")
        );
        assert_eq!(session.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_draft_is_never_sent() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 1);
        session.update_field(Field::LtciGrade, FieldValue::Integer(12)).unwrap();

        let errors = match session.submit().await {
            SubmitOutcome::Blocked(SubmitBlocked::Invalid(errors)) => errors,
            other => panic!("expected an invalid block, got {:?}", other),
        };
        assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec![Field::LtciGrade]);
        assert_eq!(h.submitter.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_submit_rejected_while_in_flight() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 1);

        let ticket = session.begin_submit().unwrap();
        assert!(session.snapshot().submitting);
        assert!(session.submit().await.is_in_flight_rejection());
        assert!(matches!(
            session.update_field(Field::Notes, FieldValue::Text("late".into())),
            Err(SessionError::SubmissionInFlight)
        ));
        assert_eq!(h.submitter.calls(), 0);

        let result = h.submitter.submit(ticket.draft()).await;
        assert!(matches!(
            session.finish_submit(ticket, result).await,
            SubmitOutcome::Submitted(_)
        ));
        assert!(!session.is_submitting());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        let err = session
            .update_field(Field::Gender, FieldValue::Integer(1))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::TypeMismatch { field: Field::Gender, expected: FieldKind::Gender }
        ));
        assert!(!session.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_listeners_receive_snapshots() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = session.subscribe(move |s| sink.lock().unwrap().push((s.revision, s.dirty)));

        session.update_field(Field::Notes, FieldValue::Text("n".into())).unwrap();
        session.save_draft().await.unwrap();
        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session.previous_step();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].1);
        assert!(!seen[1].1);
        assert!(seen[0].0 < seen[1].0);
    }

    #[tokio::test]
    async fn test_optional_demographics_policy() {
        let h = Harness::new();
        let mut session = h
            .builder("m-1")
            .with_config(AssessmentConfig::default().with_demographics(DemographicsPolicy::Optional))
            .open()
            .await
            .unwrap();
        assert!(session.next_step().await.moved());
    }

    #[tokio::test]
    async fn test_care_tier_from_configured_thresholds() {
        let h = Harness::new();
        let mut config = AssessmentConfig::default();
        config.care_tier_thresholds = Some([5, 8, 10]);
        let mut session = h.builder("m-1").with_config(config).open().await.unwrap();
        assert_eq!(session.care_tier(), None);

        fill_adl(&mut session, 2);
        assert_eq!(session.care_tier(), Some(CareTier::Mild));

        let unconfigured = h.open("m-2").await;
        assert_eq!(unconfigured.care_tier(), None);
    }

    #[tokio::test]
    async fn test_bad_configuration_fails_at_open() {
        let h = Harness::new();
        let mut config = AssessmentConfig::default();
        config.care_tier_thresholds = Some([9, 8, 7]);
        assert!(matches!(
            h.builder("m-1").with_config(config).open().await,
            Err(SessionError::Tier(_))
        ));

        let zero = AssessmentConfig {
            autosave_interval_secs: 0,
            ..AssessmentConfig::default()
        };
        assert!(matches!(
            h.builder("m-1").with_config(zero).open().await,
            Err(SessionError::Config(ConfigError::ZeroAutosaveInterval))
        ));
    }

    #[tokio::test]
    async fn test_reset_is_zero_under_optional_demographics_and_overrides() {
        let h = Harness::new();
        let mut session = h
            .builder("m-1")
            .with_config(AssessmentConfig::default().with_demographics(DemographicsPolicy::Optional))
            .open()
            .await
            .unwrap();
        assert_eq!(session.progress(), 0);
        assert!(session.next_step().await.moved());
        session.update_field(Field::MobilityLevel, FieldValue::Integer(2)).unwrap();
        assert!(session.progress() > 0);

        session.reset().await.unwrap();
        assert_eq!(session.progress(), 0);

        let mut seeded = h
            .builder("m-2")
            .with_override(Field::Gender, FieldValue::Gender(Gender::F))
            .with_override(Field::BirthYear, FieldValue::Integer(1940))
            .open()
            .await
            .unwrap();
        assert_eq!(seeded.progress(), 13);
        seeded.reset().await.unwrap();
        assert_eq!(seeded.progress(), 0);
        assert_eq!(seeded.draft(), &AssessmentDraft::new(MemberId::new("m-2")));
    }

    #[tokio::test]
    async fn test_reset_refused_while_submitting() {
        let h = Harness::new();
        let mut session = h.open("m-1").await;
        fill_basic(&mut session);
        fill_adl(&mut session, 2);
        let before = session.draft().clone();

        let ticket = session.begin_submit().unwrap();
        assert!(matches!(session.reset().await, Err(SessionError::SubmissionInFlight)));
        assert_eq!(session.draft(), &before);

        let failed = session
            .finish_submit(ticket, Err(SubmitError::Network("timeout".into())))
            .await;
        assert!(matches!(failed, SubmitOutcome::Failed(_)));
        assert_eq!(session.draft(), &before);
        session.reset().await.unwrap();
    }
}
