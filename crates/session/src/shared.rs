//! Shared, lockable session for async hosts.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::session::{AssessmentSession, SubmitOutcome};
use crate::submit::SubmitError;

/// An [`AssessmentSession`] behind an async mutex.
///
/// Commands take the lock for their duration. Submission releases it while
/// the collaborator call is in flight, so the UI stays responsive and a
/// second `submit` is rejected rather than queued.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<AssessmentSession>>,
}

impl SharedSession {
    /// Wrap a session.
    pub fn new(session: AssessmentSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session for a command or a read.
    pub async fn lock(&self) -> MutexGuard<'_, AssessmentSession> {
        self.inner.lock().await
    }

    /// Submit without holding the lock across the collaborator call.
    ///
    /// The call and the application of its result run on a spawned task,
    /// so dropping the returned future (a timeout, a `select!`) does not
    /// cancel the submission: the session leaves the submitting state when
    /// the collaborator answers.
    pub async fn submit(&self) -> SubmitOutcome {
        let (ticket, submitter) = {
            let mut session = self.inner.lock().await;
            match session.begin_submit() {
                Ok(ticket) => (ticket, session.submitter()),
                Err(blocked) => return SubmitOutcome::Blocked(blocked),
            }
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = submitter.submit(ticket.draft()).await;
            inner.lock().await.finish_submit(ticket, result).await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = SubmitError::Network(format!("submission task failed: {}", e));
                self.inner.lock().await.abort_submit(error)
            }
        }
    }

    /// Poll deferred tasks every `poll` until every handle to the session
    /// is dropped.
    pub fn spawn_autosave_driver(&self, poll: Duration) -> JoinHandle<()> {
        let weak: Weak<Mutex<AssessmentSession>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    tracing::debug!("Session dropped, stopping autosave driver");
                    break;
                };
                inner.lock().await.run_due_tasks().await;
            }
        })
    }
}
