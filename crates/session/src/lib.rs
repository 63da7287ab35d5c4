//! Multi-step care assessment session.
//!
//! Composes the validation engine, progress aggregation, draft persistence
//! and step sequencing into one handle the UI drives with commands and reads
//! back as snapshots.

#![warn(missing_docs)]

pub mod clock;
pub mod persistence;
pub mod sequencer;
pub mod submit;
pub mod session;
pub mod shared;

pub use clock::{Clock, ManualClock, Scheduler, SystemClock};
pub use persistence::{draft_key, DraftEnvelope, DraftPersistence};
pub use sequencer::{InvalidStep, StepMove, StepSequencer};
pub use submit::{HttpSubmitter, OutboxEntry, OutboxSubmitter, SubmissionReceipt, SubmitError, Submitter};
pub use session::{
    AssessmentSession, SessionBuilder, SessionError, SessionSnapshot, SubmitBlocked, SubmitOutcome,
    SubmitTicket,
};
pub use shared::SharedSession;
