//! Submission collaborator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use carematch_core::{AssessmentDraft, MemberId, SubmissionId, Time};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Why a submission failed. The draft is always kept on failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The request never reached the server or the reply never came back
    #[error("network error: {0}")]
    Network(String),

    /// The server rejected field values
    #[error("submission rejected: {}", summarize(.errors))]
    Validation {
        /// Field name -> message, as reported by the server
        errors: BTreeMap<String, String>,
    },

    /// The server failed
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status
        status: u16,
        /// Body or reason
        message: String,
    },
}

fn summarize(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    /// Submission id
    pub id: SubmissionId,

    /// Member the assessment was for
    pub member_id: MemberId,

    /// When it was accepted
    pub submitted_at: Time,
}

/// Accepts a finished draft.
///
/// Implementations own any timeout or retry policy; the session issues
/// exactly one call per submission attempt.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit the draft.
    async fn submit(&self, draft: &AssessmentDraft) -> Result<SubmissionReceipt, SubmitError>;
}

/// JSON-over-HTTP submitter.
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
    clock: Arc<dyn Clock>,
}

/// Body of a 400/422 reply.
#[derive(Debug, Deserialize)]
struct ValidationBody {
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

/// Body of a 2xx reply; the server may omit any of it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedBody {
    id: Option<SubmissionId>,
    submitted_at: Option<Time>,
}

impl HttpSubmitter {
    /// Create a submitter posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different clock for locally stamped receipts.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, draft: &AssessmentDraft) -> Result<SubmissionReceipt, SubmitError> {
        tracing::debug!("POST {} for member {}", self.endpoint, draft.member_id);

        let response = self
            .client
            .post(&self.endpoint)
            .json(draft)
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        if status.is_success() {
            let accepted: Option<AcceptedBody> = serde_json::from_str(&body).ok();
            let (id, submitted_at) = match accepted {
                Some(a) => (a.id, a.submitted_at),
                None => (None, None),
            };
            return Ok(SubmissionReceipt {
                id: id.unwrap_or_default(),
                member_id: draft.member_id.clone(),
                submitted_at: submitted_at.unwrap_or_else(|| self.clock.now()),
            });
        }

        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            if let Ok(parsed) = serde_json::from_str::<ValidationBody>(&body) {
                if !parsed.errors.is_empty() {
                    return Err(SubmitError::Validation { errors: parsed.errors });
                }
            }
        }

        Err(SubmitError::Server {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                body
            },
        })
    }
}

/// Writes each submission as a JSON file into a directory, for hosts
/// without a backend.
pub struct OutboxSubmitter {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

/// What the outbox writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Acknowledgement
    pub receipt: SubmissionReceipt,
    /// Submitted draft
    pub draft: AssessmentDraft,
}

impl OutboxSubmitter {
    /// Create an outbox in `dir`.
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }
}

#[async_trait]
impl Submitter for OutboxSubmitter {
    async fn submit(&self, draft: &AssessmentDraft) -> Result<SubmissionReceipt, SubmitError> {
        // A local write failure is reported as a transport failure.
        let io = |e: std::io::Error| SubmitError::Network(format!("outbox: {}", e));

        let receipt = SubmissionReceipt {
            id: SubmissionId::new(),
            member_id: draft.member_id.clone(),
            submitted_at: self.clock.now(),
        };
        let entry = OutboxEntry {
            receipt: receipt.clone(),
            draft: draft.clone(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| SubmitError::Network(format!("outbox: {}", e)))?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        let path = self.dir.join(format!("{}.json", receipt.id));
        tokio::fs::write(&path, json.as_bytes()).await.map_err(io)?;

        tracing::info!("Queued submission {} in {}", receipt.id, path.display());
        Ok(receipt)
    }
}
