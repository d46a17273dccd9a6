//! Audit record types.
//!
//! Each broker call and each finished request produces one record. Records
//! of one request form a chain: every record carries the hash of its
//! predecessor and is signed by the broker key.

use quiver_core::{CallId, CallerIdentity, ErrorKind, RequestId, Timestamp, TraceId};
use quiver_crypto::{ContentHash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// Domain separator for record hashes.
const RECORD_HASH_DOMAIN: &str = "quiver audit record v1";

/// What a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    /// One broker call made by the sandbox.
    Call {
        /// Position of the call within the request.
        call_id: CallId,
        /// Call operation (`fs.read`, `net.fetch`, ...).
        operation: String,
        /// What the call targeted (path, URL, program, tool).
        target: String,
    },
    /// The terminal summary of a request.
    RequestSummary {
        /// Number of broker calls the request made.
        calls: u64,
    },
}

/// Confirmation state at the time of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalState {
    /// Nothing needed confirming.
    NotRequired,
    /// An approver granted it.
    Approved {
        /// Who approved.
        approver: String,
    },
    /// An approver refused it.
    Denied {
        /// Reason given.
        reason: Option<String>,
    },
    /// No answer arrived before the confirmation timeout.
    TimedOut,
    /// No approver was available.
    Unavailable,
}

impl ApprovalState {
    /// Whether the action may proceed.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::NotRequired | Self::Approved { .. })
    }
}

/// Outcome of the recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// It succeeded.
    Success,
    /// It failed or was refused.
    Failure {
        /// Envelope error kind.
        kind: ErrorKind,
        /// Message.
        message: String,
    },
}

impl AuditOutcome {
    /// Create a failure outcome.
    #[must_use]
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Whether this is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The content of a record before it is linked and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBody {
    /// Request the record belongs to.
    pub request_id: RequestId,
    /// Trace correlating the request with its host task.
    pub trace_id: TraceId,
    /// Call or summary.
    #[serde(flatten)]
    pub kind: RecordKind,
    /// Capability package name.
    pub capability: String,
    /// Tool name.
    pub tool: String,
    /// Who asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<CallerIdentity>,
    /// Digest of the (redacted) input.
    pub input_digest: ContentHash,
    /// Digest of the (redacted) output.
    pub output_digest: ContentHash,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Rendered effective permission.
    pub effective_permissions: String,
    /// Confirmation state.
    pub approval: ApprovalState,
    /// Outcome.
    pub outcome: AuditOutcome,
}

/// A linked, signed audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// When the record was created.
    pub timestamp: Timestamp,
    /// Position within the request chain, starting at 0.
    pub sequence: u64,
    /// Record content.
    #[serde(flatten)]
    pub body: RecordBody,
    /// Hash of the previous record of the same request (zero for the first).
    pub previous_hash: ContentHash,
    /// Key that signed the record.
    pub broker_key: PublicKey,
    /// Signature over everything above.
    pub signature: Signature,
}

#[derive(Serialize)]
struct SigningView<'a> {
    id: &'a Uuid,
    timestamp: &'a Timestamp,
    sequence: u64,
    body: &'a RecordBody,
    previous_hash: &'a ContentHash,
    broker_key: &'a PublicKey,
}

impl AuditRecord {
    /// Link and sign a record body.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Encoding`] if the body cannot be
    /// serialized.
    pub fn create(
        body: RecordBody,
        sequence: u64,
        previous_hash: ContentHash,
        key: &KeyPair,
    ) -> AuditResult<Self> {
        let mut record = Self {
            id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
            sequence,
            body,
            previous_hash,
            broker_key: key.public_key(),
            signature: Signature::from_bytes([0u8; 64]),
        };
        record.signature = key.sign(&record.signing_data()?);
        Ok(record)
    }

    /// Bytes covered by the signature.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Encoding`] if the record cannot be
    /// serialized.
    pub fn signing_data(&self) -> AuditResult<Vec<u8>> {
        serde_json::to_vec(&SigningView {
            id: &self.id,
            timestamp: &self.timestamp,
            sequence: self.sequence,
            body: &self.body,
            previous_hash: &self.previous_hash,
            broker_key: &self.broker_key,
        })
        .map_err(|e| AuditError::Encoding(e.to_string()))
    }

    /// Hash the next record in the chain links to.
    ///
    /// # Errors
    ///
    /// See [`AuditRecord::signing_data`].
    pub fn content_hash(&self) -> AuditResult<ContentHash> {
        let mut data = self.signing_data()?;
        data.extend_from_slice(self.signature.as_bytes());
        Ok(ContentHash::hash_with_domain(RECORD_HASH_DOMAIN, &data))
    }

    /// Verify the signature against the embedded key.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidSignature`] on mismatch.
    pub fn verify_signature(&self) -> AuditResult<()> {
        self.broker_key
            .verify(&self.signing_data()?, &self.signature)
            .map_err(|_| AuditError::InvalidSignature {
                record_id: self.id.to_string(),
            })
    }

    /// Whether this record directly follows `previous`.
    #[must_use]
    pub fn follows(&self, previous: &Self) -> bool {
        self.sequence == previous.sequence.saturating_add(1)
            && previous
                .content_hash()
                .is_ok_and(|hash| hash == self.previous_hash)
    }

    /// Whether this is a request summary.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        matches!(self.body.kind, RecordKind::RequestSummary { .. })
    }
}
