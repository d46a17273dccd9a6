//! The audit log: chain bookkeeping over a sink.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use quiver_core::RequestId;
use quiver_crypto::{ContentHash, KeyPair, PublicKey};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditRecord, RecordBody, RecordKind};
use crate::sink::{AuditSink, MemorySink};

#[derive(Debug, Clone, Copy)]
struct ChainHead {
    next_sequence: u64,
    hash: ContentHash,
}

impl Default for ChainHead {
    fn default() -> Self {
        Self {
            next_sequence: 0,
            hash: ContentHash::zero(),
        }
    }
}

/// Signs records, links them per request and hands them to a sink.
///
/// Chains are independent: appends for different requests never contend on
/// the same head, even while a sink write is in progress.
pub struct AuditLog {
    key: KeyPair,
    sink: Arc<dyn AuditSink>,
    heads: DashMap<RequestId, Arc<Mutex<ChainHead>>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("key", &self.key)
            .field("open_chains", &self.heads.len())
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Create a log writing to `sink`.
    #[must_use]
    pub fn new(key: KeyPair, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            key,
            sink,
            heads: DashMap::new(),
        }
    }

    /// Create a log backed by a [`MemorySink`].
    #[must_use]
    pub fn in_memory(key: KeyPair) -> Self {
        Self::new(key, Arc::new(MemorySink::new()))
    }

    /// Key records are verified against.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// The underlying sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    /// Sign, link and persist a record.
    ///
    /// The chain head only advances when the sink accepted the record. A
    /// request summary closes the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or the sink
    /// rejects it.
    pub fn append(&self, body: RecordBody) -> AuditResult<AuditRecord> {
        let request_id = body.request_id;
        let closes = matches!(body.kind, RecordKind::RequestSummary { .. });

        // Only this request's chain stays locked across the sink write.
        let chain = Arc::clone(self.heads.entry(request_id).or_default().value());
        let result = chain
            .lock()
            .map_err(|_| AuditError::Sink("audit chain lock poisoned".to_owned()))
            .and_then(|mut head| {
                let record = AuditRecord::create(body, head.next_sequence, head.hash, &self.key)?;
                self.sink.append(&record)?;
                head.hash = record.content_hash()?;
                head.next_sequence = head.next_sequence.saturating_add(1);
                Ok(record)
            });

        if closes {
            self.heads.remove(&request_id);
        }
        match &result {
            Ok(record) => debug!(
                request_id = %request_id,
                sequence = record.sequence,
                summary = closes,
                "audit record appended"
            ),
            Err(e) => warn!(request_id = %request_id, error = %e, "audit append failed"),
        }
        result
    }

    /// Verify the stored chain of one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    pub fn verify_chain(&self, request_id: &RequestId) -> AuditResult<ChainVerification> {
        let records = self.sink.records_for(request_id)?;
        Ok(verify_records(&records, Some(&self.public_key())))
    }

    /// Flush the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to flush.
    pub fn flush(&self) -> AuditResult<()> {
        self.sink.flush()
    }
}

/// A defect found while verifying a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ChainIssue {
    /// The record's signature does not verify.
    InvalidSignature {
        /// Record.
        record_id: Uuid,
    },
    /// The record was signed by a different key.
    UnexpectedKey {
        /// Record.
        record_id: Uuid,
    },
    /// The record does not link to its predecessor.
    BrokenLink {
        /// Record.
        record_id: Uuid,
        /// Sequence expected at this position.
        expected_sequence: u64,
    },
    /// Records of different requests were mixed into one chain.
    ForeignRecord {
        /// Record.
        record_id: Uuid,
    },
    /// A record follows the request summary.
    AfterSummary {
        /// Record.
        record_id: Uuid,
    },
}

/// Result of verifying one request chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    /// Whether no issue was found.
    pub valid: bool,
    /// Number of records checked.
    pub records: usize,
    /// Whether the chain ends in a request summary.
    pub complete: bool,
    /// Issues found.
    pub issues: Vec<ChainIssue>,
}

/// Verify a chain of records belonging to one request, in stored order.
///
/// When `expected_key` is given every record must be signed by it.
#[must_use]
pub fn verify_records(records: &[AuditRecord], expected_key: Option<&PublicKey>) -> ChainVerification {
    let mut issues = Vec::new();
    let mut previous: Option<&AuditRecord> = None;
    let mut summary_seen = false;
    let request_id = records.first().map(|r| r.body.request_id);

    for (position, record) in records.iter().enumerate() {
        let record_id = record.id;
        if record.verify_signature().is_err() {
            issues.push(ChainIssue::InvalidSignature { record_id });
        }
        if expected_key.is_some_and(|k| *k != record.broker_key) {
            issues.push(ChainIssue::UnexpectedKey { record_id });
        }
        if Some(record.body.request_id) != request_id {
            issues.push(ChainIssue::ForeignRecord { record_id });
        }
        if summary_seen {
            issues.push(ChainIssue::AfterSummary { record_id });
        }
        let linked = match previous {
            None => record.sequence == 0 && record.previous_hash.is_zero(),
            Some(prev) => record.follows(prev),
        };
        if !linked {
            issues.push(ChainIssue::BrokenLink {
                record_id,
                expected_sequence: u64::try_from(position).unwrap_or(u64::MAX),
            });
        }
        summary_seen |= record.is_summary();
        previous = Some(record);
    }

    ChainVerification {
        valid: issues.is_empty(),
        records: records.len(),
        complete: summary_seen,
        issues,
    }
}
