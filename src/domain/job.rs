//! Translation job state kept in memory for the lifetime of one request
//!
//! One `TranslationJob` exists per user-initiated translation. It is owned by
//! the controller and mutated only by stream events or explicit cancellation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of a translation job in its lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TranslationPhase {
    /// Server is translating blocks and streaming them back
    Translating,
    /// All blocks received, server is checking the result's syntax
    CheckingSyntax,
    /// Translation finished and the result is available
    Done,
    /// The stream failed
    Errored,
    /// The user stopped the job
    Cancelled,
}

impl TranslationPhase {
    /// Terminal phases accept no further events.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TranslationPhase::Done | TranslationPhase::Errored | TranslationPhase::Cancelled
        )
    }
}

impl std::fmt::Display for TranslationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationPhase::Translating => write!(f, "translating"),
            TranslationPhase::CheckingSyntax => write!(f, "checking syntax"),
            TranslationPhase::Done => write!(f, "done"),
            TranslationPhase::Errored => write!(f, "failed"),
            TranslationPhase::Cancelled => write!(f, "stopped by user"),
        }
    }
}

/// Final output of a completed job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslationResult {
    /// Derived file name: base name + actor identity + completion timestamp
    pub file_name: String,
    /// Translated blocks joined with the fixed block separator
    pub text: String,
}

/// In-memory state of one translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationJob {
    /// Unique id for log provenance
    pub job_id: String,
    /// Input file, immutable once the job starts
    pub source_file_name: String,
    /// Authenticated user identity, used in the derived result name
    pub actor: String,
    pub phase: TranslationPhase,
    /// Block count reported by the first stream event; 0 until known
    pub total_units: u32,
    /// Blocks translated so far, monotonically increasing
    pub completed_units: u32,
    /// Translated blocks in receipt order, append-only
    pub blocks: Vec<String>,
    /// Present once the phase reaches `Done`
    pub result: Option<TranslationResult>,
    pub started_at: DateTime<Utc>,
}

impl TranslationJob {
    pub fn new(source_file_name: &str, actor: &str) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            source_file_name: source_file_name.to_string(),
            actor: actor.to_string(),
            phase: TranslationPhase::Translating,
            total_units: 0,
            completed_units: 0,
            blocks: Vec::new(),
            result: None,
            started_at: Utc::now(),
        }
    }

    /// Snapshot of the observable state for progress rendering.
    pub fn progress(&self, message: impl Into<String>) -> TranslationProgress {
        let percentage = if self.total_units > 0 {
            f64::from(self.completed_units) / f64::from(self.total_units) * 100.0
        } else {
            0.0
        };

        TranslationProgress {
            phase: self.phase,
            current: self.completed_units,
            total: self.total_units,
            percentage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Observable progress of the running job, emitted on every state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationProgress {
    pub phase: TranslationPhase,
    /// Blocks translated so far
    pub current: u32,
    /// Total expected blocks
    pub total: u32,
    /// Progress percentage (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable description of the current step
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
