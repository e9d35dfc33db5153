//! crates/commitment_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use uuid::Uuid;

/// Governs which time-window rules apply to a non-recurring commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleType {
    Daily,
    Weekly,
}

impl CycleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleType::Daily => "daily",
            CycleType::Weekly => "weekly",
        }
    }

    pub fn parse(value: &str) -> Option<CycleType> {
        match value.to_ascii_lowercase().as_str() {
            "daily" => Some(CycleType::Daily),
            "weekly" => Some(CycleType::Weekly),
            _ => None,
        }
    }
}

/// A user's declared goal.
///
/// Exactly one of the two completion paths is meaningful: a one-off
/// commitment uses `completed` + `proofs`, a recurring one tracks per-day
/// state inside its `schedule` instead.
#[derive(Debug, Clone)]
pub struct Commitment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal: String,
    pub cycle: CycleType,
    /// One-off commitments only. Set once any proof is judged valid; never
    /// reset automatically.
    pub completed: bool,
    /// One-off commitments only. Append-only.
    pub proofs: Vec<Proof>,
    /// Present iff the commitment recurs on fixed weekdays.
    pub schedule: Option<Recurrence>,
    pub created_at: DateTime<Utc>,
}

impl Commitment {
    pub fn is_recurring(&self) -> bool {
        self.schedule.is_some()
    }
}

/// A fixed weekly schedule with an optional expiry.
#[derive(Debug, Clone)]
pub struct Recurrence {
    /// Non-empty, deduplicated, Monday-first.
    pub days: Vec<Weekday>,
    pub end_date: Option<DateTime<Utc>>,
    /// Keyed by local calendar date, so there is at most one entry per day
    /// by construction.
    pub completions: BTreeMap<NaiveDate, Completion>,
}

/// The verdict recorded for one calendar day of a recurring commitment.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub completed: bool,
    pub proof: Option<Proof>,
}

/// Evidence submitted for a commitment, together with its verdict.
#[derive(Debug, Clone)]
pub struct Proof {
    pub image_url: String,
    /// OCR output; may be empty.
    pub extracted_text: String,
    pub analysis: ProofAnalysis,
    pub verified_at: DateTime<Utc>,
}

/// The validity judgment produced by the verification service.
#[derive(Debug, Clone)]
pub struct ProofAnalysis {
    pub is_valid: bool,
    pub explanation: String,
    pub confidence: Confidence,
}

impl ProofAnalysis {
    /// The verdict recorded when the verification service fails or returns
    /// something unusable.
    pub fn fallback() -> Self {
        Self {
            is_valid: false,
            explanation: "Unable to verify proof due to technical issues with the analysis"
                .to_string(),
            confidence: Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Confidence> {
        match value {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}
