//! crates/commitment_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Commitment, CycleType, ProofAnalysis};
use crate::windows::CycleWindow;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence contract for commitments.
///
/// Implementations must apply an `update` of a single commitment's proofs
/// and completions atomically, serialized per commitment id, so that two
/// racing verifications cannot interleave a lost write. Every listing is
/// ordered by `created_at` descending.
#[async_trait]
pub trait CommitmentStore: Send + Sync {
    async fn insert(&self, commitment: Commitment) -> PortResult<()>;

    /// Fetches a commitment scoped to its owner. `NotFound` when absent or
    /// owned by someone else.
    async fn get_for_user(&self, user_id: Uuid, id: Uuid) -> PortResult<Commitment>;

    /// Persists the current state of a commitment in one atomic step.
    async fn update(&self, commitment: &Commitment) -> PortResult<()>;

    /// Removes a commitment scoped to its owner, returning it. `NotFound`
    /// when absent or owned by someone else.
    async fn remove_for_user(&self, user_id: Uuid, id: Uuid) -> PortResult<Commitment>;

    /// All of a user's commitments, optionally restricted to one cycle type
    /// with `created_at` inside the given window (both bounds inclusive for
    /// this listing).
    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: Option<(CycleType, CycleWindow)>,
    ) -> PortResult<Vec<Commitment>>;

    /// Candidates for the active listing: one-off commitments that are not
    /// completed and were created inside their own cycle's current window
    /// (`[daily_start, now]` or `[week_start, now]`), plus recurring
    /// commitments whose end date is absent or at/after `now`. Weekday
    /// membership for recurring candidates is the caller's concern.
    async fn list_active_candidates(
        &self,
        user_id: Uuid,
        daily_start: DateTime<Utc>,
        week_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Commitment>>;

    /// Selection for a recap window, across all users: one-off commitments
    /// created in `[start, end)`, plus recurring commitments created before
    /// `end` whose end date is absent or at/after `start`.
    async fn list_for_recap(&self, window: &CycleWindow) -> PortResult<Vec<Commitment>>;
}

/// Judges whether submitted evidence proves a commitment was honored.
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn verify(
        &self,
        goal: &str,
        extracted_text: &str,
        image_url: &str,
    ) -> PortResult<ProofAnalysis>;
}

/// Extracts visible text from an image.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Returns the extracted text, or an empty string when extraction
    /// fails. Never fails the caller.
    async fn extract_text(&self, image_url: &str) -> String;
}
