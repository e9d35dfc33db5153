//! crates/commitment_core/src/manager.rs
//!
//! The commitment lifecycle: creation, proof verification, listing, active
//! resolution, and deletion. Every mutation of a commitment goes through
//! this type; readers elsewhere treat commitments as immutable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Commitment, CycleType, Proof, ProofAnalysis, Recurrence};
use crate::error::CommitmentError;
use crate::ports::{CommitmentStore, VerificationService};
use crate::schedule;
use crate::windows::{WindowCalculator, WindowMode};

/// Caller-supplied recurrence parameters, unvalidated.
#[derive(Debug, Clone)]
pub struct RecurrenceSpec {
    /// Comma-separated weekday tokens, e.g. "mon,wed,fri".
    pub days: String,
    pub end_date: Option<DateTime<Utc>>,
}

/// Listing filter for [`CommitmentManager::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    /// Every commitment regardless of age.
    All,
    /// Commitments of one cycle type created in the current manual-mode
    /// window.
    Cycle(CycleType),
}

pub struct CommitmentManager {
    store: Arc<dyn CommitmentStore>,
    verifier: Arc<dyn VerificationService>,
    windows: WindowCalculator,
}

impl CommitmentManager {
    pub fn new(
        store: Arc<dyn CommitmentStore>,
        verifier: Arc<dyn VerificationService>,
        windows: WindowCalculator,
    ) -> Self {
        Self {
            store,
            verifier,
            windows,
        }
    }

    pub fn windows(&self) -> &WindowCalculator {
        &self.windows
    }

    /// Creates a commitment. Recurring commitments must name their weekdays
    /// explicitly; invalid tokens fail with `InvalidDays` before anything
    /// is persisted.
    pub async fn create(
        &self,
        user_id: Uuid,
        goal: &str,
        cycle: CycleType,
        recurrence: Option<RecurrenceSpec>,
    ) -> Result<Commitment, CommitmentError> {
        let schedule = match recurrence {
            None => None,
            Some(spec) => Some(Recurrence {
                days: schedule::parse_days(&spec.days)?,
                end_date: spec.end_date,
                completions: BTreeMap::new(),
            }),
        };

        let commitment = Commitment {
            id: Uuid::new_v4(),
            user_id,
            goal: goal.to_string(),
            cycle,
            completed: false,
            proofs: Vec::new(),
            schedule,
            created_at: Utc::now(),
        };

        self.store.insert(commitment.clone()).await?;
        Ok(commitment)
    }

    /// Verifies submitted evidence against a commitment and records the
    /// outcome in exactly one persisted mutation.
    ///
    /// A failing verification service does not fail the operation: the safe
    /// invalid/low-confidence verdict is recorded instead. A failing store
    /// write does fail it; the verdict is then lost and the caller is told.
    pub async fn verify(
        &self,
        user_id: Uuid,
        commitment_id: Uuid,
        image_url: &str,
        extracted_text: &str,
    ) -> Result<(Commitment, ProofAnalysis), CommitmentError> {
        let mut commitment = self.store.get_for_user(user_id, commitment_id).await?;

        let analysis = match self
            .verifier
            .verify(&commitment.goal, extracted_text, image_url)
            .await
        {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(
                    error = %err,
                    commitment_id = %commitment_id,
                    "verification service failed; recording fallback verdict"
                );
                ProofAnalysis::fallback()
            }
        };

        let now = Utc::now();
        let proof = Proof {
            image_url: image_url.to_string(),
            extracted_text: extracted_text.to_string(),
            analysis: analysis.clone(),
            verified_at: now,
        };

        match commitment.schedule.as_mut() {
            Some(recurrence) => {
                // A verification belongs to the plain local calendar date,
                // not the 04:00-cycle date.
                let today = self.windows.local_date(now);
                recurrence.upsert_completion(today, analysis.is_valid, Some(proof));
            }
            None => {
                commitment.proofs.push(proof);
                if analysis.is_valid {
                    commitment.completed = true;
                }
            }
        }

        self.store.update(&commitment).await?;
        Ok((commitment, analysis))
    }

    /// Commitments the user can still act on right now: one-off commitments
    /// that are unfinished and inside their cycle's current window, and
    /// recurring commitments that are scheduled today and not expired.
    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<Commitment>, CommitmentError> {
        let now = Utc::now();
        let daily_start = self.windows.day_cycle_start(now);
        let week_start = self.windows.week_start(now);
        let candidates = self
            .store
            .list_active_candidates(user_id, daily_start, week_start, now)
            .await?;

        let today = self.windows.local_date(now);
        let tz = self.windows.tz();
        Ok(candidates
            .into_iter()
            .filter(|commitment| match &commitment.schedule {
                None => true,
                Some(recurrence) => recurrence.is_scheduled_on(today, tz),
            })
            .collect())
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        filter: ListFilter,
    ) -> Result<Vec<Commitment>, CommitmentError> {
        let window_filter = match filter {
            ListFilter::All => None,
            ListFilter::Cycle(cycle) => {
                let window = self.windows.window(cycle, WindowMode::Manual, Utc::now())?;
                Some((cycle, window))
            }
        };
        Ok(self.store.list_for_user(user_id, window_filter).await?)
    }

    /// Removes a commitment owned by `user_id`. `NotFound` when it does not
    /// exist or belongs to someone else.
    pub async fn delete(
        &self,
        user_id: Uuid,
        commitment_id: Uuid,
    ) -> Result<Commitment, CommitmentError> {
        Ok(self.store.remove_for_user(user_id, commitment_id).await?)
    }
}
