//! crates/commitment_core/src/recap.rs
//!
//! Periodic aggregate recaps: per-user and global completion statistics
//! over a cycle window. Everything here is derived read-model data, kept in
//! separate output types and never written back onto commitments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{Commitment, CycleType, Proof};
use crate::error::CommitmentError;
use crate::ports::CommitmentStore;
use crate::windows::{CycleWindow, WindowCalculator, WindowMode};

/// Completion state of one scheduled day of a recurring commitment.
///
/// Only scheduled dates appear in a day-status map. An absent date means
/// "not scheduled" and carries no other information; a scheduled day with
/// no verification is present with `completed == false`.
#[derive(Debug, Clone)]
pub struct DayStatus {
    pub completed: bool,
    pub proof: Option<Proof>,
}

/// One commitment as it appears in a recap.
#[derive(Debug, Clone)]
pub struct CommitmentRecap {
    pub commitment: Commitment,
    /// Present for recurring commitments only.
    pub daily_status: Option<BTreeMap<NaiveDate, DayStatus>>,
}

#[derive(Debug, Clone, Default)]
pub struct UserRecap {
    pub commitments: Vec<CommitmentRecap>,
    pub completed: u32,
    pub total: u32,
}

#[derive(Debug, Clone)]
pub struct RecapReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: u32,
    pub completed: u32,
    pub user_stats: HashMap<Uuid, UserRecap>,
}

/// Builds recap reports from the store. Reads are an unlocked point-in-time
/// snapshot; verifications racing a recap may or may not be reflected.
pub struct RecapAggregator {
    store: Arc<dyn CommitmentStore>,
    windows: WindowCalculator,
}

impl RecapAggregator {
    pub fn new(store: Arc<dyn CommitmentStore>, windows: WindowCalculator) -> Self {
        Self { store, windows }
    }

    pub async fn generate(
        &self,
        cycle: CycleType,
        mode: WindowMode,
    ) -> Result<RecapReport, CommitmentError> {
        let window = self.windows.window(cycle, mode, Utc::now())?;
        let commitments = self.store.list_for_recap(&window).await?;
        Ok(build_report(&window, commitments, self.windows.tz()))
    }
}

/// Rolls a fetched commitment set up into a report. Pure: `window` and `tz`
/// fully determine the day enumeration.
pub fn build_report(
    window: &CycleWindow,
    commitments: Vec<Commitment>,
    tz: FixedOffset,
) -> RecapReport {
    let days = window.local_days(tz);
    let mut user_stats: HashMap<Uuid, UserRecap> = HashMap::new();

    for commitment in commitments {
        let daily_status = commitment.schedule.as_ref().map(|recurrence| {
            let mut status = BTreeMap::new();
            for day in &days {
                if recurrence.is_scheduled_on(*day, tz) {
                    let (completed, proof) = recurrence
                        .completions
                        .get(day)
                        .map(|completion| (completion.completed, completion.proof.clone()))
                        .unwrap_or((false, None));
                    status.insert(*day, DayStatus { completed, proof });
                }
            }
            status
        });

        let stats = user_stats.entry(commitment.user_id).or_default();
        match &daily_status {
            Some(status) => {
                stats.total += status.len() as u32;
                stats.completed += status.values().filter(|day| day.completed).count() as u32;
            }
            None => {
                stats.total += 1;
                if commitment.completed {
                    stats.completed += 1;
                }
            }
        }
        stats.commitments.push(CommitmentRecap {
            commitment,
            daily_status,
        });
    }

    let total = user_stats.values().map(|stats| stats.total).sum();
    let completed = user_stats.values().map(|stats| stats.completed).sum();

    RecapReport {
        start: window.start,
        end: window.end,
        total,
        completed,
        user_stats,
    }
}
