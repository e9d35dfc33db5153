//! Integration tests for the commitment lifecycle and recap aggregation,
//! run against an in-memory store and a scripted verification service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use uuid::Uuid;

use commitment_core::domain::{Commitment, Confidence, CycleType, ProofAnalysis};
use commitment_core::error::CommitmentError;
use commitment_core::manager::{CommitmentManager, ListFilter, RecurrenceSpec};
use commitment_core::ports::{
    CommitmentStore, PortError, PortResult, VerificationService,
};
use commitment_core::recap::RecapAggregator;
use commitment_core::schedule;
use commitment_core::windows::{CycleWindow, WindowCalculator, WindowMode};

//=========================================================================================
// Test Doubles
//=========================================================================================

/// A store backed by a mutex-guarded map. Mirrors the query semantics the
/// Postgres adapter provides.
#[derive(Default)]
struct InMemoryStore {
    commitments: Mutex<HashMap<Uuid, Commitment>>,
}

impl InMemoryStore {
    fn sorted_desc(mut items: Vec<Commitment>) -> Vec<Commitment> {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }
}

#[async_trait]
impl CommitmentStore for InMemoryStore {
    async fn insert(&self, commitment: Commitment) -> PortResult<()> {
        self.commitments
            .lock()
            .unwrap()
            .insert(commitment.id, commitment);
        Ok(())
    }

    async fn get_for_user(&self, user_id: Uuid, id: Uuid) -> PortResult<Commitment> {
        self.commitments
            .lock()
            .unwrap()
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Commitment {} not found", id)))
    }

    async fn update(&self, commitment: &Commitment) -> PortResult<()> {
        let mut commitments = self.commitments.lock().unwrap();
        if !commitments.contains_key(&commitment.id) {
            return Err(PortError::NotFound(format!(
                "Commitment {} not found",
                commitment.id
            )));
        }
        commitments.insert(commitment.id, commitment.clone());
        Ok(())
    }

    async fn remove_for_user(&self, user_id: Uuid, id: Uuid) -> PortResult<Commitment> {
        let mut commitments = self.commitments.lock().unwrap();
        match commitments.get(&id) {
            Some(c) if c.user_id == user_id => Ok(commitments.remove(&id).unwrap()),
            _ => Err(PortError::NotFound(format!("Commitment {} not found", id))),
        }
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: Option<(CycleType, CycleWindow)>,
    ) -> PortResult<Vec<Commitment>> {
        let commitments = self.commitments.lock().unwrap();
        let items = commitments
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| match &filter {
                None => true,
                Some((cycle, window)) => {
                    c.cycle == *cycle
                        && c.created_at >= window.start
                        && c.created_at <= window.end
                }
            })
            .cloned()
            .collect();
        Ok(Self::sorted_desc(items))
    }

    async fn list_active_candidates(
        &self,
        user_id: Uuid,
        daily_start: DateTime<Utc>,
        week_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Commitment>> {
        let commitments = self.commitments.lock().unwrap();
        let items = commitments
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| match &c.schedule {
                None => {
                    let start = match c.cycle {
                        CycleType::Daily => daily_start,
                        CycleType::Weekly => week_start,
                    };
                    !c.completed && c.created_at >= start && c.created_at <= now
                }
                Some(recurrence) => match recurrence.end_date {
                    None => true,
                    Some(end) => end >= now,
                },
            })
            .cloned()
            .collect();
        Ok(Self::sorted_desc(items))
    }

    async fn list_for_recap(&self, window: &CycleWindow) -> PortResult<Vec<Commitment>> {
        let commitments = self.commitments.lock().unwrap();
        let items = commitments
            .values()
            .filter(|c| match &c.schedule {
                None => c.created_at >= window.start && c.created_at < window.end,
                Some(recurrence) => {
                    c.created_at < window.end
                        && match recurrence.end_date {
                            None => true,
                            Some(end) => end >= window.start,
                        }
                }
            })
            .cloned()
            .collect();
        Ok(Self::sorted_desc(items))
    }
}

/// Returns scripted verdicts in order, then repeats the last one.
struct ScriptedVerifier {
    verdicts: Mutex<VecDeque<ProofAnalysis>>,
}

impl ScriptedVerifier {
    fn new(verdicts: Vec<ProofAnalysis>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
        }
    }
}

#[async_trait]
impl VerificationService for ScriptedVerifier {
    async fn verify(&self, _: &str, _: &str, _: &str) -> PortResult<ProofAnalysis> {
        let mut verdicts = self.verdicts.lock().unwrap();
        if verdicts.len() > 1 {
            Ok(verdicts.pop_front().unwrap())
        } else {
            Ok(verdicts
                .front()
                .cloned()
                .unwrap_or_else(|| verdict(true, Confidence::High)))
        }
    }
}

/// Always errors, as a dead upstream would.
struct FailingVerifier;

#[async_trait]
impl VerificationService for FailingVerifier {
    async fn verify(&self, _: &str, _: &str, _: &str) -> PortResult<ProofAnalysis> {
        Err(PortError::Unexpected("connection reset".to_string()))
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn tz() -> FixedOffset {
    FixedOffset::east_opt(-5 * 3600).unwrap()
}

fn verdict(is_valid: bool, confidence: Confidence) -> ProofAnalysis {
    ProofAnalysis {
        is_valid,
        explanation: if is_valid {
            "shows the commitment being honored".to_string()
        } else {
            "image does not match the commitment".to_string()
        },
        confidence,
    }
}

fn manager_with(
    store: Arc<InMemoryStore>,
    verifier: Arc<dyn VerificationService>,
) -> CommitmentManager {
    CommitmentManager::new(store, verifier, WindowCalculator::new(tz()))
}

//=========================================================================================
// Lifecycle
//=========================================================================================

#[tokio::test]
async fn create_normalizes_weekday_tokens() {
    let store = Arc::new(InMemoryStore::default());
    let manager = manager_with(store.clone(), Arc::new(ScriptedVerifier::new(vec![])));

    let commitment = manager
        .create(
            Uuid::new_v4(),
            "morning run",
            CycleType::Daily,
            Some(RecurrenceSpec {
                days: "MON, wednesday,Fri".to_string(),
                end_date: None,
            }),
        )
        .await
        .unwrap();

    let days = &commitment.schedule.as_ref().unwrap().days;
    let names: Vec<&str> = days.iter().map(|d| schedule::day_name(*d)).collect();
    assert_eq!(names, vec!["monday", "wednesday", "friday"]);

    // And it was persisted as created.
    let stored = store
        .get_for_user(commitment.user_id, commitment.id)
        .await
        .unwrap();
    assert!(stored.schedule.is_some());
    assert!(stored.proofs.is_empty());
    assert!(!stored.completed);
}

#[tokio::test]
async fn create_rejects_invalid_day_tokens_naming_them() {
    let store = Arc::new(InMemoryStore::default());
    let manager = manager_with(store.clone(), Arc::new(ScriptedVerifier::new(vec![])));

    let err = manager
        .create(
            Uuid::new_v4(),
            "stretch",
            CycleType::Daily,
            Some(RecurrenceSpec {
                days: "mon,someday,never".to_string(),
                end_date: None,
            }),
        )
        .await
        .unwrap_err();

    match err {
        CommitmentError::InvalidDays { tokens } => {
            assert_eq!(tokens, vec!["someday".to_string(), "never".to_string()]);
        }
        other => panic!("expected InvalidDays, got {other:?}"),
    }
    assert!(store.commitments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn one_off_verification_accumulates_proofs_and_never_unsets_completed() {
    let store = Arc::new(InMemoryStore::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![
        verdict(false, Confidence::Medium),
        verdict(true, Confidence::High),
        verdict(false, Confidence::Low),
    ]));
    let manager = manager_with(store.clone(), verifier);

    let user = Uuid::new_v4();
    let commitment = manager
        .create(user, "read a chapter", CycleType::Daily, None)
        .await
        .unwrap();

    let (after_invalid, first) = manager
        .verify(user, commitment.id, "https://img/1.png", "blurry text")
        .await
        .unwrap();
    assert!(!first.is_valid);
    assert!(!after_invalid.completed);
    assert_eq!(after_invalid.proofs.len(), 1);

    let (after_valid, second) = manager
        .verify(user, commitment.id, "https://img/2.png", "chapter 4 done")
        .await
        .unwrap();
    assert!(second.is_valid);
    assert!(after_valid.completed);
    assert_eq!(after_valid.proofs.len(), 2);

    // A later invalid proof is appended but cannot revoke completion.
    let (after_second_invalid, _) = manager
        .verify(user, commitment.id, "https://img/3.png", "")
        .await
        .unwrap();
    assert!(after_second_invalid.completed);
    assert_eq!(after_second_invalid.proofs.len(), 3);
}

#[tokio::test]
async fn recurring_verification_twice_on_one_day_keeps_a_single_completion() {
    let store = Arc::new(InMemoryStore::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![
        verdict(false, Confidence::Low),
        verdict(true, Confidence::High),
    ]));
    let manager = manager_with(store.clone(), verifier);

    let user = Uuid::new_v4();
    let commitment = manager
        .create(
            user,
            "gym session",
            CycleType::Daily,
            Some(RecurrenceSpec {
                days: "mon,tue,wed,thu,fri,sat,sun".to_string(),
                end_date: None,
            }),
        )
        .await
        .unwrap();

    manager
        .verify(user, commitment.id, "https://img/1.png", "")
        .await
        .unwrap();
    let (after, second) = manager
        .verify(user, commitment.id, "https://img/2.png", "bench press")
        .await
        .unwrap();

    let completions = &after.schedule.as_ref().unwrap().completions;
    assert_eq!(completions.len(), 1);
    let entry = completions.values().next().unwrap();
    assert!(entry.completed);
    assert!(second.is_valid);
    assert_eq!(
        entry.proof.as_ref().unwrap().image_url,
        "https://img/2.png"
    );
}

#[tokio::test]
async fn verification_service_failure_records_the_fallback_verdict() {
    let store = Arc::new(InMemoryStore::default());
    let manager = manager_with(store.clone(), Arc::new(FailingVerifier));

    let user = Uuid::new_v4();
    let commitment = manager
        .create(user, "meditate", CycleType::Daily, None)
        .await
        .unwrap();

    let (after, analysis) = manager
        .verify(user, commitment.id, "https://img/1.png", "")
        .await
        .unwrap();

    assert!(!analysis.is_valid);
    assert_eq!(analysis.confidence, Confidence::Low);
    assert!(!after.completed);
    // The fallback verdict is persisted like any other.
    let stored = store.get_for_user(user, commitment.id).await.unwrap();
    assert_eq!(stored.proofs.len(), 1);
    assert_eq!(stored.proofs[0].analysis.confidence, Confidence::Low);
}

#[tokio::test]
async fn verify_is_owner_scoped() {
    let store = Arc::new(InMemoryStore::default());
    let manager = manager_with(store.clone(), Arc::new(ScriptedVerifier::new(vec![])));

    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let commitment = manager
        .create(owner, "journal", CycleType::Daily, None)
        .await
        .unwrap();

    let err = manager
        .verify(stranger, commitment.id, "https://img/1.png", "")
        .await
        .unwrap_err();
    assert!(matches!(err, CommitmentError::NotFound));
}

#[tokio::test]
async fn delete_is_owner_scoped_and_irreversible() {
    let store = Arc::new(InMemoryStore::default());
    let manager = manager_with(store.clone(), Arc::new(ScriptedVerifier::new(vec![])));

    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let commitment = manager
        .create(owner, "no sugar", CycleType::Weekly, None)
        .await
        .unwrap();

    let err = manager.delete(stranger, commitment.id).await.unwrap_err();
    assert!(matches!(err, CommitmentError::NotFound));

    let removed = manager.delete(owner, commitment.id).await.unwrap();
    assert_eq!(removed.id, commitment.id);

    let err = manager.delete(owner, commitment.id).await.unwrap_err();
    assert!(matches!(err, CommitmentError::NotFound));
    assert!(matches!(
        store.get_for_user(owner, commitment.id).await,
        Err(PortError::NotFound(_))
    ));
}

//=========================================================================================
// Listing
//=========================================================================================

#[tokio::test]
async fn active_listing_applies_window_completion_and_schedule_rules() {
    let store = Arc::new(InMemoryStore::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![verdict(true, Confidence::High)]));
    let manager = manager_with(store.clone(), verifier);
    let windows = WindowCalculator::new(tz());

    let user = Uuid::new_v4();
    let today = windows.local_date(Utc::now());
    let today_token = schedule::day_name(today.weekday());
    let tomorrow_token = schedule::day_name(today.succ_opt().unwrap().weekday());

    let fresh = manager
        .create(user, "fresh one-off", CycleType::Daily, None)
        .await
        .unwrap();
    let finished = manager
        .create(user, "finished one-off", CycleType::Daily, None)
        .await
        .unwrap();
    manager
        .verify(user, finished.id, "https://img/1.png", "done")
        .await
        .unwrap();
    let scheduled_today = manager
        .create(
            user,
            "recurring today",
            CycleType::Daily,
            Some(RecurrenceSpec {
                days: today_token.to_string(),
                end_date: None,
            }),
        )
        .await
        .unwrap();
    let scheduled_tomorrow = manager
        .create(
            user,
            "recurring tomorrow",
            CycleType::Daily,
            Some(RecurrenceSpec {
                days: tomorrow_token.to_string(),
                end_date: None,
            }),
        )
        .await
        .unwrap();
    let expired = manager
        .create(
            user,
            "expired recurring",
            CycleType::Daily,
            Some(RecurrenceSpec {
                days: today_token.to_string(),
                end_date: Some(Utc::now() - Duration::days(2)),
            }),
        )
        .await
        .unwrap();

    let active = manager.list_active(user).await.unwrap();
    let ids: Vec<Uuid> = active.iter().map(|c| c.id).collect();

    assert!(ids.contains(&fresh.id));
    assert!(ids.contains(&scheduled_today.id));
    assert!(!ids.contains(&finished.id));
    assert!(!ids.contains(&scheduled_tomorrow.id));
    assert!(!ids.contains(&expired.id));
}

#[tokio::test]
async fn list_all_ignores_windows_and_cycle_filter_applies_them() {
    let store = Arc::new(InMemoryStore::default());
    let manager = manager_with(store.clone(), Arc::new(ScriptedVerifier::new(vec![])));

    let user = Uuid::new_v4();
    manager
        .create(user, "daily thing", CycleType::Daily, None)
        .await
        .unwrap();
    manager
        .create(user, "weekly thing", CycleType::Weekly, None)
        .await
        .unwrap();

    // An old daily commitment outside any current window.
    let mut old = manager
        .create(user, "stale daily", CycleType::Daily, None)
        .await
        .unwrap();
    old.created_at = Utc::now() - Duration::days(30);
    store.update(&old).await.unwrap();

    let all = manager.list(user, ListFilter::All).await.unwrap();
    assert_eq!(all.len(), 3);

    let daily = manager
        .list(user, ListFilter::Cycle(CycleType::Daily))
        .await
        .unwrap();
    let goals: Vec<&str> = daily.iter().map(|c| c.goal.as_str()).collect();
    assert_eq!(goals, vec!["daily thing"]);
}

//=========================================================================================
// Recap over the store
//=========================================================================================

#[tokio::test]
async fn automated_weekly_recap_rolls_up_scheduled_days_and_one_offs() {
    let store = Arc::new(InMemoryStore::default());
    let windows = WindowCalculator::new(tz());
    let aggregator = RecapAggregator::new(store.clone(), windows);

    let window = windows
        .window(CycleType::Weekly, WindowMode::Automated, Utc::now())
        .unwrap();

    // A recurring commitment scheduled three days a week, completed twice.
    let runner = Uuid::new_v4();
    let scheduled_days = vec![
        chrono::Weekday::Mon,
        chrono::Weekday::Wed,
        chrono::Weekday::Fri,
    ];
    let mut completions = std::collections::BTreeMap::new();
    let in_window: Vec<chrono::NaiveDate> = window
        .local_days(tz())
        .into_iter()
        .filter(|d| scheduled_days.contains(&d.weekday()))
        .collect();
    assert_eq!(in_window.len(), 3);
    for day in in_window.iter().take(2) {
        completions.insert(
            *day,
            commitment_core::domain::Completion {
                completed: true,
                proof: None,
            },
        );
    }
    store
        .insert(Commitment {
            id: Uuid::new_v4(),
            user_id: runner,
            goal: "morning run".to_string(),
            cycle: CycleType::Daily,
            completed: false,
            proofs: Vec::new(),
            schedule: Some(commitment_core::domain::Recurrence {
                days: scheduled_days,
                end_date: None,
                completions,
            }),
            created_at: window.start - Duration::days(10),
        })
        .await
        .unwrap();

    // Another user's one-off inside the window, completed.
    let reader = Uuid::new_v4();
    store
        .insert(Commitment {
            id: Uuid::new_v4(),
            user_id: reader,
            goal: "finish the novel".to_string(),
            cycle: CycleType::Weekly,
            completed: true,
            proofs: Vec::new(),
            schedule: None,
            created_at: window.start + Duration::hours(6),
        })
        .await
        .unwrap();

    // A one-off created after the window's end must not appear.
    store
        .insert(Commitment {
            id: Uuid::new_v4(),
            user_id: reader,
            goal: "too new".to_string(),
            cycle: CycleType::Weekly,
            completed: false,
            proofs: Vec::new(),
            schedule: None,
            created_at: window.end + Duration::hours(1),
        })
        .await
        .unwrap();

    let report = aggregator
        .generate(CycleType::Weekly, WindowMode::Automated)
        .await
        .unwrap();

    assert_eq!(report.user_stats[&runner].total, 3);
    assert_eq!(report.user_stats[&runner].completed, 2);
    assert_eq!(report.user_stats[&reader].total, 1);
    assert_eq!(report.user_stats[&reader].completed, 1);
    assert_eq!(report.total, 4);
    assert_eq!(report.completed, 3);
}

#[tokio::test]
async fn recap_with_no_matching_commitments_is_empty() {
    let store = Arc::new(InMemoryStore::default());
    let aggregator = RecapAggregator::new(store, WindowCalculator::new(tz()));

    let report = aggregator
        .generate(CycleType::Daily, WindowMode::Automated)
        .await
        .unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(report.completed, 0);
    assert!(report.user_stats.is_empty());
}
