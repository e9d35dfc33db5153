//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CommitmentStore` port from the core crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use commitment_core::domain::{
    Commitment, Completion, Confidence, CycleType, Proof, ProofAnalysis, Recurrence,
};
use commitment_core::ports::{CommitmentStore, PortError, PortResult};
use commitment_core::schedule;
use commitment_core::windows::CycleWindow;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CommitmentStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CommitmentRow {
    id: Uuid,
    user_id: Uuid,
    goal: String,
    cycle_type: String,
    completed: bool,
    recurrence_days: Option<Vec<String>>,
    recurrence_end_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CommitmentRow {
    fn to_domain(
        self,
        proofs: Vec<Proof>,
        completions: BTreeMap<NaiveDate, Completion>,
    ) -> PortResult<Commitment> {
        let cycle = CycleType::parse(&self.cycle_type).ok_or_else(|| {
            PortError::Unexpected(format!(
                "unknown cycle type '{}' for commitment {}",
                self.cycle_type, self.id
            ))
        })?;

        let schedule = match self.recurrence_days {
            None => None,
            Some(day_names) => {
                let mut days = Vec::with_capacity(day_names.len());
                for name in &day_names {
                    days.push(schedule::day_from_token(name).ok_or_else(|| {
                        PortError::Unexpected(format!(
                            "unknown weekday '{}' for commitment {}",
                            name, self.id
                        ))
                    })?);
                }
                Some(Recurrence {
                    days,
                    end_date: self.recurrence_end_date,
                    completions,
                })
            }
        };

        Ok(Commitment {
            id: self.id,
            user_id: self.user_id,
            goal: self.goal,
            cycle,
            completed: self.completed,
            proofs,
            schedule,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProofRow {
    commitment_id: Uuid,
    image_url: String,
    extracted_text: String,
    is_valid: bool,
    explanation: String,
    confidence: String,
    verified_at: DateTime<Utc>,
}

impl ProofRow {
    fn to_domain(self) -> Proof {
        Proof {
            image_url: self.image_url,
            extracted_text: self.extracted_text,
            analysis: ProofAnalysis {
                is_valid: self.is_valid,
                explanation: self.explanation,
                confidence: Confidence::parse(&self.confidence).unwrap_or(Confidence::Low),
            },
            verified_at: self.verified_at,
        }
    }
}

#[derive(FromRow)]
struct CompletionRow {
    commitment_id: Uuid,
    day: NaiveDate,
    completed: bool,
    proof_image_url: Option<String>,
    proof_extracted_text: Option<String>,
    proof_is_valid: Option<bool>,
    proof_explanation: Option<String>,
    proof_confidence: Option<String>,
    proof_verified_at: Option<DateTime<Utc>>,
}

impl CompletionRow {
    fn to_domain(self) -> (NaiveDate, Completion) {
        let proof = match (self.proof_image_url, self.proof_verified_at) {
            (Some(image_url), Some(verified_at)) => Some(Proof {
                image_url,
                extracted_text: self.proof_extracted_text.unwrap_or_default(),
                analysis: ProofAnalysis {
                    is_valid: self.proof_is_valid.unwrap_or(false),
                    explanation: self.proof_explanation.unwrap_or_default(),
                    confidence: self
                        .proof_confidence
                        .as_deref()
                        .and_then(Confidence::parse)
                        .unwrap_or(Confidence::Low),
                },
                verified_at,
            }),
            _ => None,
        };
        (self.day, Completion { completed: self.completed, proof })
    }
}

//=========================================================================================
// Row Assembly and Child-Row Writes
//=========================================================================================

impl PgStore {
    /// Attaches proof and completion rows to their parent commitments.
    async fn assemble(&self, rows: Vec<CommitmentRow>) -> PortResult<Vec<Commitment>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

        let proof_rows = sqlx::query_as::<_, ProofRow>(
            "SELECT commitment_id, image_url, extracted_text, is_valid, explanation, confidence, verified_at
             FROM proofs WHERE commitment_id = ANY($1) ORDER BY commitment_id, seq ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let completion_rows = sqlx::query_as::<_, CompletionRow>(
            "SELECT commitment_id, day, completed, proof_image_url, proof_extracted_text,
                    proof_is_valid, proof_explanation, proof_confidence, proof_verified_at
             FROM completions WHERE commitment_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut proofs_by_id: HashMap<Uuid, Vec<Proof>> = HashMap::new();
        for row in proof_rows {
            proofs_by_id
                .entry(row.commitment_id)
                .or_default()
                .push(row.to_domain());
        }

        let mut completions_by_id: HashMap<Uuid, BTreeMap<NaiveDate, Completion>> =
            HashMap::new();
        for row in completion_rows {
            let commitment_id = row.commitment_id;
            let (day, completion) = row.to_domain();
            completions_by_id
                .entry(commitment_id)
                .or_default()
                .insert(day, completion);
        }

        rows.into_iter()
            .map(|row| {
                let proofs = proofs_by_id.remove(&row.id).unwrap_or_default();
                let completions = completions_by_id.remove(&row.id).unwrap_or_default();
                row.to_domain(proofs, completions)
            })
            .collect()
    }

    /// Rewrites a commitment's proof and completion rows inside `tx`.
    async fn write_children(
        tx: &mut Transaction<'_, Postgres>,
        commitment: &Commitment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM proofs WHERE commitment_id = $1")
            .bind(commitment.id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM completions WHERE commitment_id = $1")
            .bind(commitment.id)
            .execute(&mut **tx)
            .await?;

        for (seq, proof) in commitment.proofs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO proofs (commitment_id, seq, image_url, extracted_text, is_valid, explanation, confidence, verified_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(commitment.id)
            .bind(seq as i32)
            .bind(&proof.image_url)
            .bind(&proof.extracted_text)
            .bind(proof.analysis.is_valid)
            .bind(&proof.analysis.explanation)
            .bind(proof.analysis.confidence.as_str())
            .bind(proof.verified_at)
            .execute(&mut **tx)
            .await?;
        }

        if let Some(recurrence) = &commitment.schedule {
            for (day, completion) in &recurrence.completions {
                let proof = completion.proof.as_ref();
                sqlx::query(
                    "INSERT INTO completions (commitment_id, day, completed, proof_image_url, proof_extracted_text,
                                              proof_is_valid, proof_explanation, proof_confidence, proof_verified_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(commitment.id)
                .bind(*day)
                .bind(completion.completed)
                .bind(proof.map(|p| p.image_url.clone()))
                .bind(proof.map(|p| p.extracted_text.clone()))
                .bind(proof.map(|p| p.analysis.is_valid))
                .bind(proof.map(|p| p.analysis.explanation.clone()))
                .bind(proof.map(|p| p.analysis.confidence.as_str()))
                .bind(proof.map(|p| p.verified_at))
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }

    fn recurrence_day_names(commitment: &Commitment) -> Option<Vec<String>> {
        commitment.schedule.as_ref().map(|recurrence| {
            recurrence
                .days
                .iter()
                .map(|day| schedule::day_name(*day).to_string())
                .collect()
        })
    }
}

//=========================================================================================
// `CommitmentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CommitmentStore for PgStore {
    async fn insert(&self, commitment: Commitment) -> PortResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query(
            "INSERT INTO commitments (id, user_id, goal, cycle_type, completed, recurrence_days, recurrence_end_date, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(commitment.id)
        .bind(commitment.user_id)
        .bind(&commitment.goal)
        .bind(commitment.cycle.as_str())
        .bind(commitment.completed)
        .bind(Self::recurrence_day_names(&commitment))
        .bind(commitment.schedule.as_ref().and_then(|r| r.end_date))
        .bind(commitment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Self::write_children(&mut tx, &commitment)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn get_for_user(&self, user_id: Uuid, id: Uuid) -> PortResult<Commitment> {
        let row = sqlx::query_as::<_, CommitmentRow>(
            "SELECT id, user_id, goal, cycle_type, completed, recurrence_days, recurrence_end_date, created_at
             FROM commitments WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .ok_or_else(|| PortError::NotFound(format!("Commitment {} not found", id)))?;

        let mut items = self.assemble(vec![row]).await?;
        items
            .pop()
            .ok_or_else(|| PortError::Unexpected("assembled an empty result".to_string()))
    }

    async fn update(&self, commitment: &Commitment) -> PortResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // The row update takes the commitment's row lock first, serializing
        // concurrent verifications of the same commitment.
        let result = sqlx::query(
            "UPDATE commitments SET completed = $2, recurrence_end_date = $3 WHERE id = $1",
        )
        .bind(commitment.id)
        .bind(commitment.completed)
        .bind(commitment.schedule.as_ref().and_then(|r| r.end_date))
        .execute(&mut *tx)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Commitment {} not found",
                commitment.id
            )));
        }

        Self::write_children(&mut tx, commitment)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn remove_for_user(&self, user_id: Uuid, id: Uuid) -> PortResult<Commitment> {
        let commitment = self.get_for_user(user_id, id).await?;

        let result = sqlx::query("DELETE FROM commitments WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Commitment {} not found", id)));
        }
        Ok(commitment)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: Option<(CycleType, CycleWindow)>,
    ) -> PortResult<Vec<Commitment>> {
        let rows = match filter {
            None => {
                sqlx::query_as::<_, CommitmentRow>(
                    "SELECT id, user_id, goal, cycle_type, completed, recurrence_days, recurrence_end_date, created_at
                     FROM commitments WHERE user_id = $1 ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            Some((cycle, window)) => {
                sqlx::query_as::<_, CommitmentRow>(
                    "SELECT id, user_id, goal, cycle_type, completed, recurrence_days, recurrence_end_date, created_at
                     FROM commitments
                     WHERE user_id = $1 AND cycle_type = $2 AND created_at >= $3 AND created_at <= $4
                     ORDER BY created_at DESC",
                )
                .bind(user_id)
                .bind(cycle.as_str())
                .bind(window.start)
                .bind(window.end)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.assemble(rows).await
    }

    async fn list_active_candidates(
        &self,
        user_id: Uuid,
        daily_start: DateTime<Utc>,
        week_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Commitment>> {
        let rows = sqlx::query_as::<_, CommitmentRow>(
            "SELECT id, user_id, goal, cycle_type, completed, recurrence_days, recurrence_end_date, created_at
             FROM commitments
             WHERE user_id = $1 AND (
                 (recurrence_days IS NULL AND NOT completed AND (
                     (cycle_type = 'daily' AND created_at >= $2 AND created_at <= $4) OR
                     (cycle_type = 'weekly' AND created_at >= $3 AND created_at <= $4)))
                 OR (recurrence_days IS NOT NULL AND (recurrence_end_date IS NULL OR recurrence_end_date >= $4))
             )
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(daily_start)
        .bind(week_start)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.assemble(rows).await
    }

    async fn list_for_recap(&self, window: &CycleWindow) -> PortResult<Vec<Commitment>> {
        let rows = sqlx::query_as::<_, CommitmentRow>(
            "SELECT id, user_id, goal, cycle_type, completed, recurrence_days, recurrence_end_date, created_at
             FROM commitments
             WHERE (recurrence_days IS NULL AND created_at >= $1 AND created_at < $2)
                OR (recurrence_days IS NOT NULL AND created_at < $2 AND (recurrence_end_date IS NULL OR recurrence_end_date >= $1))
             ORDER BY created_at DESC",
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.assemble(rows).await
    }
}
