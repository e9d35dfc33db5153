//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use commitment_core::domain::{Commitment, CycleType, Proof, ProofAnalysis, Recurrence};
use commitment_core::error::CommitmentError;
use commitment_core::manager::{ListFilter, RecurrenceSpec};
use commitment_core::recap::{CommitmentRecap, RecapReport};
use commitment_core::schedule;
use commitment_core::windows::WindowMode;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_commitment_handler,
        list_commitments_handler,
        active_commitments_handler,
        verify_commitment_handler,
        delete_commitment_handler,
        recap_handler,
    ),
    components(schemas(
        CreateCommitmentRequest,
        RecurrenceRequest,
        VerifyRequest,
        CommitmentResponse,
        RecurrenceResponse,
        CompletionResponse,
        ProofResponse,
        AnalysisResponse,
        VerifyResponse,
        RecapResponse,
        UserRecapResponse,
        CommitmentRecapResponse,
        DayStatusResponse,
    )),
    tags(
        (name = "Commitment Tracker API", description = "API endpoints for tracking commitments, proofs, and recaps.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateCommitmentRequest {
    pub goal: String,
    /// "daily" or "weekly".
    pub cycle_type: String,
    pub recurring: Option<RecurrenceRequest>,
}

#[derive(Deserialize, ToSchema)]
pub struct RecurrenceRequest {
    /// Comma-separated weekday tokens, e.g. "mon,wed,fri".
    pub days: String,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    /// "all" (the default), "daily", or "weekly".
    #[serde(rename = "type")]
    pub cycle: Option<String>,
}

#[derive(Deserialize)]
pub struct RecapParams {
    /// "daily" or "weekly".
    #[serde(rename = "type")]
    pub cycle: String,
}

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CommitmentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal: String,
    pub cycle_type: String,
    pub completed: bool,
    pub proofs: Vec<ProofResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<RecurrenceResponse>,
    pub created_at: DateTime<Utc>,
}

impl CommitmentResponse {
    fn from_domain(commitment: Commitment) -> Self {
        Self {
            id: commitment.id,
            user_id: commitment.user_id,
            goal: commitment.goal,
            cycle_type: commitment.cycle.as_str().to_string(),
            completed: commitment.completed,
            proofs: commitment
                .proofs
                .into_iter()
                .map(ProofResponse::from_domain)
                .collect(),
            recurring: commitment.schedule.map(RecurrenceResponse::from_domain),
            created_at: commitment.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RecurrenceResponse {
    /// Canonical lowercase full weekday names.
    pub days: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub completions: BTreeMap<NaiveDate, CompletionResponse>,
}

impl RecurrenceResponse {
    fn from_domain(recurrence: Recurrence) -> Self {
        Self {
            days: recurrence
                .days
                .iter()
                .map(|day| schedule::day_name(*day).to_string())
                .collect(),
            end_date: recurrence.end_date,
            completions: recurrence
                .completions
                .into_iter()
                .map(|(day, completion)| {
                    (
                        day,
                        CompletionResponse {
                            completed: completion.completed,
                            proof: completion.proof.map(ProofResponse::from_domain),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CompletionResponse {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct ProofResponse {
    pub image_url: String,
    pub extracted_text: String,
    pub analysis: AnalysisResponse,
    pub verified_at: DateTime<Utc>,
}

impl ProofResponse {
    fn from_domain(proof: Proof) -> Self {
        Self {
            image_url: proof.image_url,
            extracted_text: proof.extracted_text,
            analysis: AnalysisResponse::from_domain(proof.analysis),
            verified_at: proof.verified_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisResponse {
    pub is_valid: bool,
    pub explanation: String,
    pub confidence: String,
}

impl AnalysisResponse {
    fn from_domain(analysis: ProofAnalysis) -> Self {
        Self {
            is_valid: analysis.is_valid,
            explanation: analysis.explanation,
            confidence: analysis.confidence.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VerifyResponse {
    pub commitment: CommitmentResponse,
    pub analysis: AnalysisResponse,
}

#[derive(Serialize, ToSchema)]
pub struct RecapResponse {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: u32,
    pub completed: u32,
    pub user_stats: BTreeMap<Uuid, UserRecapResponse>,
}

impl RecapResponse {
    pub fn from_report(report: RecapReport) -> Self {
        Self {
            start: report.start,
            end: report.end,
            total: report.total,
            completed: report.completed,
            user_stats: report
                .user_stats
                .into_iter()
                .map(|(user_id, stats)| {
                    (
                        user_id,
                        UserRecapResponse {
                            completed: stats.completed,
                            total: stats.total,
                            commitments: stats
                                .commitments
                                .into_iter()
                                .map(CommitmentRecapResponse::from_domain)
                                .collect(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UserRecapResponse {
    pub completed: u32,
    pub total: u32,
    pub commitments: Vec<CommitmentRecapResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct CommitmentRecapResponse {
    pub commitment: CommitmentResponse,
    /// Present for recurring commitments only; keys are the scheduled dates
    /// inside the recap window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_status: Option<BTreeMap<NaiveDate, DayStatusResponse>>,
}

impl CommitmentRecapResponse {
    fn from_domain(recap: CommitmentRecap) -> Self {
        Self {
            commitment: CommitmentResponse::from_domain(recap.commitment),
            daily_status: recap.daily_status.map(|status| {
                status
                    .into_iter()
                    .map(|(day, day_status)| {
                        (
                            day,
                            DayStatusResponse {
                                completed: day_status.completed,
                                proof: day_status.proof.map(ProofResponse::from_domain),
                            },
                        )
                    })
                    .collect()
            }),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DayStatusResponse {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofResponse>,
}

//=========================================================================================
// Shared Handler Helpers
//=========================================================================================

/// Pulls the caller's user id out of the `x-user-id` header.
fn require_user_id(headers: &HeaderMap) -> Result<Uuid, (StatusCode, String)> {
    let user_id_str = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "x-user-id header is required".to_string(),
            )
        })?;

    Uuid::parse_str(user_id_str).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Invalid x-user-id format".to_string(),
        )
    })
}

/// Translates an engine error into a caller-safe response, logging the full
/// details first.
fn engine_error_response(context: &str, err: CommitmentError) -> (StatusCode, String) {
    match &err {
        CommitmentError::InvalidDays { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        CommitmentError::NotFound => {
            (StatusCode::NOT_FOUND, "Commitment not found".to_string())
        }
        CommitmentError::InvalidRange { .. } | CommitmentError::Storage(_) => {
            error!("Failed to {context}: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {context}"),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create a commitment.
///
/// Recurring commitments must name their weekdays explicitly in the
/// `recurring.days` field.
#[utoipa::path(
    post,
    path = "/commitments",
    request_body = CreateCommitmentRequest,
    responses(
        (status = 201, description = "Commitment created", body = CommitmentResponse),
        (status = 400, description = "Bad request (missing header, unknown cycle type, or invalid weekday tokens)"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn create_commitment_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCommitmentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user_id(&headers)?;
    let cycle = CycleType::parse(&payload.cycle_type).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown cycle type '{}'", payload.cycle_type),
        )
    })?;
    let recurrence = payload.recurring.map(|recurring| RecurrenceSpec {
        days: recurring.days,
        end_date: recurring.end_date,
    });

    let commitment = app_state
        .manager
        .create(user_id, &payload.goal, cycle, recurrence)
        .await
        .map_err(|e| engine_error_response("create commitment", e))?;

    Ok((
        StatusCode::CREATED,
        Json(CommitmentResponse::from_domain(commitment)),
    ))
}

/// List the caller's commitments.
///
/// With `type=daily` or `type=weekly`, only commitments of that cycle type
/// created inside the current cycle window are returned; `type=all` (the
/// default) returns everything regardless of age.
#[utoipa::path(
    get,
    path = "/commitments",
    responses(
        (status = 200, description = "The caller's commitments", body = [CommitmentResponse]),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("type" = Option<String>, Query, description = "\"all\", \"daily\", or \"weekly\"."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_commitments_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user_id(&headers)?;
    let filter = match params.cycle.as_deref() {
        None | Some("all") => ListFilter::All,
        Some(other) => match CycleType::parse(other) {
            Some(cycle) => ListFilter::Cycle(cycle),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Unknown cycle type '{}'", other),
                ))
            }
        },
    };

    let commitments = app_state
        .manager
        .list(user_id, filter)
        .await
        .map_err(|e| engine_error_response("list commitments", e))?;

    Ok(Json(
        commitments
            .into_iter()
            .map(CommitmentResponse::from_domain)
            .collect::<Vec<_>>(),
    ))
}

/// List the caller's currently active commitments: unfinished one-offs in
/// their cycle window, plus recurring commitments scheduled today.
#[utoipa::path(
    get,
    path = "/commitments/active",
    responses(
        (status = 200, description = "The caller's active commitments", body = [CommitmentResponse]),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn active_commitments_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user_id(&headers)?;

    let commitments = app_state
        .manager
        .list_active(user_id)
        .await
        .map_err(|e| engine_error_response("list active commitments", e))?;

    Ok(Json(
        commitments
            .into_iter()
            .map(CommitmentResponse::from_domain)
            .collect::<Vec<_>>(),
    ))
}

/// Submit image proof for a commitment.
///
/// Text is extracted from the image first, then both are handed to the
/// verification service; the verdict is recorded against today for
/// recurring commitments or appended to the proof list otherwise.
#[utoipa::path(
    post,
    path = "/commitments/{id}/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification recorded", body = VerifyResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Commitment not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("id" = Uuid, Path, description = "The commitment to verify."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn verify_commitment_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(commitment_id): Path<Uuid>,
    Json(payload): Json<VerifyRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user_id(&headers)?;

    // OCR first; an unreadable image still goes to the verifier.
    let extracted_text = app_state.ocr.extract_text(&payload.image_url).await;

    let (commitment, analysis) = app_state
        .manager
        .verify(user_id, commitment_id, &payload.image_url, &extracted_text)
        .await
        .map_err(|e| engine_error_response("verify commitment", e))?;

    Ok(Json(VerifyResponse {
        commitment: CommitmentResponse::from_domain(commitment),
        analysis: AnalysisResponse::from_domain(analysis),
    }))
}

/// Delete a commitment owned by the caller.
#[utoipa::path(
    delete,
    path = "/commitments/{id}",
    responses(
        (status = 200, description = "The deleted commitment", body = CommitmentResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Commitment not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("id" = Uuid, Path, description = "The commitment to delete."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_commitment_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(commitment_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = require_user_id(&headers)?;

    let commitment = app_state
        .manager
        .delete(user_id, commitment_id)
        .await
        .map_err(|e| engine_error_response("delete commitment", e))?;

    Ok(Json(CommitmentResponse::from_domain(commitment)))
}

/// Generate an on-demand recap of the current cycle across all users.
#[utoipa::path(
    get,
    path = "/recap",
    responses(
        (status = 200, description = "The recap for the current cycle", body = RecapResponse),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("type" = String, Query, description = "\"daily\" or \"weekly\".")
    )
)]
pub async fn recap_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<RecapParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cycle = CycleType::parse(&params.cycle).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown cycle type '{}'", params.cycle),
        )
    })?;

    let report = app_state
        .recaps
        .generate(cycle, WindowMode::Manual)
        .await
        .map_err(|e| engine_error_response("generate recap", e))?;

    Ok(Json(RecapResponse::from_report(report)))
}
