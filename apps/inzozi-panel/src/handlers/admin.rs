use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use inzozi_db::models::contribution::Contribution;
use inzozi_db::models::fine::Fine;
use inzozi_db::models::loan::{Loan, LoanStatus};
use inzozi_db::models::profile::Profile;
use inzozi_shared::api::{
    ContributionProgress, ContributionRequest, DashboardStats, IssueFineRequest,
    LoanDecisionRequest, MemberApprovalRequest, PaymentRequest, SweepReport,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::LedgerResult;
use crate::handlers::extract::LedgerJson;
use crate::services::fine_service::FineDetails;
use crate::services::loan_service::LoanDetails;
use crate::services::member_service::MemberSummary;
use crate::workflow::Principal;

#[derive(Debug, Deserialize)]
pub struct LoanListQuery {
    pub status: Option<LoanStatus>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<DashboardStats>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.dashboard().await?))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<MemberSummary>>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.list_members().await?))
}

pub async fn set_member_approval(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
    LedgerJson(body): LedgerJson<MemberApprovalRequest>,
) -> LedgerResult<Json<Profile>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.set_member_approval(user_id, body.approve).await?))
}

pub async fn member_progress(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> LedgerResult<Json<ContributionProgress>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.member_progress(user_id).await?))
}

pub async fn list_contributions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<Contribution>>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.list_contributions().await?))
}

pub async fn record_contribution(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    LedgerJson(body): LedgerJson<ContributionRequest>,
) -> LedgerResult<(StatusCode, Json<Contribution>)> {
    let desk = state.workflow.admin(&principal).await?;
    let contribution = desk
        .record_contribution(
            body.user_id,
            body.amount,
            body.payment_date,
            body.reference_number.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(contribution)))
}

pub async fn list_loans(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<LoanListQuery>,
) -> LedgerResult<Json<Vec<Loan>>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.list_loans(query.status).await?))
}

pub async fn unscheduled_loans(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<Loan>>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.unscheduled_loans().await?))
}

pub async fn get_loan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> LedgerResult<Json<LoanDetails>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.loan(id).await?))
}

pub async fn decide_loan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    LedgerJson(body): LedgerJson<LoanDecisionRequest>,
) -> LedgerResult<Json<Loan>> {
    let desk = state.workflow.admin(&principal).await?;
    let loan = desk
        .decide_loan(id, body.approve, body.notes.as_deref())
        .await?;
    Ok(Json(loan))
}

pub async fn record_loan_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    LedgerJson(body): LedgerJson<PaymentRequest>,
) -> LedgerResult<Json<Loan>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.record_loan_payment(id, body.amount).await?))
}

pub async fn list_fines(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<Fine>>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.list_fines().await?))
}

pub async fn issue_fine(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    LedgerJson(body): LedgerJson<IssueFineRequest>,
) -> LedgerResult<(StatusCode, Json<Fine>)> {
    let desk = state.workflow.admin(&principal).await?;
    let fine = desk.issue_fine(body.user_id, body.amount, &body.reason).await?;
    Ok((StatusCode::CREATED, Json(fine)))
}

pub async fn get_fine(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> LedgerResult<Json<FineDetails>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.fine(id).await?))
}

pub async fn pay_fine(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    LedgerJson(body): LedgerJson<PaymentRequest>,
) -> LedgerResult<Json<Fine>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.pay_fine(id, body.amount).await?))
}

pub async fn cancel_fine(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> LedgerResult<Json<Fine>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.cancel_fine(id).await?))
}

pub async fn run_sweep(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<SweepReport>> {
    let desk = state.workflow.admin(&principal).await?;
    Ok(Json(desk.run_sweep().await?))
}
