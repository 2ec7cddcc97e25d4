use axum::{Extension, Json, extract::State, http::StatusCode};
use inzozi_db::models::contribution::Contribution;
use inzozi_db::models::fine::Fine;
use inzozi_db::models::loan::Loan;
use inzozi_db::models::profile::Profile;
use inzozi_shared::api::{ContributionProgress, LoanApplicationRequest, UpdateProfileRequest};

use crate::AppState;
use crate::error::LedgerResult;
use crate::handlers::extract::LedgerJson;
use crate::workflow::Principal;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Profile>> {
    let desk = state.workflow.member(&principal).await?;
    Ok(Json(desk.profile().clone()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    LedgerJson(body): LedgerJson<UpdateProfileRequest>,
) -> LedgerResult<Json<Profile>> {
    let desk = state.workflow.member(&principal).await?;
    let profile = desk
        .update_profile(&body.full_name, body.phone.as_deref())
        .await?;
    Ok(Json(profile))
}

pub async fn progress(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<ContributionProgress>> {
    let desk = state.workflow.member(&principal).await?;
    Ok(Json(desk.progress().await?))
}

pub async fn contributions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<Contribution>>> {
    let desk = state.workflow.member(&principal).await?;
    Ok(Json(desk.contributions().await?))
}

pub async fn loans(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<Loan>>> {
    let desk = state.workflow.member(&principal).await?;
    Ok(Json(desk.loans().await?))
}

pub async fn apply_for_loan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    LedgerJson(body): LedgerJson<LoanApplicationRequest>,
) -> LedgerResult<(StatusCode, Json<Loan>)> {
    let desk = state.workflow.member(&principal).await?;
    let loan = desk.apply_for_loan(body.amount, &body.purpose).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

pub async fn fines(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> LedgerResult<Json<Vec<Fine>>> {
    let desk = state.workflow.member(&principal).await?;
    Ok(Json(desk.fines().await?))
}
