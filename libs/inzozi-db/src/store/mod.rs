use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::contribution::{Contribution, NewContribution};
use crate::models::fine::{Fine, FinePayment, NewFine};
use crate::models::loan::{
    Loan, LoanApproval, LoanFilter, LoanInstallment, LoanRepayment, NewInstallment, NewLoan,
};
use crate::models::profile::{NewProfile, Profile};
use crate::models::role::{AppRole, RoleAssignment};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A conditional write matched no row: the record exists but is not in
    /// the state the write was guarded on.
    #[error("{entity} {id} changed state: {reason}")]
    Conflict {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for the savings group ledger.
///
/// Every method is atomic. Methods that touch more than one row run as a
/// single transaction and guard on the current status of the record they
/// mutate, returning [`StoreError::Conflict`] when the guard fails.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_profile(&self, new: NewProfile) -> StoreResult<Profile>;

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>>;

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>>;

    async fn update_profile_details(
        &self,
        user_id: Uuid,
        full_name: &str,
        phone: Option<&str>,
    ) -> StoreResult<Profile>;

    async fn set_profile_approved(&self, user_id: Uuid, approved: bool) -> StoreResult<Profile>;

    /// Idempotent: assigning a role the member already holds returns the existing row.
    async fn insert_role(&self, user_id: Uuid, role: AppRole) -> StoreResult<RoleAssignment>;

    async fn list_roles(&self, user_id: Uuid) -> StoreResult<Vec<AppRole>>;

    async fn insert_contribution(&self, new: NewContribution) -> StoreResult<Contribution>;

    /// Most recent payment date first.
    async fn list_contributions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Contribution>>;

    async fn insert_loan(&self, new: NewLoan) -> StoreResult<Loan>;

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>>;

    /// Most recent application first.
    async fn list_loans(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>>;

    /// Ordered by installment number.
    async fn list_installments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanInstallment>>;

    /// Most recent first.
    async fn list_repayments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>>;

    /// Moves a `pending` loan to `approved` and writes its schedule.
    async fn approve_loan(
        &self,
        loan_id: Uuid,
        approval: &LoanApproval,
        schedule: &[NewInstallment],
    ) -> StoreResult<Loan>;

    /// Moves a `pending` loan to `denied`.
    async fn deny_loan(&self, loan_id: Uuid, notes: Option<&str>) -> StoreResult<Loan>;

    /// Adds `amount` to an approved or defaulted loan, logs the repayment and
    /// allocates it over the schedule. Guarded on the outstanding balance.
    async fn record_loan_payment(
        &self,
        loan_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Loan>;

    /// Moves an `approved` loan to `defaulted` only if it still has an
    /// installment overdue as of `as_of`, marks those installments overdue and
    /// revokes the borrower's approval.
    async fn mark_loan_defaulted(
        &self,
        loan_id: Uuid,
        as_of: DateTime<Utc>,
        notes: &str,
    ) -> StoreResult<Loan>;

    async fn insert_fine(&self, new: NewFine) -> StoreResult<Fine>;

    async fn get_fine(&self, id: Uuid) -> StoreResult<Option<Fine>>;

    /// Most recently issued first.
    async fn list_fines(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Fine>>;

    /// Most recent first.
    async fn list_fine_payments(&self, fine_id: Uuid) -> StoreResult<Vec<FinePayment>>;

    /// Appends a payment and bumps `amount_paid` on a `pending` fine in one
    /// transaction. Guarded on the remaining balance.
    async fn record_fine_payment(
        &self,
        fine_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Fine>;

    /// Moves a `pending` fine to `cancelled`.
    async fn cancel_fine(&self, fine_id: Uuid) -> StoreResult<Fine>;
}
