use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{LedgerStore, StoreResult};
use crate::models::contribution::{Contribution, NewContribution};
use crate::models::fine::{Fine, FinePayment, NewFine};
use crate::models::loan::{
    Loan, LoanApproval, LoanFilter, LoanInstallment, LoanRepayment, NewInstallment, NewLoan,
};
use crate::models::profile::{NewProfile, Profile};
use crate::models::role::{AppRole, RoleAssignment};
use crate::repositories::contribution_repo::ContributionRepository;
use crate::repositories::fine_repo::FineRepository;
use crate::repositories::loan_repo::LoanRepository;
use crate::repositories::profile_repo::ProfileRepository;
use crate::repositories::role_repo::RoleRepository;

/// [`LedgerStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    profiles: ProfileRepository,
    roles: RoleRepository,
    contributions: ContributionRepository,
    loans: LoanRepository,
    fines: FineRepository,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            profiles: ProfileRepository::new(pool.clone()),
            roles: RoleRepository::new(pool.clone()),
            contributions: ContributionRepository::new(pool.clone()),
            loans: LoanRepository::new(pool.clone()),
            fines: FineRepository::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_profile(&self, new: NewProfile) -> StoreResult<Profile> {
        self.profiles.create(&new).await
    }

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        self.profiles.get_by_user_id(user_id).await
    }

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        self.profiles.get_all().await
    }

    async fn update_profile_details(
        &self,
        user_id: Uuid,
        full_name: &str,
        phone: Option<&str>,
    ) -> StoreResult<Profile> {
        self.profiles.update_details(user_id, full_name, phone).await
    }

    async fn set_profile_approved(&self, user_id: Uuid, approved: bool) -> StoreResult<Profile> {
        self.profiles.set_approved(user_id, approved).await
    }

    async fn insert_role(&self, user_id: Uuid, role: AppRole) -> StoreResult<RoleAssignment> {
        self.roles.assign(user_id, role).await
    }

    async fn list_roles(&self, user_id: Uuid) -> StoreResult<Vec<AppRole>> {
        self.roles.get_roles(user_id).await
    }

    async fn insert_contribution(&self, new: NewContribution) -> StoreResult<Contribution> {
        self.contributions.create(&new).await
    }

    async fn list_contributions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Contribution>> {
        self.contributions.get_all(user_id).await
    }

    async fn insert_loan(&self, new: NewLoan) -> StoreResult<Loan> {
        self.loans.create(&new).await
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        self.loans.get_by_id(id).await
    }

    async fn list_loans(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>> {
        self.loans.get_all(filter).await
    }

    async fn list_installments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanInstallment>> {
        self.loans.get_installments(loan_id).await
    }

    async fn list_repayments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>> {
        self.loans.get_repayments(loan_id).await
    }

    async fn approve_loan(
        &self,
        loan_id: Uuid,
        approval: &LoanApproval,
        schedule: &[NewInstallment],
    ) -> StoreResult<Loan> {
        self.loans.approve(loan_id, approval, schedule).await
    }

    async fn deny_loan(&self, loan_id: Uuid, notes: Option<&str>) -> StoreResult<Loan> {
        self.loans.deny(loan_id, notes).await
    }

    async fn record_loan_payment(
        &self,
        loan_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Loan> {
        self.loans.record_payment(loan_id, amount, paid_at).await
    }

    async fn mark_loan_defaulted(
        &self,
        loan_id: Uuid,
        as_of: DateTime<Utc>,
        notes: &str,
    ) -> StoreResult<Loan> {
        self.loans.mark_defaulted(loan_id, as_of, notes).await
    }

    async fn insert_fine(&self, new: NewFine) -> StoreResult<Fine> {
        self.fines.create(&new).await
    }

    async fn get_fine(&self, id: Uuid) -> StoreResult<Option<Fine>> {
        self.fines.get_by_id(id).await
    }

    async fn list_fines(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Fine>> {
        self.fines.get_all(user_id).await
    }

    async fn list_fine_payments(&self, fine_id: Uuid) -> StoreResult<Vec<FinePayment>> {
        self.fines.get_payments(fine_id).await
    }

    async fn record_fine_payment(
        &self,
        fine_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Fine> {
        self.fines.record_payment(fine_id, amount, paid_at).await
    }

    async fn cancel_fine(&self, fine_id: Uuid) -> StoreResult<Fine> {
        self.fines.cancel(fine_id).await
    }
}
