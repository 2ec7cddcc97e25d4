//! Role-gated entry points for admins and members.
//!
//! Handlers never call the services directly: they first obtain an
//! [`AdminDesk`] or a [`MemberDesk`] for the authenticated principal, which is
//! where the role and ownership checks happen.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use inzozi_db::LedgerStore;
use inzozi_db::models::contribution::Contribution;
use inzozi_db::models::fine::Fine;
use inzozi_db::models::loan::{Loan, LoanStatus};
use inzozi_db::models::profile::Profile;
use inzozi_shared::api::{ContributionProgress, DashboardStats, SweepReport};
use tracing::warn;
use uuid::Uuid;

use crate::config::PanelConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::services::fine_service::FineDetails;
use crate::services::loan_service::LoanDetails;
use crate::services::member_service::MemberSummary;
use crate::services::overdue_monitor;
use crate::services::{
    ContributionService, FineService, LoanService, MemberService, OverdueMonitor,
};

/// Authenticated caller, as established by the session token.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub display_name: Option<String>,
}

#[derive(Clone)]
pub struct Workflow {
    pub members: MemberService,
    pub contributions: ContributionService,
    pub loans: LoanService,
    pub fines: FineService,
}

impl Workflow {
    pub fn new(store: Arc<dyn LedgerStore>, config: &PanelConfig) -> Self {
        Self {
            members: MemberService::new(store.clone()),
            contributions: ContributionService::new(
                store.clone(),
                config.membership.required_amount,
            ),
            loans: LoanService::new(store.clone(), config.loan),
            fines: FineService::new(store),
        }
    }

    pub fn overdue_monitor(&self, interval: Duration) -> OverdueMonitor {
        OverdueMonitor::new(self.loans.clone(), interval)
    }

    pub async fn admin(&self, principal: &Principal) -> LedgerResult<AdminDesk<'_>> {
        if !self.members.is_admin(principal.user_id).await? {
            warn!(user_id = %principal.user_id, "Admin operation refused");
            return Err(LedgerError::Forbidden(
                "Admin role required for this operation".to_string(),
            ));
        }
        Ok(AdminDesk { workflow: self })
    }

    /// Member access for the principal, creating their profile on first use.
    pub async fn member(&self, principal: &Principal) -> LedgerResult<MemberDesk<'_>> {
        let profile = self
            .members
            .ensure_profile(principal.user_id, principal.display_name.as_deref())
            .await?;
        Ok(MemberDesk {
            workflow: self,
            profile,
        })
    }
}

pub struct AdminDesk<'a> {
    workflow: &'a Workflow,
}

impl AdminDesk<'_> {
    pub async fn dashboard(&self) -> LedgerResult<DashboardStats> {
        self.workflow.members.dashboard().await
    }

    pub async fn list_members(&self) -> LedgerResult<Vec<MemberSummary>> {
        self.workflow.members.list_members().await
    }

    pub async fn set_member_approval(&self, user_id: Uuid, approve: bool) -> LedgerResult<Profile> {
        self.workflow.members.set_approval(user_id, approve).await
    }

    pub async fn member_progress(&self, user_id: Uuid) -> LedgerResult<ContributionProgress> {
        self.workflow.members.get(user_id).await?;
        self.workflow.contributions.progress(user_id).await
    }

    pub async fn record_contribution(
        &self,
        user_id: Uuid,
        amount: i64,
        payment_date: Option<DateTime<Utc>>,
        reference: Option<&str>,
    ) -> LedgerResult<Contribution> {
        self.workflow
            .contributions
            .record(user_id, amount, payment_date, reference)
            .await
    }

    pub async fn list_contributions(&self) -> LedgerResult<Vec<Contribution>> {
        self.workflow.contributions.list_all().await
    }

    pub async fn list_loans(&self, status: Option<LoanStatus>) -> LedgerResult<Vec<Loan>> {
        self.workflow.loans.list_all(status).await
    }

    pub async fn loan(&self, loan_id: Uuid) -> LedgerResult<LoanDetails> {
        self.workflow.loans.get(loan_id).await
    }

    pub async fn decide_loan(
        &self,
        loan_id: Uuid,
        approve: bool,
        notes: Option<&str>,
    ) -> LedgerResult<Loan> {
        self.workflow.loans.decide(loan_id, approve, notes).await
    }

    pub async fn record_loan_payment(&self, loan_id: Uuid, amount: i64) -> LedgerResult<Loan> {
        self.workflow.loans.record_payment(loan_id, amount).await
    }

    pub async fn unscheduled_loans(&self) -> LedgerResult<Vec<Loan>> {
        self.workflow.loans.find_unscheduled().await
    }

    pub async fn issue_fine(&self, user_id: Uuid, amount: i64, reason: &str) -> LedgerResult<Fine> {
        self.workflow.fines.issue(user_id, amount, reason).await
    }

    pub async fn list_fines(&self) -> LedgerResult<Vec<Fine>> {
        self.workflow.fines.list_all().await
    }

    pub async fn fine(&self, fine_id: Uuid) -> LedgerResult<FineDetails> {
        self.workflow.fines.get(fine_id).await
    }

    pub async fn pay_fine(&self, fine_id: Uuid, amount: i64) -> LedgerResult<Fine> {
        self.workflow.fines.pay(fine_id, amount).await
    }

    pub async fn cancel_fine(&self, fine_id: Uuid) -> LedgerResult<Fine> {
        self.workflow.fines.cancel(fine_id).await
    }

    pub async fn run_sweep(&self) -> LedgerResult<SweepReport> {
        let outcome = self.workflow.loans.detect_overdue().await?;
        Ok(overdue_monitor::report(&outcome))
    }
}

/// Member access, scoped to the caller's own records.
pub struct MemberDesk<'a> {
    workflow: &'a Workflow,
    profile: Profile,
}

impl MemberDesk<'_> {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub async fn update_profile(&self, full_name: &str, phone: Option<&str>) -> LedgerResult<Profile> {
        self.workflow
            .members
            .update_own_profile(self.profile.user_id, full_name, phone)
            .await
    }

    pub async fn progress(&self) -> LedgerResult<ContributionProgress> {
        self.workflow.contributions.progress(self.profile.user_id).await
    }

    pub async fn contributions(&self) -> LedgerResult<Vec<Contribution>> {
        self.workflow
            .contributions
            .list_for_member(self.profile.user_id)
            .await
    }

    /// Only approved members may borrow.
    pub async fn apply_for_loan(&self, amount: i64, purpose: &str) -> LedgerResult<Loan> {
        if !self.profile.is_approved {
            return Err(LedgerError::Forbidden(
                "Membership must be approved before applying for a loan".to_string(),
            ));
        }
        self.workflow
            .loans
            .apply(self.profile.user_id, amount, purpose)
            .await
    }

    pub async fn loans(&self) -> LedgerResult<Vec<Loan>> {
        self.workflow.loans.list_for_member(self.profile.user_id).await
    }

    pub async fn fines(&self) -> LedgerResult<Vec<Fine>> {
        self.workflow.fines.list_for_member(self.profile.user_id).await
    }
}
