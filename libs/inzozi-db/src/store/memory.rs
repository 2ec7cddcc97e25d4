use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{LedgerStore, StoreError, StoreResult};
use crate::models::contribution::{Contribution, NewContribution};
use crate::models::fine::{Fine, FinePayment, FineStatus, NewFine};
use crate::models::loan::{
    InstallmentStatus, Loan, LoanApproval, LoanFilter, LoanInstallment, LoanRepayment,
    LoanStatus, NewInstallment, NewLoan, allocate_repayment,
};
use crate::models::profile::{NewProfile, Profile};
use crate::models::role::{AppRole, RoleAssignment};

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    roles: Vec<RoleAssignment>,
    contributions: Vec<Contribution>,
    loans: Vec<Loan>,
    installments: Vec<LoanInstallment>,
    repayments: Vec<LoanRepayment>,
    fines: Vec<Fine>,
    fine_payments: Vec<FinePayment>,
}

/// Process-local [`LedgerStore`].
///
/// A single mutex serialises every operation, which gives the same
/// all-or-nothing behaviour the PostgreSQL store gets from transactions.
/// Used by the test suites and by `serve --in-memory`.
#[derive(Default)]
pub struct MemoryLedgerStore {
    tables: Mutex<Tables>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("in-memory ledger lock poisoned")))
    }
}

fn conflict(entity: &'static str, id: Uuid, reason: &str) -> StoreError {
    StoreError::Conflict {
        entity,
        id,
        reason: reason.to_string(),
    }
}

impl Tables {
    fn profile_mut(&mut self, user_id: Uuid) -> StoreResult<&mut Profile> {
        self.profiles
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(StoreError::NotFound {
                entity: "profile",
                id: user_id,
            })
    }

    fn loan_mut(&mut self, id: Uuid) -> StoreResult<&mut Loan> {
        self.loans
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(StoreError::NotFound { entity: "loan", id })
    }

    fn fine_mut(&mut self, id: Uuid) -> StoreResult<&mut Fine> {
        self.fines
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound { entity: "fine", id })
    }

    fn schedule(&self, loan_id: Uuid) -> Vec<LoanInstallment> {
        let mut schedule: Vec<LoanInstallment> = self
            .installments
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect();
        schedule.sort_by_key(|i| i.installment_number);
        schedule
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_profile(&self, new: NewProfile) -> StoreResult<Profile> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables.profiles.iter().find(|p| p.user_id == new.user_id) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            full_name: new.full_name,
            phone: new.phone,
            is_approved: new.is_approved,
            created_at: now,
            updated_at: now,
        };
        tables.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        let tables = self.tables()?;
        Ok(tables.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let tables = self.tables()?;
        let mut profiles = tables.profiles.clone();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    async fn update_profile_details(
        &self,
        user_id: Uuid,
        full_name: &str,
        phone: Option<&str>,
    ) -> StoreResult<Profile> {
        let mut tables = self.tables()?;
        let profile = tables.profile_mut(user_id)?;
        profile.full_name = full_name.to_string();
        profile.phone = phone.map(str::to_string);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn set_profile_approved(&self, user_id: Uuid, approved: bool) -> StoreResult<Profile> {
        let mut tables = self.tables()?;
        let profile = tables.profile_mut(user_id)?;
        profile.is_approved = approved;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn insert_role(&self, user_id: Uuid, role: AppRole) -> StoreResult<RoleAssignment> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables
            .roles
            .iter()
            .find(|r| r.user_id == user_id && r.role == role)
        {
            return Ok(existing.clone());
        }
        let assignment = RoleAssignment {
            id: Uuid::new_v4(),
            user_id,
            role,
            created_at: Utc::now(),
        };
        tables.roles.push(assignment.clone());
        Ok(assignment)
    }

    async fn list_roles(&self, user_id: Uuid) -> StoreResult<Vec<AppRole>> {
        let tables = self.tables()?;
        Ok(tables
            .roles
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.role)
            .collect())
    }

    async fn insert_contribution(&self, new: NewContribution) -> StoreResult<Contribution> {
        let mut tables = self.tables()?;
        let contribution = Contribution {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            amount: new.amount,
            payment_date: new.payment_date,
            status: new.status,
            reference_number: new.reference_number,
            created_at: Utc::now(),
        };
        tables.contributions.push(contribution.clone());
        Ok(contribution)
    }

    async fn list_contributions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Contribution>> {
        let tables = self.tables()?;
        let mut contributions: Vec<Contribution> = tables
            .contributions
            .iter()
            .filter(|c| user_id.is_none_or(|id| c.user_id == id))
            .cloned()
            .collect();
        contributions.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        Ok(contributions)
    }

    async fn insert_loan(&self, new: NewLoan) -> StoreResult<Loan> {
        let mut tables = self.tables()?;
        let loan = Loan {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            amount: new.amount,
            purpose: new.purpose,
            status: LoanStatus::Pending,
            applied_at: new.applied_at,
            approved_at: None,
            admin_notes: None,
            due_date: None,
            interest_rate: new.interest_rate,
            total_with_interest: None,
            amount_paid: 0,
            last_payment_date: None,
            installments_count: new.installments_count,
        };
        tables.loans.push(loan.clone());
        Ok(loan)
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let tables = self.tables()?;
        Ok(tables.loans.iter().find(|l| l.id == id).cloned())
    }

    async fn list_loans(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>> {
        let tables = self.tables()?;
        let mut loans: Vec<Loan> = tables
            .loans
            .iter()
            .filter(|l| filter.user_id.is_none_or(|id| l.user_id == id))
            .filter(|l| filter.status.is_none_or(|s| l.status == s))
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(loans)
    }

    async fn list_installments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanInstallment>> {
        let tables = self.tables()?;
        Ok(tables.schedule(loan_id))
    }

    async fn list_repayments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>> {
        let tables = self.tables()?;
        let mut repayments: Vec<LoanRepayment> = tables
            .repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect();
        repayments.sort_by(|a, b| b.paid_date.cmp(&a.paid_date));
        Ok(repayments)
    }

    async fn approve_loan(
        &self,
        loan_id: Uuid,
        approval: &LoanApproval,
        schedule: &[NewInstallment],
    ) -> StoreResult<Loan> {
        let mut tables = self.tables()?;
        let loan = tables.loan_mut(loan_id)?;
        if loan.status != LoanStatus::Pending {
            return Err(conflict("loan", loan_id, "loan is not pending"));
        }
        loan.status = LoanStatus::Approved;
        loan.approved_at = Some(approval.approved_at);
        loan.due_date = Some(approval.due_date);
        loan.interest_rate = approval.interest_rate;
        loan.total_with_interest = Some(approval.total_with_interest);
        loan.installments_count = approval.installments_count;
        loan.admin_notes = approval.admin_notes.clone();
        loan.amount_paid = 0;
        let approved = loan.clone();

        tables
            .installments
            .extend(schedule.iter().map(|installment| LoanInstallment {
                id: Uuid::new_v4(),
                loan_id,
                installment_number: installment.installment_number,
                amount: installment.amount,
                due_date: installment.due_date,
                paid_amount: 0,
                paid_date: None,
                status: InstallmentStatus::Pending,
                notes: None,
            }));
        Ok(approved)
    }

    async fn deny_loan(&self, loan_id: Uuid, notes: Option<&str>) -> StoreResult<Loan> {
        let mut tables = self.tables()?;
        let loan = tables.loan_mut(loan_id)?;
        if loan.status != LoanStatus::Pending {
            return Err(conflict("loan", loan_id, "loan is not pending"));
        }
        loan.status = LoanStatus::Denied;
        loan.admin_notes = notes.map(str::to_string);
        Ok(loan.clone())
    }

    async fn record_loan_payment(
        &self,
        loan_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Loan> {
        let mut tables = self.tables()?;
        let loan = tables.loan_mut(loan_id)?;
        if !loan.status.accepts_repayment() {
            return Err(conflict(
                "loan",
                loan_id,
                "loan does not accept repayments",
            ));
        }
        let Some(total) = loan.total_with_interest else {
            return Err(conflict("loan", loan_id, "loan has no repayment total"));
        };
        let amount_paid = loan.amount_paid + amount;
        if amount_paid > total {
            return Err(conflict(
                "loan",
                loan_id,
                "repayment exceeds outstanding balance",
            ));
        }
        loan.amount_paid = amount_paid;
        loan.last_payment_date = Some(paid_at);
        loan.status = loan.status.after_repayment(amount_paid, total);
        let updated = loan.clone();

        tables.repayments.push(LoanRepayment {
            id: Uuid::new_v4(),
            loan_id,
            amount,
            paid_date: paid_at,
            status: InstallmentStatus::Paid,
        });

        let schedule = tables.schedule(loan_id);
        for allocation in allocate_repayment(&schedule, amount, paid_at) {
            if let Some(installment) = tables
                .installments
                .iter_mut()
                .find(|i| i.id == allocation.id)
            {
                installment.paid_amount = allocation.paid_amount;
                installment.paid_date = allocation.paid_date;
                installment.status = allocation.status;
            }
        }
        Ok(updated)
    }

    async fn mark_loan_defaulted(
        &self,
        loan_id: Uuid,
        as_of: DateTime<Utc>,
        notes: &str,
    ) -> StoreResult<Loan> {
        let mut tables = self.tables()?;
        let has_overdue = tables
            .installments
            .iter()
            .any(|i| i.loan_id == loan_id && i.is_overdue_at(as_of));

        let loan = tables.loan_mut(loan_id)?;
        if loan.status != LoanStatus::Approved || !has_overdue {
            return Err(conflict(
                "loan",
                loan_id,
                "loan is not approved or has no overdue installment",
            ));
        }
        loan.status = LoanStatus::Defaulted;
        loan.admin_notes = Some(notes.to_string());
        let defaulted = loan.clone();

        for installment in tables
            .installments
            .iter_mut()
            .filter(|i| i.loan_id == loan_id)
        {
            if installment.status == InstallmentStatus::Pending && installment.is_overdue_at(as_of) {
                installment.status = InstallmentStatus::Overdue;
            }
        }
        if let Ok(profile) = tables.profile_mut(defaulted.user_id) {
            profile.is_approved = false;
            profile.updated_at = Utc::now();
        }
        Ok(defaulted)
    }

    async fn insert_fine(&self, new: NewFine) -> StoreResult<Fine> {
        let mut tables = self.tables()?;
        let fine = Fine {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            amount: new.amount,
            reason: new.reason,
            status: FineStatus::Pending,
            issued_at: new.issued_at,
            paid_at: None,
            amount_paid: 0,
        };
        tables.fines.push(fine.clone());
        Ok(fine)
    }

    async fn get_fine(&self, id: Uuid) -> StoreResult<Option<Fine>> {
        let tables = self.tables()?;
        Ok(tables.fines.iter().find(|f| f.id == id).cloned())
    }

    async fn list_fines(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Fine>> {
        let tables = self.tables()?;
        let mut fines: Vec<Fine> = tables
            .fines
            .iter()
            .filter(|f| user_id.is_none_or(|id| f.user_id == id))
            .cloned()
            .collect();
        fines.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(fines)
    }

    async fn list_fine_payments(&self, fine_id: Uuid) -> StoreResult<Vec<FinePayment>> {
        let tables = self.tables()?;
        let mut payments: Vec<FinePayment> = tables
            .fine_payments
            .iter()
            .filter(|p| p.fine_id == fine_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(payments)
    }

    async fn record_fine_payment(
        &self,
        fine_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Fine> {
        let mut tables = self.tables()?;
        let fine = tables.fine_mut(fine_id)?;
        if fine.status != FineStatus::Pending || fine.amount_paid + amount > fine.amount {
            return Err(conflict(
                "fine",
                fine_id,
                "fine is not pending or payment exceeds the remaining balance",
            ));
        }
        fine.amount_paid += amount;
        fine.status = fine.status.after_payment(fine.amount_paid, fine.amount);
        if fine.status == FineStatus::Paid {
            fine.paid_at = Some(paid_at);
        }
        let updated = fine.clone();

        tables.fine_payments.push(FinePayment {
            id: Uuid::new_v4(),
            fine_id,
            amount,
            paid_at,
        });
        Ok(updated)
    }

    async fn cancel_fine(&self, fine_id: Uuid) -> StoreResult<Fine> {
        let mut tables = self.tables()?;
        let fine = tables.fine_mut(fine_id)?;
        if fine.status != FineStatus::Pending {
            return Err(conflict("fine", fine_id, "fine is not pending"));
        }
        fine.status = FineStatus::Cancelled;
        Ok(fine.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn approved_loan(store: &MemoryLedgerStore, due_in_days: i64) -> Loan {
        let user_id = Uuid::new_v4();
        store
            .insert_profile(NewProfile {
                user_id,
                full_name: "Borrower".to_string(),
                phone: None,
                is_approved: true,
            })
            .await
            .unwrap();
        let loan = store
            .insert_loan(NewLoan {
                user_id,
                amount: 1_000,
                purpose: "stock".to_string(),
                applied_at: Utc::now(),
                interest_rate: 0.0,
                installments_count: 1,
            })
            .await
            .unwrap();
        let now = Utc::now();
        store
            .approve_loan(
                loan.id,
                &LoanApproval {
                    approved_at: now,
                    due_date: now + Duration::days(due_in_days),
                    interest_rate: 0.0,
                    total_with_interest: 1_000,
                    installments_count: 1,
                    admin_notes: None,
                },
                &[NewInstallment {
                    installment_number: 1,
                    amount: 1_000,
                    due_date: now + Duration::days(due_in_days),
                }],
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn default_guard_rejects_loan_settled_after_read() {
        let store = MemoryLedgerStore::new();
        let loan = approved_loan(&store, -1).await;

        store
            .record_loan_payment(loan.id, 1_000, Utc::now())
            .await
            .unwrap();
        let result = store
            .mark_loan_defaulted(loan.id, Utc::now(), "late")
            .await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LoanStatus::Paid);
        assert_eq!(stored.amount_paid, 1_000);
    }

    #[tokio::test]
    async fn default_revokes_borrower_approval() {
        let store = MemoryLedgerStore::new();
        let loan = approved_loan(&store, -1).await;

        let defaulted = store
            .mark_loan_defaulted(loan.id, Utc::now(), "late")
            .await
            .unwrap();

        assert_eq!(defaulted.status, LoanStatus::Defaulted);
        let profile = store.get_profile(loan.user_id).await.unwrap().unwrap();
        assert!(!profile.is_approved);
        let schedule = store.list_installments(loan.id).await.unwrap();
        assert_eq!(schedule[0].status, InstallmentStatus::Overdue);
    }

    #[tokio::test]
    async fn second_approval_conflicts() {
        let store = MemoryLedgerStore::new();
        let loan = approved_loan(&store, 30).await;

        let result = store.deny_loan(loan.id, Some("late change of heart")).await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn unknown_fine_is_not_found() {
        let store = MemoryLedgerStore::new();
        let result = store.cancel_fine(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "fine", .. })));
    }
}
