use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use inzozi_db::models::loan::{
    Loan, LoanApproval, LoanFilter, LoanInstallment, LoanRepayment, LoanStatus, NewInstallment,
    NewLoan,
};
use inzozi_db::{LedgerStore, StoreError};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LoanTerms;
use crate::error::{LedgerError, LedgerResult};

/// A loan with its schedule and repayment log.
#[derive(Debug, Clone, Serialize)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub outstanding: i64,
    pub installments: Vec<LoanInstallment>,
    pub repayments: Vec<LoanRepayment>,
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub as_of: DateTime<Utc>,
    pub checked: usize,
    pub defaulted: Vec<Loan>,
}

/// `amount * (1 + rate)` rounded to whole currency units, or `None` when the
/// result does not fit in an `i64`.
pub fn total_with_interest(amount: i64, rate: f64) -> Option<i64> {
    let total = (amount as f64 * (1.0 + rate)).round();
    // i64::MAX is not representable as f64; the cast rounds it up to 2^63.
    if total.is_finite() && total >= i64::MIN as f64 && total < i64::MAX as f64 {
        Some(total as i64)
    } else {
        None
    }
}

/// Splits `total` into `count` installments spread evenly over `term_days`.
///
/// Every installment gets `total / count`; the remainder goes on the last one
/// so the schedule always sums to `total`. Installment `k` falls due
/// `k * term / count` after approval. Returns `None` if a due date or an
/// installment number falls outside the representable range.
pub fn build_schedule(
    total: i64,
    count: u32,
    term_days: u32,
    approved_at: DateTime<Utc>,
) -> Option<Vec<NewInstallment>> {
    let n = i64::from(count.max(1));
    let base = total / n;
    let remainder = total - base * n;
    let term_secs = i64::from(term_days).checked_mul(24 * 60 * 60)?;

    (1..=n)
        .map(|k| {
            let offset = Duration::try_seconds(term_secs.checked_mul(k)? / n)?;
            Some(NewInstallment {
                installment_number: i32::try_from(k).ok()?,
                amount: if k == n { base + remainder } else { base },
                due_date: approved_at.checked_add_signed(offset)?,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn LedgerStore>,
    terms: LoanTerms,
}

impl LoanService {
    pub fn new(store: Arc<dyn LedgerStore>, terms: LoanTerms) -> Self {
        Self { store, terms }
    }

    pub async fn apply(&self, member_id: Uuid, amount: i64, purpose: &str) -> LedgerResult<Loan> {
        if amount <= 0 {
            return Err(LedgerError::validation("Loan amount must be positive"));
        }
        let purpose = purpose.trim();
        if purpose.is_empty() {
            return Err(LedgerError::validation("Loan purpose is required"));
        }
        if total_with_interest(amount, self.terms.interest_rate).is_none() {
            return Err(LedgerError::validation(
                "Loan amount is too large to repay with interest",
            ));
        }
        let installments_count = self.installments_count()?;

        let loan = self
            .store
            .insert_loan(NewLoan {
                user_id: member_id,
                amount,
                purpose: purpose.to_string(),
                applied_at: Utc::now(),
                interest_rate: self.terms.interest_rate,
                installments_count,
            })
            .await?;

        info!(loan_id = %loan.id, user_id = %member_id, amount, "Loan application received");
        Ok(loan)
    }

    /// Approves or denies a pending loan. Approval writes the repayment terms
    /// and the installment schedule together.
    pub async fn decide(
        &self,
        loan_id: Uuid,
        approve: bool,
        notes: Option<&str>,
    ) -> LedgerResult<Loan> {
        let loan = self.require(loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(LedgerError::invalid_state(format!(
                "Loan {} is {} and can no longer be decided",
                loan_id,
                loan.status.as_str()
            )));
        }
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        if !approve {
            let denied = self.store.deny_loan(loan_id, notes).await?;
            info!(loan_id = %loan_id, "Loan denied");
            return Ok(denied);
        }

        let approved_at = Utc::now();
        let total = total_with_interest(loan.amount, self.terms.interest_rate).ok_or_else(|| {
            LedgerError::validation(format!(
                "Loan {} is too large to repay with interest",
                loan_id
            ))
        })?;
        let out_of_range = || {
            LedgerError::validation(format!(
                "A {}-day term runs past the supported date range",
                self.terms.term_days
            ))
        };
        let schedule = build_schedule(
            total,
            self.terms.installments_count,
            self.terms.term_days,
            approved_at,
        )
        .ok_or_else(out_of_range)?;
        let due_date = Duration::try_days(i64::from(self.terms.term_days))
            .and_then(|term| approved_at.checked_add_signed(term))
            .ok_or_else(out_of_range)?;
        let approval = LoanApproval {
            approved_at,
            due_date,
            interest_rate: self.terms.interest_rate,
            total_with_interest: total,
            installments_count: self.installments_count()?,
            admin_notes: notes.map(str::to_string),
        };

        let approved = self.store.approve_loan(loan_id, &approval, &schedule).await?;

        let stored = match self.store.list_installments(loan_id).await {
            Ok(stored) => stored,
            Err(e) => {
                return Err(LedgerError::PartialWrite {
                    loan_id,
                    detail: format!("schedule could not be verified: {}", e),
                });
            }
        };
        let stored_total: i64 = stored.iter().map(|i| i.amount).sum();
        if stored.len() != schedule.len() || stored_total != total {
            return Err(LedgerError::PartialWrite {
                loan_id,
                detail: format!(
                    "{} of {} installments stored totalling {} of {}",
                    stored.len(),
                    schedule.len(),
                    stored_total,
                    total
                ),
            });
        }

        info!(
            loan_id = %loan_id,
            total_with_interest = total,
            installments = schedule.len(),
            "Loan approved"
        );
        Ok(approved)
    }

    pub async fn record_payment(&self, loan_id: Uuid, amount: i64) -> LedgerResult<Loan> {
        if amount <= 0 {
            return Err(LedgerError::validation("Payment amount must be positive"));
        }
        let loan = self.require(loan_id).await?;
        check_repayment(&loan, amount)?;

        match self
            .store
            .record_loan_payment(loan_id, amount, Utc::now())
            .await
        {
            Ok(updated) => {
                info!(
                    loan_id = %loan_id,
                    amount,
                    amount_paid = updated.amount_paid,
                    status = updated.status.as_str(),
                    "Loan payment recorded"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict { .. }) => {
                // Another write landed between our read and the guarded update.
                let current = self.require(loan_id).await?;
                check_repayment(&current, amount)?;
                Err(LedgerError::invalid_state(format!(
                    "Loan {} changed while the payment was being recorded",
                    loan_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Defaults every approved loan with an unpaid installment past due.
    pub async fn detect_overdue(&self) -> LedgerResult<SweepOutcome> {
        self.detect_overdue_at(Utc::now()).await
    }

    pub async fn detect_overdue_at(&self, as_of: DateTime<Utc>) -> LedgerResult<SweepOutcome> {
        let active = self
            .store
            .list_loans(LoanFilter {
                status: Some(LoanStatus::Approved),
                ..LoanFilter::default()
            })
            .await?;

        let mut outcome = SweepOutcome {
            as_of,
            checked: active.len(),
            defaulted: Vec::new(),
        };
        let notes = format!(
            "Loan defaulted due to overdue payments as of {}",
            as_of.format("%Y-%m-%d")
        );

        for loan in active {
            let installments = self.store.list_installments(loan.id).await?;
            if !installments.iter().any(|i| i.is_overdue_at(as_of)) {
                continue;
            }

            match self.store.mark_loan_defaulted(loan.id, as_of, &notes).await {
                Ok(defaulted) => {
                    warn!(
                        loan_id = %defaulted.id,
                        user_id = %defaulted.user_id,
                        outstanding = defaulted.outstanding(),
                        "Loan defaulted, member approval revoked"
                    );
                    outcome.defaulted.push(defaulted);
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(loan_id = %loan.id, "Loan settled or changed during sweep, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(outcome)
    }

    pub async fn get(&self, loan_id: Uuid) -> LedgerResult<LoanDetails> {
        let loan = self.require(loan_id).await?;
        let installments = self.store.list_installments(loan_id).await?;
        let repayments = self.store.list_repayments(loan_id).await?;
        Ok(LoanDetails {
            outstanding: loan.outstanding(),
            loan,
            installments,
            repayments,
        })
    }

    pub async fn list_for_member(&self, member_id: Uuid) -> LedgerResult<Vec<Loan>> {
        Ok(self
            .store
            .list_loans(LoanFilter {
                user_id: Some(member_id),
                ..LoanFilter::default()
            })
            .await?)
    }

    pub async fn list_all(&self, status: Option<LoanStatus>) -> LedgerResult<Vec<Loan>> {
        Ok(self
            .store
            .list_loans(LoanFilter {
                status,
                ..LoanFilter::default()
            })
            .await?)
    }

    /// Decided loans whose stored schedule does not match their installment count.
    pub async fn find_unscheduled(&self) -> LedgerResult<Vec<Loan>> {
        let mut unscheduled = Vec::new();
        for loan in self.store.list_loans(LoanFilter::default()).await? {
            if matches!(loan.status, LoanStatus::Pending | LoanStatus::Denied) {
                continue;
            }
            let stored = self.store.list_installments(loan.id).await?.len();
            if stored != loan.installments_count.max(0) as usize {
                unscheduled.push(loan);
            }
        }
        Ok(unscheduled)
    }

    async fn require(&self, loan_id: Uuid) -> LedgerResult<Loan> {
        self.store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Loan {} not found", loan_id)))
    }

    fn installments_count(&self) -> LedgerResult<i32> {
        i32::try_from(self.terms.installments_count).map_err(|_| {
            LedgerError::validation(format!(
                "{} installments is more than a schedule can hold",
                self.terms.installments_count
            ))
        })
    }
}

fn check_repayment(loan: &Loan, amount: i64) -> LedgerResult<()> {
    if !loan.status.accepts_repayment() {
        return Err(LedgerError::invalid_state(format!(
            "Loan {} is {} and does not accept payments",
            loan.id,
            loan.status.as_str()
        )));
    }
    let outstanding = loan.outstanding();
    if amount > outstanding {
        return Err(LedgerError::validation(format!(
            "Payment of {} exceeds the outstanding balance of {}",
            amount, outstanding
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inzozi_db::MemoryLedgerStore;
    use inzozi_db::models::loan::InstallmentStatus;
    use inzozi_db::models::profile::NewProfile;

    fn service() -> (LoanService, Arc<dyn LedgerStore>) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        (LoanService::new(store.clone(), LoanTerms::default()), store)
    }

    async fn member(store: &Arc<dyn LedgerStore>) -> Uuid {
        let user_id = Uuid::new_v4();
        store
            .insert_profile(NewProfile {
                user_id,
                full_name: "Aline Uwase".to_string(),
                phone: None,
                is_approved: true,
            })
            .await
            .unwrap();
        user_id
    }

    #[test]
    fn default_terms_give_three_equal_installments() {
        let now = Utc::now();
        let total = total_with_interest(100_000, 0.05).unwrap();
        let schedule = build_schedule(total, 3, 90, now).unwrap();

        assert_eq!(total, 105_000);
        assert_eq!(schedule.len(), 3);
        assert!(schedule.iter().all(|i| i.amount == 35_000));
        assert_eq!(schedule[0].due_date, now + Duration::days(30));
        assert_eq!(schedule[1].due_date, now + Duration::days(60));
        assert_eq!(schedule[2].due_date, now + Duration::days(90));
    }

    #[test]
    fn remainder_lands_on_last_installment() {
        let schedule = build_schedule(100_001, 3, 90, Utc::now()).unwrap();
        let amounts: Vec<i64> = schedule.iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![33_333, 33_333, 33_335]);
        assert_eq!(amounts.iter().sum::<i64>(), 100_001);
    }

    #[test]
    fn totals_that_overflow_are_refused() {
        assert_eq!(total_with_interest(i64::MAX, 0.05), None);
        assert_eq!(total_with_interest(i64::MAX / 2, 1.0), None);
        assert_eq!(total_with_interest(1_000_000_000_000, 0.05), Some(1_050_000_000_000));
    }

    #[test]
    fn schedule_past_the_calendar_is_refused() {
        assert!(build_schedule(105_000, 3, u32::MAX, Utc::now()).is_none());
        assert!(build_schedule(105_000, 3, 4_000_000_000, Utc::now()).is_none());
        assert!(build_schedule(105_000, 360, 3650, Utc::now()).is_some());
    }

    #[tokio::test]
    async fn application_is_validated() {
        let (loans, store) = service();
        let user_id = member(&store).await;

        assert!(matches!(
            loans.apply(user_id, 0, "school fees").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            loans.apply(user_id, 10_000, "   ").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            loans.apply(user_id, i64::MAX, "everything").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(store.list_loans(LoanFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unschedulable_terms_leave_the_loan_pending() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let terms = LoanTerms {
            term_days: u32::MAX,
            ..LoanTerms::default()
        };
        let loans = LoanService::new(store.clone(), terms);
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 50_000, "roof sheets").await.unwrap();

        let result = loans.decide(loan.id, true, None).await;

        assert!(matches!(result, Err(LedgerError::Validation(_))));
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LoanStatus::Pending);
        assert!(store.list_installments(loan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_writes_terms_and_schedule() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 100_000, "sewing machine").await.unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);

        let approved = loans.decide(loan.id, true, Some("ok")).await.unwrap();

        assert_eq!(approved.status, LoanStatus::Approved);
        assert_eq!(approved.total_with_interest, Some(105_000));
        assert_eq!(approved.amount_paid, 0);
        assert_eq!(approved.installments_count, 3);
        let approved_at = approved.approved_at.unwrap();
        assert_eq!(approved.due_date, Some(approved_at + Duration::days(90)));

        let details = loans.get(loan.id).await.unwrap();
        assert_eq!(details.installments.len(), 3);
        assert!(details.installments.iter().all(|i| i.amount == 35_000));
        assert_eq!(
            details.installments[0].due_date,
            approved_at + Duration::days(30)
        );
        assert_eq!(details.outstanding, 105_000);
    }

    #[tokio::test]
    async fn deciding_twice_is_invalid_state() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 20_000, "seeds").await.unwrap();
        loans.decide(loan.id, false, Some("not now")).await.unwrap();

        let result = loans.decide(loan.id, true, None).await;

        assert!(matches!(result, Err(LedgerError::InvalidState(_))));
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LoanStatus::Denied);
        assert_eq!(stored.admin_notes.as_deref(), Some("not now"));
        assert!(store.list_installments(loan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_loan_is_not_found() {
        let (loans, _) = service();
        assert!(matches!(
            loans.decide(Uuid::new_v4(), true, None).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn overpayment_is_rejected_without_state_change() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 100_000, "roof").await.unwrap();
        loans.decide(loan.id, true, None).await.unwrap();

        let result = loans.record_payment(loan.id, 110_000).await;

        assert!(matches!(result, Err(LedgerError::Validation(_))));
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid, 0);
        assert!(stored.last_payment_date.is_none());
        assert!(store.list_repayments(loan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn payments_allocate_and_settle_the_loan() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 100_000, "goats").await.unwrap();
        loans.decide(loan.id, true, None).await.unwrap();

        let partial = loans.record_payment(loan.id, 50_000).await.unwrap();
        assert_eq!(partial.amount_paid, 50_000);
        assert_eq!(partial.status, LoanStatus::Approved);

        let details = loans.get(loan.id).await.unwrap();
        assert_eq!(details.installments[0].status, InstallmentStatus::Paid);
        assert_eq!(details.installments[1].paid_amount, 15_000);
        assert_eq!(details.installments[1].status, InstallmentStatus::Pending);

        let settled = loans.record_payment(loan.id, 55_000).await.unwrap();
        assert_eq!(settled.status, LoanStatus::Paid);
        assert_eq!(settled.outstanding(), 0);

        assert!(matches!(
            loans.record_payment(loan.id, 1).await,
            Err(LedgerError::InvalidState(_))
        ));
        let repayments = store.list_repayments(loan.id).await.unwrap();
        assert_eq!(repayments.iter().map(|r| r.amount).sum::<i64>(), 105_000);
    }

    #[tokio::test]
    async fn pending_loan_does_not_accept_payment() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 10_000, "bike").await.unwrap();

        assert!(matches!(
            loans.record_payment(loan.id, 1_000).await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn sweep_defaults_overdue_loans_once() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 30_000, "stall").await.unwrap();
        loans.decide(loan.id, true, None).await.unwrap();

        let before_due = loans.detect_overdue_at(Utc::now()).await.unwrap();
        assert_eq!(before_due.checked, 1);
        assert!(before_due.defaulted.is_empty());

        let later = Utc::now() + Duration::days(31);
        let outcome = loans.detect_overdue_at(later).await.unwrap();
        assert_eq!(outcome.defaulted.len(), 1);
        let defaulted = &outcome.defaulted[0];
        assert_eq!(defaulted.status, LoanStatus::Defaulted);
        assert!(
            defaulted
                .admin_notes
                .as_deref()
                .unwrap()
                .starts_with("Loan defaulted due to overdue payments as of")
        );
        let profile = store.get_profile(user_id).await.unwrap().unwrap();
        assert!(!profile.is_approved);

        let again = loans.detect_overdue_at(later).await.unwrap();
        assert_eq!(again.checked, 0);
        assert!(again.defaulted.is_empty());
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.admin_notes, defaulted.admin_notes);
    }

    #[tokio::test]
    async fn paid_installment_keeps_loan_current() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 30_000, "stall").await.unwrap();
        loans.decide(loan.id, true, None).await.unwrap();
        loans.record_payment(loan.id, 10_500).await.unwrap();

        let outcome = loans
            .detect_overdue_at(Utc::now() + Duration::days(31))
            .await
            .unwrap();

        assert!(outcome.defaulted.is_empty());
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LoanStatus::Approved);
    }

    #[tokio::test]
    async fn defaulted_loan_can_still_be_repaid() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 10_000, "tools").await.unwrap();
        loans.decide(loan.id, true, None).await.unwrap();
        loans
            .detect_overdue_at(Utc::now() + Duration::days(91))
            .await
            .unwrap();

        let partial = loans.record_payment(loan.id, 500).await.unwrap();
        assert_eq!(partial.status, LoanStatus::Defaulted);
        let settled = loans.record_payment(loan.id, 10_000).await.unwrap();
        assert_eq!(settled.status, LoanStatus::Paid);
    }

    #[tokio::test]
    async fn fully_scheduled_loans_need_no_reconciliation() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let approved = loans.apply(user_id, 10_000, "tools").await.unwrap();
        loans.decide(approved.id, true, None).await.unwrap();
        loans.apply(user_id, 5_000, "pending").await.unwrap();

        assert!(loans.find_unscheduled().await.unwrap().is_empty());
        assert_eq!(loans.list_for_member(user_id).await.unwrap().len(), 2);
        assert_eq!(
            loans.list_all(Some(LoanStatus::Pending)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn loan_approved_without_schedule_is_flagged() {
        let (loans, store) = service();
        let user_id = member(&store).await;
        let loan = loans.apply(user_id, 10_000, "tools").await.unwrap();
        let now = Utc::now();
        store
            .approve_loan(
                loan.id,
                &LoanApproval {
                    approved_at: now,
                    due_date: now + Duration::days(90),
                    interest_rate: 0.05,
                    total_with_interest: 10_500,
                    installments_count: 3,
                    admin_notes: None,
                },
                &[],
            )
            .await
            .unwrap();

        let unscheduled = loans.find_unscheduled().await.unwrap();
        assert_eq!(unscheduled.len(), 1);
        assert_eq!(unscheduled[0].id, loan.id);
    }
}
