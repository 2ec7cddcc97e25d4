use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Loan lifecycle.
///
/// `pending -> approved | denied`, `approved -> paid | defaulted`,
/// `defaulted -> paid` once the arrears are cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Denied,
    Defaulted,
    Paid,
}

impl LoanStatus {
    /// Repayments are only taken on loans that have been disbursed and not settled.
    pub fn accepts_repayment(self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Defaulted)
    }

    pub fn after_repayment(self, amount_paid: i64, total_with_interest: i64) -> LoanStatus {
        if amount_paid >= total_with_interest {
            LoanStatus::Paid
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Denied => "denied",
            LoanStatus::Defaulted => "defaulted",
            LoanStatus::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "installment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub purpose: String,
    pub status: LoanStatus,
    pub applied_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub interest_rate: f64,
    pub total_with_interest: Option<i64>,
    pub amount_paid: i64,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub installments_count: i32,
}

impl Loan {
    /// Balance still owed. Zero until the loan is approved.
    pub fn outstanding(&self) -> i64 {
        self.total_with_interest
            .map(|total| (total - self.amount_paid).max(0))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: Uuid,
    pub amount: i64,
    pub purpose: String,
    pub applied_at: DateTime<Utc>,
    pub interest_rate: f64,
    pub installments_count: i32,
}

/// Fields written on a pending loan when it is approved.
#[derive(Debug, Clone)]
pub struct LoanApproval {
    pub approved_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub interest_rate: f64,
    pub total_with_interest: i64,
    pub installments_count: i32,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoanFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoanInstallment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub installment_number: i32,
    pub amount: i64,
    pub due_date: DateTime<Utc>,
    pub paid_amount: i64,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: InstallmentStatus,
    pub notes: Option<String>,
}

impl LoanInstallment {
    pub fn outstanding(&self) -> i64 {
        (self.amount - self.paid_amount).max(0)
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status != InstallmentStatus::Paid && self.outstanding() > 0 && self.due_date < now
    }
}

#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub installment_number: i32,
    pub amount: i64,
    pub due_date: DateTime<Utc>,
}

/// Append-only record of money received against a loan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoanRepayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: i64,
    pub paid_date: DateTime<Utc>,
    pub status: InstallmentStatus,
}

/// New state of one installment after a repayment has been allocated to it.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentAllocation {
    pub id: Uuid,
    pub paid_amount: i64,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: InstallmentStatus,
}

/// Spreads `amount` over the unpaid installments, earliest installment first.
///
/// Only touched installments are returned. Money left over after every
/// installment is settled is not allocated anywhere; callers reject
/// overpayment before getting here.
pub fn allocate_repayment(
    installments: &[LoanInstallment],
    amount: i64,
    paid_at: DateTime<Utc>,
) -> Vec<InstallmentAllocation> {
    let mut open: Vec<&LoanInstallment> = installments
        .iter()
        .filter(|i| i.outstanding() > 0)
        .collect();
    open.sort_by_key(|i| i.installment_number);

    let mut left = amount;
    let mut allocations = Vec::new();
    for installment in open {
        if left <= 0 {
            break;
        }
        let applied = left.min(installment.outstanding());
        left -= applied;

        let paid_amount = installment.paid_amount + applied;
        let settled = paid_amount >= installment.amount;
        allocations.push(InstallmentAllocation {
            id: installment.id,
            paid_amount,
            paid_date: if settled {
                Some(paid_at)
            } else {
                installment.paid_date
            },
            status: if settled {
                InstallmentStatus::Paid
            } else {
                installment.status
            },
        });
    }
    allocations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn installment(number: i32, amount: i64, paid: i64, due_in_days: i64) -> LoanInstallment {
        LoanInstallment {
            id: Uuid::new_v4(),
            loan_id: Uuid::nil(),
            installment_number: number,
            amount,
            due_date: Utc::now() + Duration::days(due_in_days),
            paid_amount: paid,
            paid_date: None,
            status: InstallmentStatus::Pending,
            notes: None,
        }
    }

    #[test]
    fn allocation_fills_earliest_installments_first() {
        let schedule = vec![
            installment(2, 35_000, 0, 60),
            installment(1, 35_000, 0, 30),
            installment(3, 35_000, 0, 90),
        ];
        let now = Utc::now();

        let allocations = allocate_repayment(&schedule, 50_000, now);

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].id, schedule[1].id);
        assert_eq!(allocations[0].paid_amount, 35_000);
        assert_eq!(allocations[0].status, InstallmentStatus::Paid);
        assert_eq!(allocations[0].paid_date, Some(now));
        assert_eq!(allocations[1].id, schedule[0].id);
        assert_eq!(allocations[1].paid_amount, 15_000);
        assert_eq!(allocations[1].status, InstallmentStatus::Pending);
        assert_eq!(allocations[1].paid_date, None);
    }

    #[test]
    fn allocation_skips_settled_installments() {
        let mut first = installment(1, 10_000, 10_000, -5);
        first.status = InstallmentStatus::Paid;
        let second = installment(2, 10_000, 4_000, 25);

        let allocations = allocate_repayment(&[first, second.clone()], 6_000, Utc::now());

        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].id, second.id);
        assert_eq!(allocations[0].paid_amount, 10_000);
        assert_eq!(allocations[0].status, InstallmentStatus::Paid);
    }

    #[test]
    fn overdue_installment_stays_overdue_until_settled() {
        let mut late = installment(1, 10_000, 0, -3);
        late.status = InstallmentStatus::Overdue;

        let allocations = allocate_repayment(&[late], 2_500, Utc::now());

        assert_eq!(allocations[0].status, InstallmentStatus::Overdue);
        assert_eq!(allocations[0].paid_amount, 2_500);
    }

    #[test]
    fn overdue_requires_outstanding_balance_past_due() {
        let now = Utc::now();
        assert!(installment(1, 100, 0, -1).is_overdue_at(now));
        assert!(!installment(1, 100, 0, 1).is_overdue_at(now));
        assert!(!installment(1, 100, 100, -1).is_overdue_at(now));
    }

    #[test]
    fn repayment_completes_loan_at_total() {
        assert_eq!(
            LoanStatus::Approved.after_repayment(105_000, 105_000),
            LoanStatus::Paid
        );
        assert_eq!(
            LoanStatus::Defaulted.after_repayment(50_000, 105_000),
            LoanStatus::Defaulted
        );
        assert!(!LoanStatus::Paid.accepts_repayment());
        assert!(!LoanStatus::Pending.accepts_repayment());
    }
}
