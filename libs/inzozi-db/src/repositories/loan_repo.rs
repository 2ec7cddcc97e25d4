use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::missing_or_conflict;
use crate::models::loan::{
    InstallmentStatus, Loan, LoanApproval, LoanFilter, LoanInstallment, LoanRepayment,
    LoanStatus, NewInstallment, NewLoan, allocate_repayment,
};
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct LoanRepository {
    pool: PgPool,
}

impl LoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewLoan) -> StoreResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (id, user_id, amount, purpose, status, applied_at, interest_rate, installments_count)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.amount)
        .bind(&new.purpose)
        .bind(new.applied_at)
        .bind(new.interest_rate)
        .bind(new.installments_count)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create loan application")?;
        Ok(loan)
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch loan")?;
        Ok(loan)
    }

    pub async fn get_all(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::loan_status IS NULL OR status = $2)
            ORDER BY applied_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch loans")?;
        Ok(loans)
    }

    pub async fn get_installments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanInstallment>> {
        let installments = sqlx::query_as::<_, LoanInstallment>(
            "SELECT * FROM loan_installments WHERE loan_id = $1 ORDER BY installment_number",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch installment schedule")?;
        Ok(installments)
    }

    pub async fn get_repayments(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>> {
        let repayments = sqlx::query_as::<_, LoanRepayment>(
            "SELECT * FROM loan_repayments WHERE loan_id = $1 ORDER BY paid_date DESC",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch loan repayments")?;
        Ok(repayments)
    }

    pub async fn approve(
        &self,
        loan_id: Uuid,
        approval: &LoanApproval,
        schedule: &[NewInstallment],
    ) -> StoreResult<Loan> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin loan approval")?;

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'approved',
                approved_at = $2,
                due_date = $3,
                interest_rate = $4,
                total_with_interest = $5,
                installments_count = $6,
                admin_notes = $7,
                amount_paid = 0,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(approval.approved_at)
        .bind(approval.due_date)
        .bind(approval.interest_rate)
        .bind(approval.total_with_interest)
        .bind(approval.installments_count)
        .bind(approval.admin_notes.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to approve loan")?;

        let Some(loan) = loan else {
            return Err(
                missing_or_conflict(&mut tx, "loans", "loan", loan_id, "loan is not pending").await,
            );
        };

        if !schedule.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO loan_installments (id, loan_id, installment_number, amount, due_date, paid_amount, status) ",
            );
            builder.push_values(schedule, |mut row, installment| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(loan_id)
                    .push_bind(installment.installment_number)
                    .push_bind(installment.amount)
                    .push_bind(installment.due_date)
                    .push_bind(0_i64)
                    .push_bind(InstallmentStatus::Pending);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert installment schedule")?;
        }

        tx.commit().await.context("Failed to commit loan approval")?;
        Ok(loan)
    }

    pub async fn deny(&self, loan_id: Uuid, notes: Option<&str>) -> StoreResult<Loan> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'denied', admin_notes = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(notes)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to deny loan")?;

        match loan {
            Some(loan) => Ok(loan),
            None => Err(
                missing_or_conflict(&mut conn, "loans", "loan", loan_id, "loan is not pending").await,
            ),
        }
    }

    pub async fn record_payment(
        &self,
        loan_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Loan> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin loan repayment")?;

        let current = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock loan")?
            .ok_or(StoreError::NotFound {
                entity: "loan",
                id: loan_id,
            })?;

        let conflict = |reason: String| StoreError::Conflict {
            entity: "loan",
            id: loan_id,
            reason,
        };
        if !current.status.accepts_repayment() {
            return Err(conflict(format!(
                "loan is {} and does not accept repayments",
                current.status.as_str()
            )));
        }
        let Some(total) = current.total_with_interest else {
            return Err(conflict("loan has no repayment total".to_string()));
        };
        let amount_paid = current.amount_paid + amount;
        if amount_paid > total {
            return Err(conflict("repayment exceeds outstanding balance".to_string()));
        }
        let status = current.status.after_repayment(amount_paid, total);

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET amount_paid = $2, last_payment_date = $3, status = $4, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(amount_paid)
        .bind(paid_at)
        .bind(status)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to update loan balance")?;

        sqlx::query(
            "INSERT INTO loan_repayments (id, loan_id, amount, paid_date, status) VALUES ($1, $2, $3, $4, 'paid')",
        )
        .bind(Uuid::new_v4())
        .bind(loan_id)
        .bind(amount)
        .bind(paid_at)
        .execute(&mut *tx)
        .await
        .context("Failed to log loan repayment")?;

        let installments = sqlx::query_as::<_, LoanInstallment>(
            "SELECT * FROM loan_installments WHERE loan_id = $1 ORDER BY installment_number FOR UPDATE",
        )
        .bind(loan_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to lock installment schedule")?;

        for allocation in allocate_repayment(&installments, amount, paid_at) {
            sqlx::query(
                "UPDATE loan_installments SET paid_amount = $2, paid_date = $3, status = $4 WHERE id = $1",
            )
            .bind(allocation.id)
            .bind(allocation.paid_amount)
            .bind(allocation.paid_date)
            .bind(allocation.status)
            .execute(&mut *tx)
            .await
            .context("Failed to allocate repayment to installment")?;
        }

        tx.commit().await.context("Failed to commit loan repayment")?;
        Ok(loan)
    }

    pub async fn mark_defaulted(
        &self,
        loan_id: Uuid,
        as_of: DateTime<Utc>,
        notes: &str,
    ) -> StoreResult<Loan> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin default transition")?;

        let current = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock loan")?
            .ok_or(StoreError::NotFound {
                entity: "loan",
                id: loan_id,
            })?;

        let conflict = |reason: &str| StoreError::Conflict {
            entity: "loan",
            id: loan_id,
            reason: reason.to_string(),
        };
        if current.status != LoanStatus::Approved {
            return Err(conflict("loan is not approved"));
        }

        // Read under the loan lock so a repayment committed after the sweep
        // looked at the schedule is visible here.
        let installments = sqlx::query_as::<_, LoanInstallment>(
            "SELECT * FROM loan_installments WHERE loan_id = $1 ORDER BY installment_number FOR UPDATE",
        )
        .bind(loan_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to lock installment schedule")?;

        if !installments.iter().any(|i| i.is_overdue_at(as_of)) {
            return Err(conflict("loan has no overdue installment"));
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'defaulted', admin_notes = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark loan defaulted")?;

        sqlx::query(
            r#"
            UPDATE loan_installments
            SET status = 'overdue'
            WHERE loan_id = $1 AND status = 'pending' AND paid_amount < amount AND due_date < $2
            "#,
        )
        .bind(loan_id)
        .bind(as_of)
        .execute(&mut *tx)
        .await
        .context("Failed to flag overdue installments")?;

        sqlx::query(
            "UPDATE profiles SET is_approved = FALSE, updated_at = CURRENT_TIMESTAMP WHERE user_id = $1",
        )
        .bind(loan.user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to deactivate borrower")?;

        tx.commit().await.context("Failed to commit default transition")?;
        Ok(loan)
    }
}
