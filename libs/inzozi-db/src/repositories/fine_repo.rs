use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::missing_or_conflict;
use crate::models::fine::{Fine, FinePayment, NewFine};
use crate::store::StoreResult;

#[derive(Debug, Clone)]
pub struct FineRepository {
    pool: PgPool,
}

impl FineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewFine) -> StoreResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            INSERT INTO fines (id, user_id, amount, reason, status, issued_at, amount_paid)
            VALUES ($1, $2, $3, $4, 'pending', $5, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.amount)
        .bind(&new.reason)
        .bind(new.issued_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to issue fine")?;
        Ok(fine)
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Fine>> {
        let fine = sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch fine")?;
        Ok(fine)
    }

    pub async fn get_all(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Fine>> {
        let fines = sqlx::query_as::<_, Fine>(
            r#"
            SELECT * FROM fines
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY issued_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch fines")?;
        Ok(fines)
    }

    pub async fn get_payments(&self, fine_id: Uuid) -> StoreResult<Vec<FinePayment>> {
        let payments = sqlx::query_as::<_, FinePayment>(
            "SELECT * FROM fine_payments WHERE fine_id = $1 ORDER BY paid_at DESC",
        )
        .bind(fine_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch fine payments")?;
        Ok(payments)
    }

    pub async fn record_payment(
        &self,
        fine_id: Uuid,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Fine> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin fine payment")?;

        let fine = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines
            SET amount_paid = amount_paid + $2,
                status = CASE WHEN amount_paid + $2 >= amount THEN 'paid'::fine_status ELSE status END,
                paid_at = CASE WHEN amount_paid + $2 >= amount THEN $3::timestamptz ELSE paid_at END
            WHERE id = $1 AND status = 'pending' AND amount_paid + $2 <= amount
            RETURNING *
            "#,
        )
        .bind(fine_id)
        .bind(amount)
        .bind(paid_at)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to apply fine payment")?;

        let Some(fine) = fine else {
            return Err(missing_or_conflict(
                &mut tx,
                "fines",
                "fine",
                fine_id,
                "fine is not pending or payment exceeds the remaining balance",
            )
            .await);
        };

        sqlx::query("INSERT INTO fine_payments (id, fine_id, amount, paid_at) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(fine_id)
            .bind(amount)
            .bind(paid_at)
            .execute(&mut *tx)
            .await
            .context("Failed to log fine payment")?;

        tx.commit().await.context("Failed to commit fine payment")?;
        Ok(fine)
    }

    pub async fn cancel(&self, fine_id: Uuid) -> StoreResult<Fine> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;

        let fine = sqlx::query_as::<_, Fine>(
            "UPDATE fines SET status = 'cancelled' WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(fine_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to cancel fine")?;

        match fine {
            Some(fine) => Ok(fine),
            None => Err(
                missing_or_conflict(&mut conn, "fines", "fine", fine_id, "fine is not pending").await,
            ),
        }
    }
}
