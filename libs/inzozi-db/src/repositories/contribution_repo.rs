use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::contribution::{Contribution, NewContribution};
use crate::store::StoreResult;

#[derive(Debug, Clone)]
pub struct ContributionRepository {
    pool: PgPool,
}

impl ContributionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewContribution) -> StoreResult<Contribution> {
        let contribution = sqlx::query_as::<_, Contribution>(
            r#"
            INSERT INTO contributions (id, user_id, amount, payment_date, status, reference_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.payment_date)
        .bind(new.status)
        .bind(new.reference_number.as_deref())
        .fetch_one(&self.pool)
        .await
        .context("Failed to record contribution")?;
        Ok(contribution)
    }

    pub async fn get_all(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Contribution>> {
        let contributions = sqlx::query_as::<_, Contribution>(
            r#"
            SELECT * FROM contributions
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY payment_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch contributions")?;
        Ok(contributions)
    }
}
