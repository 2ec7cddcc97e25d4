use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::role::{AppRole, RoleAssignment};
use crate::store::StoreResult;

#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn assign(&self, user_id: Uuid, role: AppRole) -> StoreResult<RoleAssignment> {
        let assignment = sqlx::query_as::<_, RoleAssignment>(
            r#"
            INSERT INTO user_roles (id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role) DO UPDATE SET role = EXCLUDED.role
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .context("Failed to assign role")?;
        Ok(assignment)
    }

    pub async fn get_roles(&self, user_id: Uuid) -> StoreResult<Vec<AppRole>> {
        let roles = sqlx::query_scalar::<_, AppRole>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch roles")?;
        Ok(roles)
    }
}
