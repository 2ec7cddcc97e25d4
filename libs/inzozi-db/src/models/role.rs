use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "app_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: AppRole,
    pub created_at: DateTime<Utc>,
}
