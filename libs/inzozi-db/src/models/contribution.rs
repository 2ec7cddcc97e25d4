use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "contribution_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    Completed,
    Failed,
}

/// A deposit credited toward a member's membership requirement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contribution {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub payment_date: DateTime<Utc>,
    pub status: ContributionStatus,
    pub reference_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContribution {
    pub user_id: Uuid,
    pub amount: i64,
    pub payment_date: DateTime<Utc>,
    pub status: ContributionStatus,
    pub reference_number: Option<String>,
}
