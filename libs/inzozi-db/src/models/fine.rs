use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fine_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Pending,
    Paid,
    Cancelled,
}

impl FineStatus {
    pub fn after_payment(self, amount_paid: i64, amount: i64) -> FineStatus {
        if amount_paid >= amount {
            FineStatus::Paid
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Fine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub status: FineStatus,
    pub issued_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub amount_paid: i64,
}

impl Fine {
    pub fn remaining(&self) -> i64 {
        (self.amount - self.amount_paid).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewFine {
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinePayment {
    pub id: Uuid,
    pub fine_id: Uuid,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
}
