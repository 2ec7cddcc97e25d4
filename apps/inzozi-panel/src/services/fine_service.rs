use std::sync::Arc;

use chrono::Utc;
use inzozi_db::models::fine::{Fine, FinePayment, FineStatus, NewFine};
use inzozi_db::{LedgerStore, StoreError};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Serialize)]
pub struct FineDetails {
    #[serde(flatten)]
    pub fine: Fine,
    pub remaining: i64,
    pub payments: Vec<FinePayment>,
}

#[derive(Clone)]
pub struct FineService {
    store: Arc<dyn LedgerStore>,
}

impl FineService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn issue(&self, member_id: Uuid, amount: i64, reason: &str) -> LedgerResult<Fine> {
        if amount <= 0 {
            return Err(LedgerError::validation("Fine amount must be positive"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::validation("Fine reason is required"));
        }
        if self.store.get_profile(member_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("Member {} not found", member_id)));
        }

        let fine = self
            .store
            .insert_fine(NewFine {
                user_id: member_id,
                amount,
                reason: reason.to_string(),
                issued_at: Utc::now(),
            })
            .await?;

        info!(fine_id = %fine.id, user_id = %member_id, amount, "Fine issued");
        Ok(fine)
    }

    pub async fn pay(&self, fine_id: Uuid, amount: i64) -> LedgerResult<Fine> {
        if amount <= 0 {
            return Err(LedgerError::validation("Payment amount must be positive"));
        }
        let fine = self.require(fine_id).await?;
        check_payment(&fine, amount)?;

        match self.store.record_fine_payment(fine_id, amount, Utc::now()).await {
            Ok(updated) => {
                info!(
                    fine_id = %fine_id,
                    amount,
                    amount_paid = updated.amount_paid,
                    remaining = updated.remaining(),
                    "Fine payment recorded"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict { .. }) => {
                let current = self.require(fine_id).await?;
                check_payment(&current, amount)?;
                Err(LedgerError::invalid_state(format!(
                    "Fine {} changed while the payment was being recorded",
                    fine_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn cancel(&self, fine_id: Uuid) -> LedgerResult<Fine> {
        let fine = self.require(fine_id).await?;
        if fine.status != FineStatus::Pending {
            return Err(not_pending(&fine));
        }

        let cancelled = self.store.cancel_fine(fine_id).await?;
        info!(fine_id = %fine_id, "Fine cancelled");
        Ok(cancelled)
    }

    /// Payments against a fine, most recent first.
    pub async fn history(&self, fine_id: Uuid) -> LedgerResult<Vec<FinePayment>> {
        self.require(fine_id).await?;
        Ok(self.store.list_fine_payments(fine_id).await?)
    }

    pub async fn get(&self, fine_id: Uuid) -> LedgerResult<FineDetails> {
        let fine = self.require(fine_id).await?;
        let payments = self.store.list_fine_payments(fine_id).await?;
        Ok(FineDetails {
            remaining: fine.remaining(),
            fine,
            payments,
        })
    }

    pub async fn list_for_member(&self, member_id: Uuid) -> LedgerResult<Vec<Fine>> {
        Ok(self.store.list_fines(Some(member_id)).await?)
    }

    pub async fn list_all(&self) -> LedgerResult<Vec<Fine>> {
        Ok(self.store.list_fines(None).await?)
    }

    async fn require(&self, fine_id: Uuid) -> LedgerResult<Fine> {
        self.store
            .get_fine(fine_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Fine {} not found", fine_id)))
    }
}

fn not_pending(fine: &Fine) -> LedgerError {
    let status = match fine.status {
        FineStatus::Pending => "pending",
        FineStatus::Paid => "paid",
        FineStatus::Cancelled => "cancelled",
    };
    LedgerError::invalid_state(format!("Fine {} is already {}", fine.id, status))
}

fn check_payment(fine: &Fine, amount: i64) -> LedgerResult<()> {
    if fine.status != FineStatus::Pending {
        return Err(not_pending(fine));
    }
    if amount > fine.remaining() {
        return Err(LedgerError::validation(format!(
            "Payment of {} exceeds the remaining balance of {}",
            amount,
            fine.remaining()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inzozi_db::MemoryLedgerStore;
    use inzozi_db::models::profile::NewProfile;

    async fn setup() -> (FineService, Arc<dyn LedgerStore>, Uuid) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let user_id = Uuid::new_v4();
        store
            .insert_profile(NewProfile {
                user_id,
                full_name: "Jean Bosco".to_string(),
                phone: Some("+250788000000".to_string()),
                is_approved: true,
            })
            .await
            .unwrap();
        (FineService::new(store.clone()), store, user_id)
    }

    async fn assert_ledger_consistent(fines: &FineService, fine_id: Uuid) {
        let details = fines.get(fine_id).await.unwrap();
        let logged: i64 = details.payments.iter().map(|p| p.amount).sum();
        assert_eq!(logged, details.fine.amount_paid);
        assert_eq!(
            details.fine.status == FineStatus::Paid,
            details.fine.amount_paid >= details.fine.amount
        );
    }

    #[tokio::test]
    async fn partial_payments_then_settlement() {
        let (fines, _, user_id) = setup().await;
        let fine = fines.issue(user_id, 5_000, "missed meeting").await.unwrap();

        fines.pay(fine.id, 2_000).await.unwrap();
        let after_two = fines.pay(fine.id, 2_000).await.unwrap();
        assert_eq!(after_two.status, FineStatus::Pending);
        assert_eq!(after_two.amount_paid, 4_000);
        assert_eq!(after_two.remaining(), 1_000);
        assert!(after_two.paid_at.is_none());
        assert_ledger_consistent(&fines, fine.id).await;

        let settled = fines.pay(fine.id, 1_000).await.unwrap();
        assert_eq!(settled.status, FineStatus::Paid);
        assert_eq!(settled.amount_paid, 5_000);
        assert!(settled.paid_at.is_some());
        assert_ledger_consistent(&fines, fine.id).await;

        let history = fines.history(fine.id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].paid_at >= w[1].paid_at));
    }

    #[tokio::test]
    async fn cancelling_paid_fine_is_invalid_state() {
        let (fines, _, user_id) = setup().await;
        let fine = fines.issue(user_id, 1_000, "late contribution").await.unwrap();
        let paid = fines.pay(fine.id, 1_000).await.unwrap();

        let result = fines.cancel(fine.id).await;

        assert!(matches!(result, Err(LedgerError::InvalidState(_))));
        let unchanged = fines.get(fine.id).await.unwrap().fine;
        assert_eq!(unchanged.status, FineStatus::Paid);
        assert_eq!(unchanged.amount_paid, paid.amount_paid);
        assert_eq!(unchanged.paid_at, paid.paid_at);
    }

    #[tokio::test]
    async fn cancelled_fine_takes_no_payments() {
        let (fines, _, user_id) = setup().await;
        let fine = fines.issue(user_id, 3_000, "noise").await.unwrap();
        fines.cancel(fine.id).await.unwrap();

        assert!(matches!(
            fines.pay(fine.id, 1_000).await,
            Err(LedgerError::InvalidState(_))
        ));
        assert!(matches!(
            fines.cancel(fine.id).await,
            Err(LedgerError::InvalidState(_))
        ));
        assert!(fines.history(fine.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn payment_above_remaining_is_rejected() {
        let (fines, _, user_id) = setup().await;
        let fine = fines.issue(user_id, 2_000, "absence").await.unwrap();
        fines.pay(fine.id, 1_500).await.unwrap();

        assert!(matches!(
            fines.pay(fine.id, 600).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            fines.pay(fine.id, 0).await,
            Err(LedgerError::Validation(_))
        ));
        assert_ledger_consistent(&fines, fine.id).await;
    }

    #[tokio::test]
    async fn issue_validates_input_and_member() {
        let (fines, store, user_id) = setup().await;

        assert!(matches!(
            fines.issue(user_id, -5, "x").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            fines.issue(user_id, 500, "").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            fines.issue(Uuid::new_v4(), 500, "unknown").await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(store.list_fines(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_fine_is_not_found() {
        let (fines, _, _) = setup().await;
        assert!(matches!(
            fines.pay(Uuid::new_v4(), 100).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            fines.history(Uuid::new_v4()).await,
            Err(LedgerError::NotFound(_))
        ));
    }
}
