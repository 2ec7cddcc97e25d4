use std::sync::Arc;

use chrono::{DateTime, Utc};
use inzozi_db::LedgerStore;
use inzozi_db::models::contribution::{Contribution, ContributionStatus, NewContribution};
use inzozi_shared::api::ContributionProgress;
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Progress of a member's contributions toward `required`.
///
/// Only completed contributions count. The percentage is clamped to 0..=100.
pub fn compute_progress(contributions: &[Contribution], required: i64) -> ContributionProgress {
    let contributed: i64 = contributions
        .iter()
        .filter(|c| c.status == ContributionStatus::Completed)
        .map(|c| c.amount)
        .sum();
    let pending_count = contributions
        .iter()
        .filter(|c| c.status == ContributionStatus::Pending)
        .count();

    let percent = if required > 0 {
        (contributed as f64 / required as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        100.0
    };

    ContributionProgress {
        contributed,
        required,
        remaining: (required - contributed).max(0),
        percent,
        pending_count,
    }
}

#[derive(Clone)]
pub struct ContributionService {
    store: Arc<dyn LedgerStore>,
    required_amount: i64,
}

impl ContributionService {
    pub fn new(store: Arc<dyn LedgerStore>, required_amount: i64) -> Self {
        Self {
            store,
            required_amount,
        }
    }

    /// Records a contribution entered by an admin. These are always `completed`.
    pub async fn record(
        &self,
        member_id: Uuid,
        amount: i64,
        payment_date: Option<DateTime<Utc>>,
        reference: Option<&str>,
    ) -> LedgerResult<Contribution> {
        if amount <= 0 {
            return Err(LedgerError::validation("Contribution amount must be positive"));
        }
        if self.store.get_profile(member_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("Member {} not found", member_id)));
        }

        let contribution = self
            .store
            .insert_contribution(NewContribution {
                user_id: member_id,
                amount,
                payment_date: payment_date.unwrap_or_else(Utc::now),
                status: ContributionStatus::Completed,
                reference_number: reference
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
            })
            .await?;

        info!(contribution_id = %contribution.id, user_id = %member_id, amount, "Contribution recorded");
        Ok(contribution)
    }

    pub async fn progress(&self, member_id: Uuid) -> LedgerResult<ContributionProgress> {
        let contributions = self.store.list_contributions(Some(member_id)).await?;
        Ok(compute_progress(&contributions, self.required_amount))
    }

    pub async fn list_for_member(&self, member_id: Uuid) -> LedgerResult<Vec<Contribution>> {
        Ok(self.store.list_contributions(Some(member_id)).await?)
    }

    pub async fn list_all(&self) -> LedgerResult<Vec<Contribution>> {
        Ok(self.store.list_contributions(None).await?)
    }
}
