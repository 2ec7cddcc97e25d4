use std::collections::HashMap;
use std::sync::Arc;

use inzozi_db::LedgerStore;
use inzozi_db::models::contribution::ContributionStatus;
use inzozi_db::models::fine::FineStatus;
use inzozi_db::models::loan::{LoanFilter, LoanStatus};
use inzozi_db::models::profile::{NewProfile, Profile};
use inzozi_db::models::role::{AppRole, RoleAssignment};
use inzozi_shared::api::DashboardStats;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

const DEFAULT_DISPLAY_NAME: &str = "New member";

/// Admin listing row: a profile with its ledger totals.
#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    #[serde(flatten)]
    pub profile: Profile,
    pub contributed: i64,
    pub pending_contributions: usize,
    pub loan_count: usize,
}

#[derive(Clone)]
pub struct MemberService {
    store: Arc<dyn LedgerStore>,
}

impl MemberService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the member's profile, creating it with the `user` role on first login.
    pub async fn ensure_profile(
        &self,
        user_id: Uuid,
        display_name: Option<&str>,
    ) -> LedgerResult<Profile> {
        if let Some(profile) = self.store.get_profile(user_id).await? {
            return Ok(profile);
        }

        let full_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME);
        let profile = self
            .store
            .insert_profile(NewProfile {
                user_id,
                full_name: full_name.to_string(),
                phone: None,
                is_approved: false,
            })
            .await?;
        self.store.insert_role(user_id, AppRole::User).await?;

        info!(user_id = %user_id, "Member profile created");
        Ok(profile)
    }

    pub async fn get(&self, user_id: Uuid) -> LedgerResult<Profile> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Member {} not found", user_id)))
    }

    pub async fn update_own_profile(
        &self,
        user_id: Uuid,
        full_name: &str,
        phone: Option<&str>,
    ) -> LedgerResult<Profile> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(LedgerError::validation("Full name is required"));
        }
        let phone = phone.map(str::trim).filter(|p| !p.is_empty());

        let profile = self
            .store
            .update_profile_details(user_id, full_name, phone)
            .await?;
        info!(user_id = %user_id, "Member profile updated");
        Ok(profile)
    }

    pub async fn set_approval(&self, user_id: Uuid, approve: bool) -> LedgerResult<Profile> {
        let profile = self.store.set_profile_approved(user_id, approve).await?;
        info!(user_id = %user_id, approved = approve, "Member approval changed");
        Ok(profile)
    }

    pub async fn list_members(&self) -> LedgerResult<Vec<MemberSummary>> {
        let profiles = self.store.list_profiles().await?;
        let contributions = self.store.list_contributions(None).await?;
        let loans = self.store.list_loans(LoanFilter::default()).await?;

        let mut contributed: HashMap<Uuid, i64> = HashMap::new();
        let mut pending: HashMap<Uuid, usize> = HashMap::new();
        for c in &contributions {
            match c.status {
                ContributionStatus::Completed => *contributed.entry(c.user_id).or_default() += c.amount,
                ContributionStatus::Pending => *pending.entry(c.user_id).or_default() += 1,
                ContributionStatus::Failed => {}
            }
        }
        let mut loan_counts: HashMap<Uuid, usize> = HashMap::new();
        for loan in &loans {
            *loan_counts.entry(loan.user_id).or_default() += 1;
        }

        Ok(profiles
            .into_iter()
            .map(|profile| MemberSummary {
                contributed: contributed.get(&profile.user_id).copied().unwrap_or(0),
                pending_contributions: pending.get(&profile.user_id).copied().unwrap_or(0),
                loan_count: loan_counts.get(&profile.user_id).copied().unwrap_or(0),
                profile,
            })
            .collect())
    }

    pub async fn dashboard(&self) -> LedgerResult<DashboardStats> {
        let profiles = self.store.list_profiles().await?;
        let contributions = self.store.list_contributions(None).await?;
        let loans = self.store.list_loans(LoanFilter::default()).await?;
        let fines = self.store.list_fines(None).await?;

        Ok(DashboardStats {
            total_members: profiles.len(),
            pending_approvals: profiles.iter().filter(|p| !p.is_approved).count(),
            total_contributions: contributions
                .iter()
                .filter(|c| c.status == ContributionStatus::Completed)
                .map(|c| c.amount)
                .sum(),
            total_loans: loans
                .iter()
                .filter(|l| {
                    matches!(
                        l.status,
                        LoanStatus::Approved | LoanStatus::Paid | LoanStatus::Defaulted
                    )
                })
                .map(|l| l.amount)
                .sum(),
            pending_loans: loans
                .iter()
                .filter(|l| l.status == LoanStatus::Pending)
                .count(),
            outstanding_fines: fines
                .iter()
                .filter(|f| f.status == FineStatus::Pending)
                .map(|f| f.remaining())
                .sum(),
        })
    }

    pub async fn grant_admin(&self, user_id: Uuid) -> LedgerResult<RoleAssignment> {
        let assignment = self.store.insert_role(user_id, AppRole::Admin).await?;
        info!(user_id = %user_id, "Admin role granted");
        Ok(assignment)
    }

    /// Only an explicit `admin` assignment counts.
    pub async fn is_admin(&self, user_id: Uuid) -> LedgerResult<bool> {
        let roles = self.store.list_roles(user_id).await?;
        Ok(roles.contains(&AppRole::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use inzozi_db::MemoryLedgerStore;
    use inzozi_db::models::contribution::NewContribution;
    use inzozi_db::models::fine::NewFine;

    fn service() -> (MemberService, Arc<dyn LedgerStore>) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        (MemberService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn first_login_creates_unapproved_profile_with_user_role() {
        let (members, store) = service();
        let user_id = Uuid::new_v4();

        let profile = members
            .ensure_profile(user_id, Some("Eric Mugisha"))
            .await
            .unwrap();
        let again = members.ensure_profile(user_id, Some("Other")).await.unwrap();

        assert_eq!(profile.full_name, "Eric Mugisha");
        assert!(!profile.is_approved);
        assert_eq!(again.id, profile.id);
        assert_eq!(again.full_name, "Eric Mugisha");
        assert_eq!(store.list_roles(user_id).await.unwrap(), vec![AppRole::User]);
        assert!(!members.is_admin(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn admin_check_fails_closed() {
        let (members, _) = service();
        let user_id = Uuid::new_v4();

        assert!(!members.is_admin(user_id).await.unwrap());
        members.grant_admin(user_id).await.unwrap();
        members.grant_admin(user_id).await.unwrap();
        assert!(members.is_admin(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn profile_edit_requires_name() {
        let (members, _) = service();
        let user_id = Uuid::new_v4();
        members.ensure_profile(user_id, None).await.unwrap();

        assert!(matches!(
            members.update_own_profile(user_id, "  ", None).await,
            Err(LedgerError::Validation(_))
        ));
        let updated = members
            .update_own_profile(user_id, "Diane Ingabire", Some(" "))
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Diane Ingabire");
        assert!(updated.phone.is_none());
    }

    #[tokio::test]
    async fn approving_unknown_member_is_not_found() {
        let (members, _) = service();
        assert!(matches!(
            members.set_approval(Uuid::new_v4(), true).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dashboard_and_listing_aggregate_the_ledger() {
        let (members, store) = service();
        let approved = Uuid::new_v4();
        let waiting = Uuid::new_v4();
        members.ensure_profile(approved, Some("A")).await.unwrap();
        members.ensure_profile(waiting, Some("B")).await.unwrap();
        members.set_approval(approved, true).await.unwrap();

        for (amount, status) in [
            (40_000, ContributionStatus::Completed),
            (5_000, ContributionStatus::Pending),
        ] {
            store
                .insert_contribution(NewContribution {
                    user_id: approved,
                    amount,
                    payment_date: Utc::now(),
                    status,
                    reference_number: None,
                })
                .await
                .unwrap();
        }
        let fine = store
            .insert_fine(NewFine {
                user_id: waiting,
                amount: 2_000,
                reason: "late".to_string(),
                issued_at: Utc::now(),
            })
            .await
            .unwrap();
        store.record_fine_payment(fine.id, 500, Utc::now()).await.unwrap();

        let stats = members.dashboard().await.unwrap();
        assert_eq!(stats.total_members, 2);
        assert_eq!(stats.pending_approvals, 1);
        assert_eq!(stats.total_contributions, 40_000);
        assert_eq!(stats.outstanding_fines, 1_500);
        assert_eq!(stats.pending_loans, 0);

        let listing = members.list_members().await.unwrap();
        let row = listing
            .iter()
            .find(|m| m.profile.user_id == approved)
            .unwrap();
        assert_eq!(row.contributed, 40_000);
        assert_eq!(row.pending_contributions, 1);
        assert_eq!(row.loan_count, 0);
    }
}
