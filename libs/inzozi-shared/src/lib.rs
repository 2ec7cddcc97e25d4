use serde::{Deserialize, Serialize};

/// Request and response bodies of the panel HTTP API.
pub mod api {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UpdateProfileRequest {
        pub full_name: String,
        pub phone: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoanApplicationRequest {
        pub amount: i64,
        pub purpose: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoanDecisionRequest {
        pub approve: bool,
        #[serde(default)]
        pub notes: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PaymentRequest {
        pub amount: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MemberApprovalRequest {
        pub approve: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct IssueFineRequest {
        pub user_id: Uuid,
        pub amount: i64,
        pub reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ContributionRequest {
        pub user_id: Uuid,
        pub amount: i64,
        /// Defaults to the time the contribution is recorded.
        #[serde(default)]
        pub payment_date: Option<DateTime<Utc>>,
        #[serde(default)]
        pub reference_number: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ContributionProgress {
        pub contributed: i64,
        pub required: i64,
        pub remaining: i64,
        pub percent: f64,
        pub pending_count: usize,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DashboardStats {
        pub total_members: usize,
        pub pending_approvals: usize,
        pub total_contributions: i64,
        pub total_loans: i64,
        pub pending_loans: usize,
        pub outstanding_fines: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SweepReport {
        pub checked: usize,
        pub defaulted: Vec<Uuid>,
        pub as_of: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HealthResponse {
        pub status: String,
        pub version: String,
        pub storage: String,
    }
}

#[cfg(test)]
mod tests {
    use super::api::*;

    #[test]
    fn decision_notes_are_optional() {
        let body: LoanDecisionRequest = serde_json::from_str(r#"{"approve": true}"#).unwrap();
        assert!(body.approve);
        assert!(body.notes.is_none());
    }

    #[test]
    fn contribution_date_defaults_to_none() {
        let body: ContributionRequest = serde_json::from_str(
            r#"{"user_id": "6f1c2a44-58d4-4a7e-9a57-bd8f54b0a1de", "amount": 5000}"#,
        )
        .unwrap();
        assert_eq!(body.amount, 5000);
        assert!(body.payment_date.is_none());
        assert!(body.reference_number.is_none());
    }
}
