use std::time::Duration;

use inzozi_shared::api::SweepReport;
use tracing::{error, info};

use super::loan_service::{LoanService, SweepOutcome};
use crate::error::LedgerResult;

/// Background job that owns default detection for the whole ledger.
pub struct OverdueMonitor {
    loans: LoanService,
    interval: Duration,
}

impl OverdueMonitor {
    pub fn new(loans: LoanService, interval: Duration) -> Self {
        Self { loans, interval }
    }

    pub async fn start(&self) {
        info!(
            "Starting OverdueMonitor, sweeping every {}s",
            self.interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                error!("Overdue sweep failed: {}", e);
            }
        }
    }

    pub async fn run_once(&self) -> LedgerResult<SweepReport> {
        let outcome = self.loans.detect_overdue().await?;
        let report = report(&outcome);
        info!(
            checked = report.checked,
            defaulted = report.defaulted.len(),
            "Overdue sweep finished"
        );
        Ok(report)
    }
}

pub fn report(outcome: &SweepOutcome) -> SweepReport {
    SweepReport {
        checked: outcome.checked,
        defaulted: outcome.defaulted.iter().map(|l| l.id).collect(),
        as_of: outcome.as_of,
    }
}
