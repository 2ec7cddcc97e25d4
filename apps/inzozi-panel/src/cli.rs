use anyhow::{Context, Result};
use uuid::Uuid;

use crate::auth;
use crate::workflow::Workflow;

pub async fn grant_admin(workflow: &Workflow, user_id: Uuid) -> Result<()> {
    workflow
        .members
        .grant_admin(user_id)
        .await
        .context("Failed to assign admin role")?;
    println!("Member {} now holds the admin role.", user_id);
    Ok(())
}

pub async fn run_sweep(workflow: &Workflow) -> Result<()> {
    let outcome = workflow
        .loans
        .detect_overdue()
        .await
        .context("Overdue sweep failed")?;

    println!(
        "Checked {} approved loans as of {}.",
        outcome.checked,
        outcome.as_of.format("%Y-%m-%d %H:%M UTC")
    );
    if outcome.defaulted.is_empty() {
        println!("No loans defaulted.");
    }
    for loan in &outcome.defaulted {
        println!(
            "Defaulted loan {} (member {}, outstanding {} RWF)",
            loan.id,
            loan.user_id,
            loan.outstanding()
        );
    }
    Ok(())
}

pub fn issue_token(secret: &str, user_id: Uuid, name: Option<&str>, hours: i64) -> Result<()> {
    if hours <= 0 {
        anyhow::bail!("--hours must be positive");
    }
    let token = auth::issue_token(secret, user_id, name, chrono::Duration::hours(hours))
        .context("Failed to sign session token")?;
    println!("{}", token);
    Ok(())
}
