//! Loan subcommands: submit, approve, and show.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use loanflow_core::loan::{LOAN_APPROVAL, LOAN_PROCESS};
use loanflow_core::repository::loan::LoanRepository;
use loanflow_types::loan::{ApplicationStatus, LoanApplication};

use crate::state::AppState;

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Start a `loan-process` run and, unless detached, wait for the decision.
pub async fn submit(
    state: &AppState,
    application: LoanApplication,
    run_id: Option<Uuid>,
    detach: bool,
    json: bool,
) -> Result<()> {
    if let Err(msg) = application.validate() {
        bail!("invalid application: {msg}");
    }

    let handle = match run_id {
        Some(id) => state.runtime.start_with_id(id, LOAN_PROCESS, &application).await?,
        None => state.runtime.start(LOAN_PROCESS, &application).await?,
    };
    let run_id = handle.run_id();

    if detach {
        if json {
            println!(
                "{}",
                serde_json::json!({"run_id": run_id, "application_id": application.application_id})
            );
        } else {
            println!();
            println!(
                "  {} Submitted {} as run {}",
                style("✓").green().bold(),
                style(&application.application_id).cyan(),
                style(run_id).bold()
            );
            println!(
                "  {}",
                style("The run continues under `loanflow serve` or `loanflow resume`.").dim()
            );
            println!();
        }
        return Ok(());
    }

    let needs_review = application.loan_amount > state.config.loan.review_threshold;
    let message = if needs_review {
        format!(
            "Waiting for decision (review required, approve with `loanflow approve {run_id}`)..."
        )
    } else {
        "Waiting for decision...".to_string()
    };
    let progress = (!json).then(|| spinner(message));

    let timeout = Duration::from_secs(state.config.loan.review_timeout_secs + 30);
    let result = handle.get_result::<String>(Some(timeout)).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let outcome = result.with_context(|| format!("run {run_id} did not complete"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_id": run_id,
                "application_id": application.application_id,
                "result": outcome,
            }))?
        );
        return Ok(());
    }

    println!();
    println!("  {} {}", style("▸").cyan().bold(), style(&outcome).bold());
    println!("  Run: {}", style(run_id).dim());
    println!();
    Ok(())
}

/// Build a `LoanApplication` from CLI flags, stamped with the current time.
#[allow(clippy::too_many_arguments)]
pub fn application_from_flags(
    application_id: String,
    applicant_name: String,
    email: String,
    phone: String,
    loan_amount: f64,
    loan_purpose: loanflow_types::loan::LoanPurpose,
    annual_income: f64,
) -> LoanApplication {
    LoanApplication {
        application_id,
        applicant_name,
        email,
        phone,
        loan_amount,
        loan_purpose,
        annual_income,
        submitted_at: Utc::now(),
    }
}

/// Run the `loan-approval` workflow against a waiting run.
pub async fn approve(state: &AppState, run_id: Uuid, json: bool) -> Result<()> {
    let target = state
        .runtime
        .get_run(run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))?;
    if target.status.is_terminal() {
        bail!("run {run_id} already finished ({})", target.status);
    }

    let handle = state.runtime.start(LOAN_APPROVAL, &run_id).await?;
    let message: String = handle.get_result(Some(Duration::from_secs(30))).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"approval_run_id": handle.run_id(), "message": message})
        );
    } else {
        println!();
        println!("  {} {}", style("✓").green().bold(), message);
        println!();
    }
    Ok(())
}

/// Show a stored application and its decision.
pub async fn show(state: &AppState, application_id: &str, json: bool) -> Result<()> {
    let record = state
        .loans
        .find_application(application_id)
        .await?
        .with_context(|| format!("loan application '{application_id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let app = &record.application;
    let status = match record.status {
        ApplicationStatus::Approved => style(record.status.to_string()).green(),
        ApplicationStatus::Rejected => style(record.status.to_string()).red(),
        ApplicationStatus::Submitted => style(record.status.to_string()).yellow(),
    };

    println!();
    println!("  {} {}", style(&app.application_id).cyan().bold(), status);
    println!("  {}", style("────────────────────────────────────").dim());
    println!("  Applicant:  {}", app.applicant_name);
    println!("  Amount:     {:.2}", app.loan_amount);
    println!("  Purpose:    {}", app.loan_purpose.as_str());
    println!("  Income:     {:.2}", app.annual_income);
    if !app.email.is_empty() {
        println!("  Email:      {}", app.email);
    }
    if !app.phone.is_empty() {
        println!("  Phone:      {}", app.phone);
    }
    println!("  Submitted:  {}", app.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(decided) = record.decided_at {
        println!("  Decided:    {}", decided.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    Ok(())
}
