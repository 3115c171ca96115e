//! Run subcommands: result, send, status, steps, runs, and resume.

use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use uuid::Uuid;

use loanflow_types::workflow::{RunStatus, WorkflowRun};

use crate::state::AppState;

fn status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Succeeded => Color::Green,
        RunStatus::Failed => Color::Red,
        RunStatus::SuspendedOnRecv => Color::Yellow,
        RunStatus::Running => Color::Cyan,
        RunStatus::Pending => Color::White,
    }
}

fn compact(value: &Value, max: usize) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    } else {
        text
    }
}

async fn require_run(state: &AppState, run_id: Uuid) -> Result<WorkflowRun> {
    state
        .runtime
        .get_run(run_id)
        .await?
        .with_context(|| format!("run {run_id} not found"))
}

pub async fn result(state: &AppState, run_id: Uuid, timeout_secs: u64, json: bool) -> Result<()> {
    require_run(state, run_id).await?;
    let output: Value = state
        .runtime
        .handle(run_id)
        .get_result(Some(Duration::from_secs(timeout_secs)))
        .await?;

    if json {
        println!("{}", serde_json::json!({"run_id": run_id, "output": output}));
    } else {
        println!("{}", compact(&output, usize::MAX));
    }
    Ok(())
}

pub async fn send(
    state: &AppState,
    run_id: Uuid,
    topic: &str,
    payload: Value,
    json: bool,
) -> Result<()> {
    let message = state.runtime.send(run_id, topic, &payload).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!(
            "  {} Sent {} to {} on '{}'",
            style("✓").green().bold(),
            style(message.id).dim(),
            style(run_id).cyan(),
            topic
        );
    }
    Ok(())
}

pub async fn status(state: &AppState, run_id: Uuid, json: bool) -> Result<()> {
    let run = require_run(state, run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style(&run.workflow_name).cyan().bold(), style(run.id).dim());
    println!("  Status:   {}", style(run.status).bold());
    println!("  Created:  {}", run.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Updated:  {}", run.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(suspension) = &run.suspension {
        println!(
            "  Waiting:  '{}' until {}",
            suspension.topic,
            suspension.deadline.format("%H:%M:%S UTC")
        );
    }
    if let Some(output) = &run.output {
        println!("  Output:   {}", compact(output, 120));
    }
    if let Some(error) = &run.error {
        println!("  Error:    {}", style(error).red());
    }
    println!();
    Ok(())
}

pub async fn steps(state: &AppState, run_id: Uuid, json: bool) -> Result<()> {
    require_run(state, run_id).await?;
    let records = state.runtime.list_steps(run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("  {}", style("No steps checkpointed yet.").dim());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Seq").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Output").fg(Color::White),
        Cell::new("Completed").fg(Color::White),
    ]);
    for record in &records {
        table.add_row(vec![
            Cell::new(record.seq),
            Cell::new(&record.step_name).fg(Color::Cyan),
            Cell::new(compact(&record.output, 60)),
            Cell::new(record.completed_at.format("%H:%M:%S%.3f").to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn list(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let runs = state.runtime.list_runs(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("  {}", style("No runs yet.").dim());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Run").fg(Color::White),
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Result").fg(Color::White),
    ]);
    for run in &runs {
        let result = match (&run.output, &run.error) {
            (Some(output), _) => compact(output, 48),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(&run.workflow_name),
            Cell::new(run.status).fg(status_color(run.status)),
            Cell::new(run.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(result),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Resume every incomplete run and wait for each to finish.
pub async fn resume(state: &AppState, timeout_secs: u64, json: bool) -> Result<()> {
    let pending: Vec<Uuid> = state
        .runtime
        .incomplete_runs()
        .await?
        .into_iter()
        .filter(|r| state.runtime.registry().contains(&r.workflow_name))
        .map(|r| r.id)
        .collect();

    let resumed = state.runtime.resume_incomplete().await?;
    if !json {
        println!(
            "  {} Resumed {} run(s)",
            style("↻").cyan().bold(),
            style(resumed).bold()
        );
    }

    let timeout = Some(Duration::from_secs(timeout_secs));
    let mut outcomes = Vec::with_capacity(pending.len());
    for run_id in pending {
        let outcome = state.runtime.handle(run_id).get_result::<Value>(timeout).await;
        let (ok, text) = match outcome {
            Ok(output) => (true, compact(&output, 80)),
            Err(e) => (false, e.to_string()),
        };
        if !json {
            let mark = if ok { style("✓").green() } else { style("✗").red() };
            println!("  {mark} {run_id} {text}");
        }
        outcomes.push(serde_json::json!({"run_id": run_id, "ok": ok, "result": text}));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }
    Ok(())
}
