//! Automation CLI commands: trigger, executions.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use formflow_core::repository::execution::ExecutionRepository;
use formflow_types::execution::ExecutionStatus;

use crate::cli::{cli_origin, parse_data};
use crate::state::AppState;

/// Run an automation to completion and print its result.
///
/// # Examples
///
/// ```bash
/// formflow trigger 0191c6a4-... --data '{"email":"ada@example.com"}'
/// ```
pub async fn trigger(
    state: &AppState,
    automation_id: Uuid,
    data: Option<&str>,
    json: bool,
) -> Result<()> {
    let trigger_data = parse_data(data)?;
    let result = state
        .engine
        .execute(automation_id, trigger_data, cli_origin())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    if result.success {
        println!(
            "  {} Automation completed: {}/{} steps in {} ms",
            style("✓").green().bold(),
            result.completed_steps,
            result.total_steps,
            result.execution_time_ms
        );
    } else {
        println!(
            "  {} Automation failed: {}",
            style("✗").red().bold(),
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        if result.total_steps > 0 {
            println!(
                "    {}/{} steps completed",
                result.completed_steps, result.total_steps
            );
        }
    }
    if let Some(id) = result.execution_id {
        println!("    execution {}", style(id).dim());
    }
    println!();

    Ok(())
}

/// List the most recent runs of an automation.
pub async fn list_executions(
    state: &AppState,
    automation_id: Uuid,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(state.config.engine.execution_list_limit);
    let executions = state
        .engine
        .executions()
        .list_executions(&automation_id, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!(
            "  {} No executions yet. Run one with: {}",
            style("i").blue().bold(),
            style(format!("formflow trigger {automation_id}")).yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Execution").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);

    for execution in &executions {
        let status_cell = match execution.status {
            ExecutionStatus::Running => Cell::new("◌ running").fg(Color::Yellow),
            ExecutionStatus::Completed => Cell::new("● completed").fg(Color::Green),
            ExecutionStatus::Failed => Cell::new("○ failed").fg(Color::Red),
        };
        let duration = execution
            .completed_at
            .map(|done| format!("{} ms", (done - execution.started_at).num_milliseconds()))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(execution.id.to_string()).fg(Color::Cyan),
            status_cell,
            Cell::new(execution.started_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
            Cell::new(duration),
            Cell::new(execution.error_message.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} execution{}",
        style(executions.len()).bold(),
        if executions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}
