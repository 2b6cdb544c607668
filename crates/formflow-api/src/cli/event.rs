//! Event log CLI command.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use formflow_types::event::EventFilter;

use crate::state::AppState;

/// Print the most recent system events, newest first.
pub async fn list_events(
    state: &AppState,
    limit: u32,
    event_type: Option<String>,
    search: Option<String>,
    json: bool,
) -> Result<()> {
    let filter = EventFilter {
        event_type,
        search,
        limit,
        ..Default::default()
    };
    let events = state.events.list_events(&filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!();
        println!("  {} No events recorded.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Event").fg(Color::White),
        Cell::new("Description").fg(Color::White),
    ]);

    for event in &events {
        let name_color = if event.event_name.ends_with("failed") {
            Color::Red
        } else if event.event_name.ends_with("skipped") {
            Color::Yellow
        } else {
            Color::Cyan
        };

        table.add_row(vec![
            Cell::new(event.created_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
            Cell::new(&event.event_type),
            Cell::new(&event.event_name).fg(name_color),
            Cell::new(event.description.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}
