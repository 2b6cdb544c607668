//! Webhook CLI commands: test-webhook.

use anyhow::Result;
use console::style;
use uuid::Uuid;

use crate::cli::{cli_origin, parse_data};
use crate::state::AppState;

/// Send one request to a webhook and print the response.
pub async fn test_webhook(
    state: &AppState,
    webhook_id: Uuid,
    data: Option<&str>,
    json: bool,
) -> Result<()> {
    let payload = parse_data(data)?;
    let webhook = state.webhook_service.get_webhook(&webhook_id).await?;
    let result = state
        .engine
        .test_webhook(webhook_id, payload, cli_origin())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    let status = result
        .status_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "no response".to_string());
    if result.success {
        println!(
            "  {} {} {} answered {} in {} ms",
            style("✓").green().bold(),
            webhook.method.as_str(),
            style(&webhook.url).cyan(),
            style(status).green(),
            result.response_time_ms
        );
    } else {
        println!(
            "  {} {} {} failed ({}): {}",
            style("✗").red().bold(),
            webhook.method.as_str(),
            style(&webhook.url).cyan(),
            status,
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(body) = result.response_body.as_deref().filter(|b| !b.is_empty()) {
        println!();
        println!("  {}", style(body).dim());
    }
    println!();

    Ok(())
}
