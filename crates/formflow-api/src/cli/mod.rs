//! CLI command definitions and dispatch for the `formflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod automation;
pub mod event;
pub mod webhook;

use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use formflow_types::execution::TriggerOrigin;

/// Run webhook automations from the command line or as a REST service.
#[derive(Parser)]
#[command(name = "formflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "FORMFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `server.port` in config.toml).
        #[arg(long, env = "FORMFLOW_PORT")]
        port: Option<u16>,

        /// Host to bind to (defaults to `server.host` in config.toml).
        #[arg(long, env = "FORMFLOW_HOST")]
        host: Option<String>,
    },

    /// Run an automation and wait for it to finish.
    Trigger {
        /// Automation id.
        automation_id: Uuid,

        /// Trigger data as a JSON document.
        #[arg(long)]
        data: Option<String>,
    },

    /// Send one test request to a webhook.
    TestWebhook {
        /// Webhook id.
        webhook_id: Uuid,

        /// Payload as a JSON document.
        #[arg(long)]
        data: Option<String>,
    },

    /// Show the execution history of an automation.
    Executions {
        /// Automation id.
        automation_id: Uuid,

        /// Maximum number of runs to show.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show recent system events.
    Events {
        /// Maximum number of events to show.
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Only events of this type (webhook, automation).
        #[arg(long = "type")]
        event_type: Option<String>,

        /// Free-text search over event name and description.
        #[arg(long)]
        search: Option<String>,
    },
}

/// Parse a `--data` argument. Absent means `{}`.
pub fn parse_data(data: Option<&str>) -> anyhow::Result<Value> {
    match data {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {e}")),
        None => Ok(Value::Object(Default::default())),
    }
}

/// Origin recorded on events caused by CLI commands.
pub fn cli_origin() -> TriggerOrigin {
    TriggerOrigin {
        user_agent: Some(format!("formflow-cli/{}", env!("CARGO_PKG_VERSION"))),
        ..Default::default()
    }
}
