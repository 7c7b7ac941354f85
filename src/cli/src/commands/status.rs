//! Enforcer snapshot status.

use anyhow::Result;
use clap::Args;
use gatekeeper_core::telemetry::TelemetryHandle;
use gatekeeper_core::Gatekeeper;
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    /// Also print the Prometheus metrics recorded during this run
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Serialize)]
struct Status {
    generation: u64,
    loaded_at: String,
    rules: usize,
    inheritance_edges: usize,
    assignments: usize,
    last_reload_error: Option<String>,
}

pub fn execute(
    args: StatusArgs,
    gatekeeper: &Gatekeeper,
    telemetry: &TelemetryHandle,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = gatekeeper.enforcer.snapshot();
    let status = Status {
        generation: snapshot.generation(),
        loaded_at: snapshot.loaded_at().to_rfc3339(),
        rules: snapshot.rule_count(),
        inheritance_edges: snapshot.edge_count(),
        assignments: snapshot.assignment_count(),
        last_reload_error: gatekeeper.enforcer.last_reload_error(),
    };

    match format {
        OutputFormat::Table => {
            output::print_header("Enforcer");
            output::print_detail("Generation", &status.generation.to_string());
            output::print_detail("Loaded At", &status.loaded_at);
            output::print_detail("Rules", &status.rules.to_string());
            output::print_detail("Inheritance Edges", &status.inheritance_edges.to_string());
            output::print_detail("Assignments", &status.assignments.to_string());
            match &status.last_reload_error {
                Some(err) => output::print_error(&format!("Last reload failed: {}", err)),
                None => output::print_success("Serving the latest policy"),
            }
        }
        _ => output::print_item(&status, format)?,
    }

    if args.metrics {
        if telemetry.metrics.is_enabled() {
            print!("{}", telemetry.metrics.render());
        } else {
            output::print_info("Metrics are disabled; set metrics.enabled = true");
        }
    }

    Ok(())
}
