//! Apply a seed file through the administrative service.

use anyhow::{Context, Result};
use clap::Args;
use gatekeeper_core::rbac::SeedPolicy;
use gatekeeper_core::Gatekeeper;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct SeedArgs {
    /// Seed file with `p`, `g` and `g2` lines
    file: PathBuf,
}

pub async fn execute(
    args: SeedArgs,
    gatekeeper: &Gatekeeper,
    format: OutputFormat,
) -> Result<()> {
    let seed = SeedPolicy::from_path(&args.file)
        .with_context(|| format!("Failed to read seed file {}", args.file.display()))?;
    let (report, receipt) = gatekeeper.admin.seed(&seed).await?;

    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Seed: {}", args.file.display()));
            output::print_detail(
                "Rules",
                &format!("{} added, {} skipped", report.rules_added, report.rules_skipped),
            );
            output::print_detail(
                "Inheritance",
                &format!("{} added, {} skipped", report.edges_added, report.edges_skipped),
            );
            output::print_detail(
                "Assignments",
                &format!(
                    "{} added, {} skipped",
                    report.assignments_added, report.assignments_skipped
                ),
            );
            for rejected in &report.rejected {
                output::print_warning(&format!("Rejected: {}", rejected));
            }
            println!();
            if report.changed() {
                output::print_receipt("Seed applied", &receipt, format)?;
            } else {
                output::print_info("Store already contained every seeded entry");
            }
        }
        _ => output::print_item(&report, format)?,
    }

    Ok(())
}
