//! Role inheritance commands.

use anyhow::Result;
use clap::Subcommand;
use gatekeeper_core::rbac::RoleInheritance;
use gatekeeper_core::Gatekeeper;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum InheritCommands {
    /// List inheritance edges
    List,

    /// Let ROLE inherit every permission of PARENT
    Add { role: String, parent: String },

    /// Remove an inheritance edge
    Remove { role: String, parent: String },
}

#[derive(Debug, Serialize, Tabled)]
struct EdgeRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Inherits From")]
    inherits_from: String,
}

pub async fn execute(
    cmd: InheritCommands,
    gatekeeper: &Gatekeeper,
    format: OutputFormat,
) -> Result<()> {
    let admin = &gatekeeper.admin;

    match cmd {
        InheritCommands::List => {
            let rows: Vec<EdgeRow> = admin
                .list_inheritance()
                .await?
                .into_iter()
                .map(|e| EdgeRow {
                    role: e.role.to_string(),
                    inherits_from: e.inherits_from.to_string(),
                })
                .collect();
            output::print_list(&rows, format)?;
        }

        InheritCommands::Add { role, parent } => {
            let edge = RoleInheritance::new(role, parent);
            let receipt = admin.create_inheritance(&edge).await?;
            output::print_receipt(&format!("Added inheritance {}", edge), &receipt, format)?;
        }

        InheritCommands::Remove { role, parent } => {
            let edge = RoleInheritance::new(role, parent);
            let receipt = admin.delete_inheritance(&edge).await?;
            output::print_receipt(&format!("Removed inheritance {}", edge), &receipt, format)?;
        }
    }

    Ok(())
}
