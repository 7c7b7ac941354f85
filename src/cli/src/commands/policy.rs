//! Policy rule management commands.

use anyhow::Result;
use clap::Subcommand;
use gatekeeper_core::rbac::{Action, DefaultRole, PolicyRule};
use gatekeeper_core::Gatekeeper;
use serde::Serialize;
use tabled::Tabled;

use super::check::join_actions;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List policy rules grouped by role and resource
    List {
        /// Keep resources containing this text (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,

        /// Show only rules for exactly this resource
        #[arg(short, long, conflicts_with = "search")]
        resource: Option<String>,
    },

    /// Grant an action on a resource to a role
    Add {
        role: String,
        resource: String,
        action: Action,
    },

    /// Revoke a granted action
    Remove {
        role: String,
        resource: String,
        action: Action,
    },

    /// Replace one rule with another
    Update {
        /// Existing rule as `role,resource,action`
        #[arg(value_parser = parse_rule)]
        old: PolicyRule,

        /// Replacement rule as `role,resource,action`
        #[arg(value_parser = parse_rule)]
        new: PolicyRule,
    },

    /// List every role named by a rule or an inheritance edge
    Roles,
}

#[derive(Debug, Serialize, Tabled)]
struct PolicyRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Actions")]
    actions: String,
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Built-in")]
    builtin: String,
}

fn parse_rule(s: &str) -> Result<PolicyRule, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [role, resource, action] = parts.as_slice() else {
        return Err(format!("expected role,resource,action but got '{}'", s));
    };
    let action: Action = action.parse().map_err(|e| format!("{}", e))?;
    let rule = PolicyRule::new(*role, *resource, action);
    rule.validate().map_err(|e| e.to_string())?;
    Ok(rule)
}

pub async fn execute(
    cmd: PolicyCommands,
    gatekeeper: &Gatekeeper,
    format: OutputFormat,
) -> Result<()> {
    let admin = &gatekeeper.admin;

    match cmd {
        PolicyCommands::List { search, resource } => {
            let groups = match resource {
                Some(resource) => admin.find_by_resource(&resource).await?,
                None => admin.list_policies(search.as_deref()).await?,
            };

            match format {
                OutputFormat::Table => {
                    let rows: Vec<PolicyRow> = groups
                        .iter()
                        .map(|g| PolicyRow {
                            resource: g.resource.clone(),
                            role: g.role.to_string(),
                            actions: join_actions(&g.actions),
                        })
                        .collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&groups, format)?,
            }
        }

        PolicyCommands::Add {
            role,
            resource,
            action,
        } => {
            let rule = PolicyRule::new(role, resource, action);
            let receipt = admin.create_policy(&rule).await?;
            output::print_receipt(&format!("Granted {}", rule), &receipt, format)?;
        }

        PolicyCommands::Remove {
            role,
            resource,
            action,
        } => {
            let rule = PolicyRule::new(role, resource, action);
            let receipt = admin.delete_policy(&rule).await?;
            output::print_receipt(&format!("Revoked {}", rule), &receipt, format)?;
        }

        PolicyCommands::Update { old, new } => {
            let receipt = admin.update_policy(&old, &new).await?;
            output::print_receipt(&format!("Replaced {} with {}", old, new), &receipt, format)?;
        }

        PolicyCommands::Roles => {
            let roles = admin.list_roles().await?;
            let rows: Vec<RoleRow> = roles
                .into_iter()
                .map(|r| RoleRow {
                    builtin: DefaultRole::all()
                        .into_iter()
                        .find(|d| d.id() == r.as_str())
                        .map_or("-", |d| d.description())
                        .to_string(),
                    role: r.to_string(),
                })
                .collect();
            output::print_list(&rows, format)?;
        }
    }

    Ok(())
}
