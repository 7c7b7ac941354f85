//! User role assignment commands.

use anyhow::Result;
use clap::Subcommand;
use gatekeeper_core::rbac::{RoleName, UserId};
use gatekeeper_core::Gatekeeper;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum RoleCommands {
    /// List every user role assignment
    List,

    /// Assign a role to a user, replacing any previous one
    Assign { user: String, role: String },

    /// Show the role assigned to a user
    Show { user: String },

    /// Remove every role from a user
    Clear {
        user: String,

        /// Confirm the removal; without it nothing is removed
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct AssignmentRow {
    #[tabled(rename = "User")]
    user_id: String,
    #[tabled(rename = "Role")]
    role: String,
}

#[derive(Debug, Serialize)]
struct ClearResult {
    user_id: String,
    removed: usize,
}

pub async fn execute(
    cmd: RoleCommands,
    gatekeeper: &Gatekeeper,
    format: OutputFormat,
) -> Result<()> {
    let admin = &gatekeeper.admin;

    match cmd {
        RoleCommands::List => {
            let rows: Vec<AssignmentRow> = admin
                .list_assignments()
                .await?
                .into_iter()
                .map(|a| AssignmentRow {
                    user_id: a.user_id.to_string(),
                    role: a.role.to_string(),
                })
                .collect();
            output::print_list(&rows, format)?;
        }

        RoleCommands::Assign { user, role } => {
            let user_id = UserId::new(user);
            let role = RoleName::new(role);
            let receipt = admin.assign_user_role(&user_id, &role).await?;
            output::print_receipt(
                &format!("Assigned role {} to {}", role, user_id),
                &receipt,
                format,
            )?;
        }

        RoleCommands::Show { user } => {
            let user_id = UserId::new(user);
            let role = admin.role_of_user(&user_id).await?;
            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("User: {}", user_id));
                    output::print_detail("Role", role.as_str());
                }
                _ => output::print_item(
                    &AssignmentRow {
                        user_id: user_id.to_string(),
                        role: role.to_string(),
                    },
                    format,
                )?,
            }
        }

        RoleCommands::Clear { user, force } => {
            if !force {
                output::print_info(
                    "This will remove every role of the user. Use --force to confirm.",
                );
                return Ok(());
            }

            let user_id = UserId::new(user);
            let (removed, receipt) = admin.remove_user_roles(&user_id).await?;
            match format {
                OutputFormat::Table => {
                    if removed == 0 {
                        output::print_info(&format!("{} had no roles", user_id));
                    } else {
                        output::print_receipt(
                            &format!("Removed {} role(s) from {}", removed, user_id),
                            &receipt,
                            format,
                        )?;
                    }
                }
                _ => output::print_item(
                    &ClearResult {
                        user_id: user_id.to_string(),
                        removed,
                    },
                    format,
                )?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::config::Config;
    use gatekeeper_core::rbac::{Action, PolicyRule};

    #[tokio::test]
    async fn test_clear_requires_force() {
        let gatekeeper = Gatekeeper::from_config(&Config::default()).await.unwrap();
        let user_id = UserId::new("u1");
        gatekeeper
            .admin
            .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
            .await
            .unwrap();
        gatekeeper
            .admin
            .assign_user_role(&user_id, &RoleName::new("viewer"))
            .await
            .unwrap();

        let clear = |force| RoleCommands::Clear {
            user: "u1".to_string(),
            force,
        };

        execute(clear(false), &gatekeeper, OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(
            gatekeeper.admin.role_of_user(&user_id).await.unwrap(),
            RoleName::new("viewer")
        );

        execute(clear(true), &gatekeeper, OutputFormat::Json)
            .await
            .unwrap();
        assert!(gatekeeper.admin.role_of_user(&user_id).await.is_err());
    }
}
