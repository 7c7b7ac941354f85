//! Permission checks against the loaded enforcer.

use anyhow::{bail, Result};
use clap::Args;
use gatekeeper_core::rbac::{normalize_resource_path, Action, Decision};
use gatekeeper_core::Gatekeeper;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// User to check
    user: String,

    /// Resource path, e.g. /api/users or /api/users/42
    resource: String,

    /// Action to check
    #[arg(short, long, conflicts_with = "method")]
    action: Option<Action>,

    /// HTTP method, mapped to an action the way the middleware does
    #[arg(short, long)]
    method: Option<String>,
}

#[derive(Args)]
pub struct PermissionsArgs {
    /// User whose permissions to resolve
    user: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    user_id: String,
    resource: String,
    action: Action,
    allowed: bool,
    via_role: Option<String>,
    reason: Option<String>,
    generation: u64,
}

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Actions")]
    actions: String,
}

pub fn execute(args: CheckArgs, gatekeeper: &Gatekeeper, format: OutputFormat) -> Result<()> {
    let action = match (args.action, args.method.as_deref()) {
        (Some(action), _) => action,
        (None, Some(method)) => match Action::from_method(method) {
            Some(action) => action,
            None => bail!("Method {} has no action mapping and is always denied", method),
        },
        (None, None) => Action::Read,
    };

    let resource = normalize_resource_path(&args.resource);
    let decision = gatekeeper.enforcer.decide(&args.user, &resource, action);

    let result = CheckResult {
        user_id: args.user,
        resource,
        action,
        allowed: decision.is_allowed(),
        via_role: match &decision {
            Decision::Allow { via_role } => Some(via_role.to_string()),
            Decision::Deny(_) => None,
        },
        reason: match decision {
            Decision::Deny(reason) => Some(reason),
            Decision::Allow { .. } => None,
        },
        generation: gatekeeper.enforcer.generation(),
    };

    match format {
        OutputFormat::Table => {
            let subject = format!("{} {} {}", result.user_id, result.action, result.resource);
            match (&result.via_role, &result.reason) {
                (Some(role), _) => {
                    output::print_success(&format!("ALLOW {} (via role {})", subject, role))
                }
                (None, reason) => output::print_error(&format!(
                    "DENY {}: {}",
                    subject,
                    reason.as_deref().unwrap_or("no matching rule")
                )),
            }
            Ok(())
        }
        _ => output::print_item(&result, format),
    }
}

pub fn permissions(
    args: PermissionsArgs,
    gatekeeper: &Gatekeeper,
    format: OutputFormat,
) -> Result<()> {
    let permissions = gatekeeper.enforcer.effective_permissions(&args.user);

    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Permissions: {}", permissions.user_id));
            output::print_detail(
                "Role",
                permissions.role.as_ref().map_or("(none)", |r| r.as_str()),
            );
            let roles: Vec<&str> = permissions
                .effective_roles
                .iter()
                .map(|r| r.as_str())
                .collect();
            output::print_detail("Effective roles", &roles.join(", "));
            println!();

            let rows: Vec<PermissionRow> = permissions
                .resources
                .iter()
                .map(|(resource, actions)| PermissionRow {
                    resource: resource.clone(),
                    actions: join_actions(actions),
                })
                .collect();
            output::print_list(&rows, format)
        }
        _ => output::print_item(&permissions, format),
    }
}

pub(crate) fn join_actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
