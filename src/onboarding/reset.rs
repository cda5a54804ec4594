//! Bulk reset of onboarding resources.
//!
//! Deletes every role carrying the temporary prefix and every workspace
//! under the verification area. A role the agent may not delete is audited
//! and skipped; the sweep always runs to the end.

use serde::Serialize;

use crate::audit::{AuditEntry, Auditor, Severity};
use crate::error::ProviderError;
use crate::names;
use crate::platform::{ChannelId, WorkspaceProvider};

/// What a reset removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub removed_roles: Vec<String>,
    /// Roles whose deletion was refused for lack of permission.
    pub forbidden_roles: Vec<String>,
    pub removed_workspaces: Vec<String>,
}

/// Sweep temporary roles and every workspace under `area`.
///
/// Only listing failures abort the sweep.
pub async fn reset_server(
    provider: &dyn WorkspaceProvider,
    auditor: &dyn Auditor,
    area: ChannelId,
) -> Result<ResetReport, ProviderError> {
    let mut report = ResetReport::default();

    for role in provider.list_roles().await? {
        if !names::is_temp_role(&role.name) {
            continue;
        }
        match provider.delete_role(role.id).await {
            Ok(()) => report.removed_roles.push(role.name),
            Err(e) if e.is_forbidden() => {
                auditor
                    .record(AuditEntry::new(
                        Severity::Error,
                        format!("The role {} cannot be removed!", role.name),
                    ))
                    .await;
                report.forbidden_roles.push(role.name);
            }
            Err(e) => {
                tracing::warn!(role = %role.name, error = %e, "Failed to delete role during reset");
            }
        }
    }
    auditor
        .record(summary("Roles", "roles", &report.removed_roles))
        .await;

    for workspace in provider.list_workspaces(area).await? {
        match provider.delete_workspace(workspace.id).await {
            Ok(()) => report.removed_workspaces.push(workspace.name),
            Err(e) => {
                tracing::warn!(workspace = %workspace.name, error = %e, "Failed to delete workspace during reset");
            }
        }
    }
    auditor
        .record(summary("Channels", "channels", &report.removed_workspaces))
        .await;

    tracing::info!(
        roles = report.removed_roles.len(),
        workspaces = report.removed_workspaces.len(),
        "Server reset"
    );
    Ok(report)
}

fn summary(label: &str, noun: &str, removed: &[String]) -> AuditEntry {
    if removed.is_empty() {
        AuditEntry::new(Severity::Info, format!("No {noun} were removed!"))
    } else {
        AuditEntry::new(
            Severity::Success,
            format!("{label} {} have been swept up!", removed.join(", ")),
        )
    }
}
