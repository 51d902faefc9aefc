use clap::{Args, Subcommand};
use serde_json::json;

use crate::cli::utils::{output_empty_collection, output_success, output_table};
use crate::cli::OutputFormat;
use crate::database::audit::{install_audit_triggers, installed_triggers, remove_audit_triggers};
use crate::database::models::{Tenant, TracerQuery, TracerUpdate};
use crate::resources;
use crate::services::TenantService;
use crate::types::ActionType;

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TenantTarget {
    #[arg(help = "Tenant name")]
    pub tenant: Option<String>,
    #[arg(long, help = "Every registered tenant")]
    pub all: bool,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    #[command(about = "Install the audit trigger function and per-table triggers")]
    Install(TenantTarget),

    #[command(about = "Drop the audit triggers and trigger function")]
    Remove(TenantTarget),

    #[command(about = "Show which audited tables carry a trigger")]
    Status(TenantTarget),

    #[command(about = "Print recent audit log entries")]
    Log {
        #[arg(help = "Tenant name")]
        tenant: String,
        #[arg(long, help = "Only changes to this table")]
        table: Option<String>,
        #[arg(long, help = "Only changes to this record id")]
        key: Option<String>,
        #[arg(long, help = "INSERT, UPDATE or DELETE")]
        action: Option<ActionType>,
        #[arg(long, default_value_t = 20, help = "Number of entries")]
        limit: i64,
    },
}

async fn targets(service: &TenantService, target: &TenantTarget) -> anyhow::Result<Vec<Tenant>> {
    match &target.tenant {
        Some(name) => Ok(vec![service.get_tenant(name).await?]),
        None => Ok(service.list_tenants().await?),
    }
}

pub async fn handle(cmd: AuditCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let service = TenantService::new().await?;
    let tables = resources::audited_tables();

    match cmd {
        AuditCommands::Install(target) => {
            let mut done = Vec::new();
            for tenant in targets(&service, &target).await? {
                let (_, pool) = service.tenant_pool(&tenant.name).await?;
                let count = install_audit_triggers(&pool, &tables).await?;
                done.push(json!({ "tenant": tenant.name, "tables": count }));
            }
            output_success(
                &output_format,
                &format!("Installed audit triggers for {} tenant(s)", done.len()),
                Some(json!(done)),
            )
        }
        AuditCommands::Remove(target) => {
            let mut done = Vec::new();
            for tenant in targets(&service, &target).await? {
                let (_, pool) = service.tenant_pool(&tenant.name).await?;
                let count = remove_audit_triggers(&pool, &tables).await?;
                done.push(json!({ "tenant": tenant.name, "tables": count }));
            }
            output_success(
                &output_format,
                &format!("Removed audit triggers for {} tenant(s)", done.len()),
                Some(json!(done)),
            )
        }
        AuditCommands::Status(target) => {
            let mut rows = Vec::new();
            for tenant in targets(&service, &target).await? {
                let (_, pool) = service.tenant_pool(&tenant.name).await?;
                let installed = installed_triggers(&pool).await?;
                let missing: Vec<&str> = tables
                    .iter()
                    .copied()
                    .filter(|t| !installed.iter().any(|i| i == t))
                    .collect();
                rows.push(json!({
                    "tenant": tenant.name,
                    "installed": installed.len(),
                    "expected": tables.len(),
                    "missing": missing,
                }));
            }
            if rows.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants registered");
            }
            output_table(
                &output_format,
                "tenants",
                json!(rows),
                &[("TENANT", 24), ("TRIGGERS", 10), ("MISSING", 40)],
                |r| {
                    vec![
                        r["tenant"].as_str().unwrap_or_default().to_string(),
                        format!("{}/{}", r["installed"], r["expected"]),
                        r["missing"]
                            .as_array()
                            .map(|m| m.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(","))
                            .unwrap_or_default(),
                    ]
                },
            )
        }
        AuditCommands::Log { tenant, table, key, action, limit } => {
            let (_, pool) = service.tenant_pool(&tenant).await?;
            let query = TracerQuery {
                source_table: table,
                source_key: key,
                action_type: action,
                limit: Some(limit),
                ..Default::default()
            };
            let page = query.fetch(&pool, limit).await?;
            if page.items.is_empty() {
                return output_empty_collection(&output_format, "tracer_updates", "No audit entries");
            }
            let entries: Vec<TracerUpdate> = page
                .items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()?;
            output_table(
                &output_format,
                "tracer_updates",
                serde_json::to_value(&entries)?,
                &[("CHANGED AT", 20), ("BY", 24), ("ACTION", 7), ("TABLE", 16), ("FIELD", 16), ("CHANGE", 40)],
                |r| {
                    let text = |k: &str| r[k].as_str().unwrap_or("∅").to_string();
                    vec![
                        r["changed_at"].as_str().unwrap_or_default().chars().take(19).collect(),
                        text("changed_by"),
                        text("action_type"),
                        text("source_table"),
                        text("field_name"),
                        format!("{} → {}", text("old_value"), text("new_value")),
                    ]
                },
            )
        }
    }
}
