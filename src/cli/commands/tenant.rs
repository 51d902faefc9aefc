use clap::Subcommand;
use serde_json::json;
use std::sync::Arc;

use crate::auth::identity::BaasIdentity;
use crate::cli::utils::{output_empty_collection, output_success, output_table};
use crate::cli::OutputFormat;
use crate::config;
use crate::services::TenantService;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Create a tenant database, load the schema and register it")]
    Create {
        #[arg(help = "Tenant name (letters, numbers, hyphens, underscores)")]
        name: String,
    },

    #[command(about = "List registered tenants")]
    List,

    #[command(about = "Allow logins to a tenant")]
    Activate {
        #[arg(help = "Tenant name")]
        name: String,
    },

    #[command(about = "Block logins and API access for a tenant")]
    Deactivate {
        #[arg(help = "Tenant name")]
        name: String,
    },

    #[command(about = "Create the first SUPER_ADMIN for a tenant")]
    BootstrapAdmin {
        #[arg(help = "Tenant name")]
        tenant: String,
        #[arg(long, help = "Admin email address")]
        email: String,
        #[arg(long, help = "Display name", default_value = "Administrator")]
        name: String,
        #[arg(long, env = "DASHBOARD_ADMIN_PASSWORD", hide_env_values = true, help = "Initial password")]
        password: String,
    },
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let service = TenantService::new().await?;

    match cmd {
        TenantCommands::Create { name } => {
            let tenant = service.create_tenant(&name).await?;
            output_success(
                &output_format,
                &format!("Created tenant '{}' ({})", tenant.name, tenant.database),
                Some(serde_json::to_value(&tenant)?),
            )
        }
        TenantCommands::List => {
            let tenants = service.list_tenants().await?;
            if tenants.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants registered");
            }
            output_table(
                &output_format,
                "tenants",
                serde_json::to_value(&tenants)?,
                &[("NAME", 24), ("DATABASE", 24), ("ACTIVE", 7), ("CREATED", 16)],
                |t| {
                    vec![
                        t["name"].as_str().unwrap_or_default().to_string(),
                        t["database"].as_str().unwrap_or_default().to_string(),
                        if t["is_active"].as_bool().unwrap_or(false) { "yes" } else { "no" }.to_string(),
                        t["created_at"].as_str().unwrap_or_default().chars().take(16).collect(),
                    ]
                },
            )
        }
        TenantCommands::Activate { name } => {
            service.set_active(&name, true).await?;
            output_success(
                &output_format,
                &format!("Activated tenant '{}'", name),
                Some(json!({ "name": name, "is_active": true })),
            )
        }
        TenantCommands::Deactivate { name } => {
            service.set_active(&name, false).await?;
            output_success(
                &output_format,
                &format!("Deactivated tenant '{}'", name),
                Some(json!({ "name": name, "is_active": false })),
            )
        }
        TenantCommands::BootstrapAdmin { tenant, email, name, password } => {
            let identity = Arc::new(BaasIdentity::new(&config::config().identity));
            let user = service
                .bootstrap_admin(&tenant, identity, &email, &password, &name)
                .await?;
            output_success(
                &output_format,
                &format!("Created SUPER_ADMIN {} for '{}'", user.email, tenant),
                Some(serde_json::to_value(&user)?),
            )
        }
    }
}
