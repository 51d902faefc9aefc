use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::manager::DatabaseManager;
use crate::services::TenantService;

#[derive(Subcommand)]
pub enum RegistryCommands {
    #[command(about = "Create the registry database and tenants table")]
    Init,
}

pub async fn handle(cmd: RegistryCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        RegistryCommands::Init => {
            let created = TenantService::init_registry().await?;
            let message = if created {
                format!("Created registry database {}", DatabaseManager::SYSTEM_DB_NAME)
            } else {
                format!("Registry database {} is up to date", DatabaseManager::SYSTEM_DB_NAME)
            };
            output_success(
                &output_format,
                &message,
                Some(json!({ "database": DatabaseManager::SYSTEM_DB_NAME, "created": created })),
            )
        }
    }
}
