pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "dashboard")]
#[command(about = "Dashboard CLI - registry, tenant, audit trigger and seed administration")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Registry database setup")]
    Registry {
        #[command(subcommand)]
        cmd: commands::registry::RegistryCommands,
    },

    #[command(about = "Tenant database management")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Audit trigger setup and audit log inspection")]
    Audit {
        #[command(subcommand)]
        cmd: commands::audit::AuditCommands,
    },

    #[command(about = "Load a YAML fixture into a tenant")]
    Seed(commands::seed::SeedArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Registry { cmd } => commands::registry::handle(cmd, output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
        Commands::Audit { cmd } => commands::audit::handle(cmd, output_format).await,
        Commands::Seed(args) => commands::seed::handle(args, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands_and_global_flags() {
        let cli = Cli::try_parse_from(["dashboard", "tenant", "create", "acme", "--json"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Tenant { cmd: commands::tenant::TenantCommands::Create { ref name } } if name == "acme"
        ));

        let cli = Cli::try_parse_from(["dashboard", "audit", "install", "--all"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Text);
    }

    #[test]
    fn audit_target_requires_tenant_or_all() {
        assert!(Cli::try_parse_from(["dashboard", "audit", "install"]).is_err());
        assert!(Cli::try_parse_from(["dashboard", "audit", "install", "acme", "--all"]).is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
