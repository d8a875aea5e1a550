//! tmctl - command-line client for the tenant cost API
//!
//! Lists tenants, current and monthly costs, raw requests and quotas.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{costs, usage};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Tenant cost CLI
#[derive(Parser)]
#[command(name = "tmctl")]
#[command(author, version, about = "CLI for per-tenant Kubernetes costs", long_about = None)]
pub struct Cli {
    /// API endpoint URL [default: http://localhost:8000]
    #[arg(long, env = "TMCTL_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the API
    #[arg(long, env = "TMCTL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format [default: table]
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tenants the token grants access to
    Tenants,

    /// View tenant costs
    #[command(subcommand)]
    Costs(CostsCommands),

    /// Show requested resources without discounts
    Requests {
        /// Resource kind (cpu, memory, storage, ingress)
        kind: String,

        /// Only this tenant
        #[arg(long, short)]
        tenant: Option<String>,
    },

    /// Show the resource quota of a tenant
    Quotas {
        tenant: String,
    },
}

#[derive(Subcommand)]
pub enum CostsCommands {
    /// Show current costs by resource kind
    Show {
        /// Only this tenant (all authorized tenants if not specified)
        #[arg(long, short)]
        tenant: Option<String>,
    },

    /// Show stored monthly summaries
    Monthly {
        tenant: String,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let file = config::Config::load()?;

    let api_url = cli
        .api_url
        .or(file.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let token = cli.token.or(file.token);
    let format = cli
        .format
        .or_else(|| {
            file.default_format
                .as_deref()
                .and_then(|f| OutputFormat::from_str(f, true).ok())
        })
        .unwrap_or_default();

    let client = client::ApiClient::new(&api_url, token)?;

    match cli.command {
        Commands::Tenants => usage::list_tenants(&client, format).await?,
        Commands::Costs(costs_cmd) => match costs_cmd {
            CostsCommands::Show { tenant } => costs::show_costs(&client, tenant, format).await?,
            CostsCommands::Monthly { tenant } => {
                costs::show_monthly(&client, &tenant, format).await?
            }
        },
        Commands::Requests { kind, tenant } => {
            usage::show_requests(&client, &kind, tenant, format).await?
        }
        Commands::Quotas { tenant } => usage::show_quotas(&client, &tenant, format).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
