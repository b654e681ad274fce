use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::gateway::GatewayClient;
use crate::ROUTES;

#[derive(Parser)]
#[command(name = "storefront-payments")]
#[command(about = "Storefront payments - gateway proxy and webhook reconciler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Keep transactions in memory instead of Postgres (sandbox runs only)
        #[arg(long)]
        in_memory: bool,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Payment gateway commands
    #[command(subcommand)]
    Gateway(GatewayCommands),

    /// Print the HTTP route table
    Routes,

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum GatewayCommands {
    /// Register the webhook URL with the gateway and print its notification id
    RegisterIpn {
        /// Publicly reachable webhook URL
        #[arg(value_name = "URL")]
        url: String,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_register_ipn(config: &Config, url: &str) -> anyhow::Result<()> {
    url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid IPN URL '{}': {}", url, e))?;

    let client = GatewayClient::new(&config.gateway);
    let token = client.request_token().await?;
    let ipn_id = client.register_ipn(&token, url).await?;

    tracing::info!(ipn_id = %ipn_id, url = %url, "IPN URL registered");
    println!("✓ IPN registered with {}", config.gateway.environment);
    println!("  Set GATEWAY_NOTIFICATION_ID={}", ipn_id);

    Ok(())
}

pub fn handle_routes() {
    println!("{:<6} {:<32} {}", "Method", "Path", "Description");
    println!("{}", "-".repeat(80));
    for route in ROUTES {
        println!("{:<6} {:<32} {}", route.method, route.path, route.description);
    }
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Payment Environment: {}", config.gateway.environment);
    println!("  Gateway URL: {}", config.gateway.base_url);
    println!("  Gateway Consumer Key: {}", mask_secret(&config.gateway.consumer_key));
    println!("  Callback URL: {}", config.gateway.callback_url);
    println!("  Webhook Allowed IPs: {:?}", config.webhook.allowed_ips);

    let pool = match crate::db::create_pool(config).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(error = %e, "could not connect to database");
            None
        }
    };

    let mut report = crate::startup::validate_environment(config, pool.as_ref()).await?;
    if pool.is_none() {
        report.database = false;
        report.errors.push("Database: connection failed".to_string());
    }
    report.print();

    if !report.is_valid() {
        anyhow::bail!("configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_secret(value: &str) -> String {
    match value.get(..4) {
        Some(head) if value.len() > 8 => format!("{}****", head),
        _ => "****".to_string(),
    }
}
