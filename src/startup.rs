use crate::config::Config;
use crate::gateway::GatewayClient;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Gateway Credentials:   {}", status(self.gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

/// Checks configuration, then the database (when a pool is given) and the
/// gateway credentials.
pub async fn validate_environment(config: &Config, pool: Option<&PgPool>) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        gateway: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Some(pool) = pool {
        if let Err(e) = validate_database(pool).await {
            report.database = false;
            report.errors.push(format!("Database: {}", e));
        }
    }

    if let Err(e) = validate_gateway(config).await {
        report.gateway = false;
        report.errors.push(format!("Gateway: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.gateway.consumer_key.is_empty() || config.gateway.consumer_secret.is_empty() {
        anyhow::bail!("GATEWAY_CONSUMER_KEY and GATEWAY_CONSUMER_SECRET must be set");
    }
    if config.webhook.shared_secret.is_empty() {
        anyhow::bail!("WEBHOOK_SHARED_SECRET is empty");
    }
    if config.gateway.notification_id.is_empty() {
        tracing::warn!("GATEWAY_NOTIFICATION_ID is empty; run `gateway register-ipn` first");
    }

    url::Url::parse(&config.gateway.base_url).context("GATEWAY_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.gateway.callback_url)
        .context("GATEWAY_CALLBACK_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_gateway(config: &Config) -> Result<()> {
    GatewayClient::new(&config.gateway)
        .request_token()
        .await
        .context("Failed to obtain a gateway token")?;

    Ok(())
}
