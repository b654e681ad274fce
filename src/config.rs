use anyhow::Result;
use dotenvy::dotenv;
use ipnet::IpNet;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const SANDBOX_BASE_URL: &str = "https://cybqa.pesapal.com/pesapalv3";
pub const PRODUCTION_BASE_URL: &str = "https://pay.pesapal.com/v3";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_request_body: bool,
    pub log_format: LogFormat,
}

/// Settings for the payment aggregator. `base_url` follows `environment`
/// unless `GATEWAY_BASE_URL` overrides it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: PaymentEnvironment,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_url: String,
    pub notification_id: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub shared_secret: String,
    pub allowed_ips: AllowedIps,
    pub trusted_proxy_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEnvironment {
    Sandbox,
    Production,
}

impl PaymentEnvironment {
    pub fn default_base_url(self) -> &'static str {
        match self {
            PaymentEnvironment::Sandbox => SANDBOX_BASE_URL,
            PaymentEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl FromStr for PaymentEnvironment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" | "development" => Ok(PaymentEnvironment::Sandbox),
            "production" | "live" => Ok(PaymentEnvironment::Production),
            other => anyhow::bail!("PAYMENT_ENVIRONMENT must be 'sandbox' or 'production', got '{}'", other),
        }
    }
}

impl fmt::Display for PaymentEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentEnvironment::Sandbox => f.write_str("sandbox"),
            PaymentEnvironment::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedIps {
    Any,
    Cidrs(Vec<IpNet>),
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let environment: PaymentEnvironment = env::var("PAYMENT_ENVIRONMENT")
            .unwrap_or_else(|_| "sandbox".to_string())
            .parse()?;

        let gateway = GatewayConfig {
            environment,
            base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| environment.default_base_url().to_string()),
            consumer_key: env::var("GATEWAY_CONSUMER_KEY")?,
            consumer_secret: env::var("GATEWAY_CONSUMER_SECRET")?,
            callback_url: env::var("GATEWAY_CALLBACK_URL")?,
            notification_id: env::var("GATEWAY_NOTIFICATION_ID").unwrap_or_default(),
            timeout: Duration::from_secs(
                env::var("GATEWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            ),
        };

        let webhook = WebhookConfig {
            shared_secret: env::var("WEBHOOK_SHARED_SECRET")?,
            allowed_ips: parse_allowed_ips(
                &env::var("WEBHOOK_ALLOWED_IPS").unwrap_or_else(|_| "*".to_string()),
            )?,
            trusted_proxy_depth: env::var("TRUSTED_PROXY_DEPTH")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
        };

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            gateway,
            webhook,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|raw| parse_origins(&raw))
                .filter(|origins| !origins.is_empty()),
            log_request_body: env::var("LOG_REQUEST_BODY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            log_format: parse_log_format(&env::var("LOG_FORMAT").unwrap_or_default()),
        })
    }
}

pub fn parse_allowed_ips(raw: &str) -> anyhow::Result<AllowedIps> {
    let value = raw.trim();
    if value == "*" {
        return Ok(AllowedIps::Any);
    }

    let cidrs = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse::<IpNet>)
        .collect::<Result<Vec<_>, _>>()?;

    if cidrs.is_empty() {
        anyhow::bail!("WEBHOOK_ALLOWED_IPS must be '*' or a comma-separated list of CIDRs");
    }

    Ok(AllowedIps::Cidrs(cidrs))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_log_format(raw: &str) -> LogFormat {
    if raw.trim().eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_any_ip() {
        assert_eq!(parse_allowed_ips(" * ").unwrap(), AllowedIps::Any);
    }

    #[test]
    fn parses_cidr_list() {
        let parsed = parse_allowed_ips("196.201.214.0/24, 10.0.0.1/32").unwrap();
        match parsed {
            AllowedIps::Cidrs(cidrs) => assert_eq!(cidrs.len(), 2),
            AllowedIps::Any => panic!("expected CIDR list"),
        }
    }

    #[test]
    fn rejects_empty_or_malformed_allow_list() {
        assert!(parse_allowed_ips(",,").is_err());
        assert!(parse_allowed_ips("not-a-cidr").is_err());
    }

    #[test]
    fn environment_selects_base_url() {
        let sandbox: PaymentEnvironment = "Sandbox".parse().unwrap();
        let live: PaymentEnvironment = "production".parse().unwrap();

        assert_eq!(sandbox.default_base_url(), SANDBOX_BASE_URL);
        assert_eq!(live.default_base_url(), PRODUCTION_BASE_URL);
        assert!("staging".parse::<PaymentEnvironment>().is_err());
    }

    #[test]
    fn parses_origins_and_log_format() {
        assert_eq!(
            parse_origins("https://shop.example, ,http://localhost:5173"),
            vec!["https://shop.example".to_string(), "http://localhost:5173".to_string()]
        );
        assert_eq!(parse_log_format("JSON"), LogFormat::Json);
        assert_eq!(parse_log_format(""), LogFormat::Text);
    }
}
