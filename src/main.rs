use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_payments::adapters::{InMemoryTransactionRepository, PostgresTransactionRepository};
use storefront_payments::cli::{self, Cli, Commands, DbCommands, GatewayCommands};
use storefront_payments::config::{Config, LogFormat, PaymentEnvironment};
use storefront_payments::gateway::GatewayClient;
use storefront_payments::ports::TransactionRepository;
use storefront_payments::{create_app, db, AppState, RouterOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Routes) = cli.command {
        cli::handle_routes();
        return Ok(());
    }

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        Some(Commands::Serve { in_memory }) => serve(config, in_memory).await,
        None => serve(config, false).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Gateway(GatewayCommands::RegisterIpn { url })) => {
            cli::handle_register_ipn(&config, &url).await
        }
        Some(Commands::Config) => cli::handle_config_validate(&config).await,
        Some(Commands::Routes) => Ok(()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn serve(config: Config, in_memory: bool) -> anyhow::Result<()> {
    let transactions: Arc<dyn TransactionRepository> = if in_memory {
        if config.gateway.environment == PaymentEnvironment::Production {
            anyhow::bail!("--in-memory is only allowed with PAYMENT_ENVIRONMENT=sandbox");
        }
        tracing::warn!("using in-memory transaction store; nothing survives a restart");
        Arc::new(InMemoryTransactionRepository::new())
    } else {
        let pool = db::create_pool(&config).await?;
        db::run_migrations(&pool).await?;
        Arc::new(PostgresTransactionRepository::new(pool))
    };

    let gateway = GatewayClient::new(&config.gateway);
    tracing::info!(
        environment = %config.gateway.environment,
        base_url = %gateway.base_url(),
        "payment gateway client initialized"
    );

    let state = AppState::new(&config, transactions, gateway);
    let app = create_app(state, RouterOptions::from_config(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
