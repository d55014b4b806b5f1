pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;
pub mod storage;

use anyhow::Context;
pub use config::Config;
use db::Store;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "medivault")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("daemon" | "-d" | "--daemon") => run_daemon(config, prometheus_handle).await,

        Some("init" | "--init") => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        Some("create-admin") => {
            if args.len() < 4 {
                println!("Usage: medivault create-admin <email> <name> [password]");
                return Ok(());
            }
            let email = &args[2];
            let name = &args[3];
            let password = args.get(4).cloned();
            cmd_create_admin(&config, email, name, password).await
        }

        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(())
        }

        Some(other) => {
            println!("Unknown command: {other}");
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("MediVault - Medical document administration service");
    println!();
    println!("USAGE:");
    println!("  medivault [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("  daemon            Run the API server (default)");
    println!("  create-admin <email> <name> [password]");
    println!("                    Create an administrator account");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml or set MEDIVAULT_* environment variables.");
}

async fn cmd_create_admin(
    config: &Config,
    email: &str,
    name: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let store = Store::new(&config.database.url).await?;

    if store.get_account_by_email(email).await?.is_some() {
        println!("An account with email {email} already exists.");
        return Ok(());
    }

    // Generated password is printed once; 32 hex chars of entropy.
    let password = password
        .unwrap_or_else(|| db::repositories::token::generate_token()[..32].to_string());

    let account = store
        .create_admin_account(name, email, &password, &config.security)
        .await?;

    println!("✓ Admin account created");
    println!("  Email:    {}", account.email);
    println!("  Password: {password}");
    println!();
    println!("Change this password after the first login.");

    Ok(())
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "MediVault v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let port = config.server.port;
    let state = api::create_app_state_from_config(config, prometheus_handle).await?;

    let app = api::router(state).await;
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server_handle = tokio::spawn(async move {
        info!("API server running at http://0.0.0.0:{port}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {e}");
        }
    });

    info!("Daemon running. Press Ctrl+C to stop.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    server_handle.abort();
    info!("Daemon stopped");

    Ok(())
}
