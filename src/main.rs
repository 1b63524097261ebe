//! Students gateway entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use students_gateway::api::{create_router_with_limits, AppState, HttpLimits};
use students_gateway::config::Config;
use students_gateway::metrics;
use students_gateway::student::{BackendClient, ListParams, StudentService};
use students_gateway::utils::shutdown_signal;

/// JSON gateway for the students resource.
#[derive(Parser, Debug)]
#[command(name = "students-gateway")]
#[command(about = "HTTP gateway exposing the students resource as JSON")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Interface to bind, overrides HOST.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Log in to the student backend and list students once.
    CheckBackend,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration (.env first) so logging can follow it
    let loaded = Config::load();
    init_logging(args.verbose, loaded.as_ref().ok());

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(loaded).await,
        Some(Command::CheckBackend) => cmd_check_backend(loaded).await,
        Some(Command::Serve { host, port }) => cmd_serve(loaded, host, port).await,
        None => cmd_serve(loaded, None, None).await,
    }
}

/// Initialize tracing from config, or from defaults when config failed to load.
fn init_logging(verbose: bool, config: Option<&Config>) {
    let verbose = verbose || config.is_some_and(|c| c.verbose);
    let filter = if verbose {
        EnvFilter::new("students_gateway=debug,info")
    } else {
        let directives = config.map_or("info", |c| c.rust_log.as_str());
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if config.is_some_and(Config::json_logs) {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Validate loaded configuration, logging the failure.
fn load_config(loaded: Result<Config, envy::Error>) -> anyhow::Result<Config> {
    let config = loaded.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Check configuration validity.
async fn cmd_check_config(loaded: Result<Config, envy::Error>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("STUDENTS GATEWAY - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match loaded {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Listen Address: {}", config.bind_addr());
    println!("  Backend URL: {}", config.backend_url);
    println!(
        "  Backend Login: {}",
        match &config.backend_username {
            Some(username) => format!("as {}", username),
            None => "Disabled".to_string(),
        }
    );
    println!("  Backend Timeout: {}ms", config.http_timeout_ms);
    println!("  Request Timeout: {}s", config.request_timeout_s);
    println!("  Max Body Size: {} bytes", config.max_body_bytes);
    println!(
        "  Metrics: {}",
        if config.metrics_enabled { "Enabled" } else { "Disabled" }
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Log in to the backend and list students once.
async fn cmd_check_backend(loaded: Result<Config, envy::Error>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("STUDENTS GATEWAY - BACKEND CHECK");
    println!("======================================================================");

    let config = load_config(loaded)?;
    let client = BackendClient::new(&config)?;
    println!("Backend: {}", client.base_url());

    if let Some(credentials) = config.backend_credentials() {
        print!("Logging in as {}... ", credentials.username);
        match client.login(&credentials).await {
            Ok(session) => println!("OK ({} session cookies)", session.len()),
            Err(e) => {
                println!("FAILED");
                println!("  Error: {}", e);
                return Err(anyhow::anyhow!("Backend login failed"));
            }
        }
    }

    print!("Listing students... ");
    match client.get_all_students(&ListParams::new()).await {
        Ok(students) => println!("OK ({} students)", students.len()),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Backend list failed"));
        }
    }

    println!("======================================================================");
    println!("BACKEND CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the HTTP server until a shutdown signal arrives.
async fn cmd_serve(
    loaded: Result<Config, envy::Error>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load_config(loaded)?;

    // Override with CLI args if provided
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    info!("Configuration loaded successfully");
    let client = BackendClient::new(&config)?;
    info!("Backend: {}", client.base_url());
    info!(
        "Backend login: {}",
        if client.has_credentials() { "enabled" } else { "disabled" }
    );

    let mut app_state = AppState::new(Arc::new(client));

    if config.metrics_enabled {
        let handle = metrics::install_recorder()?;
        metrics::init_metrics();
        app_state = app_state.with_metrics(handle);
    }

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router_with_limits(app_state.clone(), HttpLimits::from_config(&config));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    // Spawn HTTP server
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
    });
    app_state.set_ready(true);

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining connections...");
        }
        result = &mut server => {
            app_state.set_ready(false);
            return match result {
                Ok(Ok(())) => {
                    info!("Server stopped");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Server error: {}", e);
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            };
        }
    }

    app_state.set_ready(false);
    shutdown_tx.send(()).ok();

    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped gracefully"),
        Ok(Ok(Err(e))) => error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => error!("Server task failed: {}", e),
        Err(_) => warn!(
            "Graceful shutdown timed out after {}s",
            config.shutdown_timeout_s
        ),
    }

    Ok(())
}
