use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{Router, middleware};
use clap::Parser;
use color_eyre::{Result, eyre::Context};
use edgeway::{
    adapters::{
        Dispatcher, HttpClientAdapter, OrchestratorClient, TracingSink, create_trace_middleware,
        job_store::open_store, processing_api,
    },
    config::{AppConfig, AppConfigValidator, load_config, load_default_config, loader::SAMPLE_CONFIG},
    core::{ProcessingPipeline, RouteTable},
    tracing_setup,
    utils::GracefulShutdown,
};

const DEFAULT_CONFIG_PATH: &str = "edgeway.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Run the edge gateway
    Gateway {
        /// Configuration file; built-in defaults are used when it does not exist
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Run the text-processing service
    Processor {
        /// Configuration file; built-in defaults are used when it does not exist
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    match Args::parse().command {
        Commands::Validate { config } => validate_config_command(&config).await,
        Commands::Init { config } => init_config_command(&config).await,
        Commands::Gateway { config } => {
            let config = prepare(&config).await?;
            run_gateway(config).await
        }
        Commands::Processor { config } => {
            let config = prepare(&config).await?;
            run_processor(config).await
        }
    }?;

    tracing_setup::shutdown_tracing();
    Ok(())
}

/// Load and validate configuration, then bring up logging.
async fn prepare(config_path: &str) -> Result<AppConfig> {
    let from_file = Path::new(config_path).exists();
    let config = if from_file {
        load_config(config_path)
            .await
            .with_context(|| format!("Failed to load config from {config_path}"))?
    } else {
        load_default_config()?
    };

    AppConfigValidator::validate(&config).context("Invalid configuration")?;
    tracing_setup::init_from_config(&config.logging).context("Failed to initialize tracing")?;

    if from_file {
        tracing::info!("Loaded configuration from {config_path}");
    } else {
        tracing::warn!("Configuration file {config_path} not found, using built-in defaults");
    }

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    Ok(config)
}

async fn run_gateway(config: AppConfig) -> Result<()> {
    let gateway = &config.gateway;
    let routes = Arc::new(
        RouteTable::build(&gateway.routes, config.environment)
            .context("Failed to build route table")?,
    );

    for route in routes.routes() {
        tracing::info!(
            route_id = %route.id,
            patterns = ?route.patterns.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            target = %route.target,
            enabled = route.enabled,
            "Configured route"
        );
    }

    let upstream_timeout = gateway
        .upstream_timeout_duration()
        .context("Invalid gateway.upstream_timeout")?;
    let http_client = HttpClientAdapter::new()
        .context("Failed to create HTTP client adapter")?
        .with_timeout(upstream_timeout);

    let app = Dispatcher::new(routes, Arc::new(http_client))
        .with_health_path(gateway.health_path.clone())
        .into_router()
        .layer(middleware::from_fn(create_trace_middleware(Arc::new(
            TracingSink,
        ))));

    tracing::info!(
        "Starting edgeway gateway on {} (environment: {})",
        gateway.listen_addr,
        config.environment
    );
    serve(&gateway.listen_addr, app).await
}

async fn run_processor(config: AppConfig) -> Result<()> {
    let processor = &config.processor;

    let store = open_store(&processor.store)
        .await
        .context("Failed to open job store")?;
    let orchestrator = OrchestratorClient::from_config(&processor.orchestrator)
        .context("Failed to create orchestrator client")?;
    tracing::info!("Forwarding processing requests to {}", orchestrator.endpoint());

    let pipeline = Arc::new(ProcessingPipeline::new(store, Arc::new(orchestrator)));
    let app = processing_api::router(pipeline, &processor.base_path).layer(
        middleware::from_fn(create_trace_middleware(Arc::new(TracingSink))),
    );

    tracing::info!(
        "Starting edgeway processor on {} (base path: {})",
        processor.listen_addr,
        processor.base_path
    );
    serve(&processor.listen_addr, app).await
}

/// Serve `app` until a shutdown signal arrives, then give in-flight
/// requests the drain timeout to finish.
async fn serve(listen_addr: &str, app: Router) -> Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let graceful_shutdown = GracefulShutdown::new();

    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let server_shutdown = graceful_shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            server_shutdown.wait_for_shutdown_signal().await;
        })
        .await
    });

    tracing::info!("Listening on {}", addr);

    tokio::select! {
        result = &mut server => {
            return result.context("Server task failed")?.context("Server error");
        }
        reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
        }
    }

    match tokio::time::timeout(graceful_shutdown.drain_timeout(), server).await {
        Ok(result) => result.context("Server task failed")?.context("Server error")?,
        Err(_) => tracing::warn!(
            "Connections still open after {:?}, shutting down anyway",
            graceful_shutdown.drain_timeout()
        ),
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match AppConfigValidator::validate(&config) {
        Ok(()) => {
            let enabled = config.gateway.routes.iter().filter(|r| r.enabled).count();
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Environment: {}", config.environment);
            println!("   • Gateway Listen Address: {}", config.gateway.listen_addr);
            println!(
                "   • Routes: {} ({} enabled)",
                config.gateway.routes.len(),
                enabled
            );
            println!(
                "   • Processor Listen Address: {}",
                config.processor.listen_addr
            );
            println!(
                "   • Orchestrator: {}",
                config.processor.orchestrator.base_url
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure route ids are unique and every route has at least one path");
            println!("   • Ensure route targets use http, https, ws or wss");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Ensure durations use valid units (s, m, h)");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, SAMPLE_CONFIG)
        .await
        .with_context(|| format!("Failed to write {config_path}"))?;

    println!("✅ Created configuration file: {config_path}");
    println!("   Run `edgeway validate -c {config_path}` to check it.");
    Ok(())
}
