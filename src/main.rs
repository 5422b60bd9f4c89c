use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{Result, eyre::WrapErr};
use guardian::{
    config::{AppConfig, loader::load_config},
    server, tracing_setup,
    utils::{is_clean_stop, spawn_signal_handler},
};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file; read as TOML from stdin when omitted
    #[clap(short, long, env = "GUARDIAN_CONFIG", global = true)]
    config: Option<String>,

    #[clap(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the proxy (default)
    Proxy,
    /// Validate configuration and exit
    Validate,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.log_format {
        LogFormat::Json => tracing_setup::init_tracing()?,
        LogFormat::Pretty => tracing_setup::init_console_tracing()?,
    }

    let config = load_config(args.config.as_deref())
        .await
        .wrap_err_with(|| {
            format!(
                "failed to load configuration from {}",
                args.config.as_deref().unwrap_or("stdin")
            )
        })?;

    match args.command.unwrap_or(Commands::Proxy) {
        Commands::Validate => {
            print_summary(&config);
            Ok(())
        }
        Commands::Proxy => run_proxy(config).await,
    }
}

async fn run_proxy(config: AppConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let signals = spawn_signal_handler(cancel.clone());

    tracing::info!(
        servers = config.servers.len(),
        tcp_proxies = config.tcp_proxies.len(),
        healthcheck = %config.healthcheck.address,
        "starting guardian"
    );

    let result = server::run(config, cancel.clone()).await;
    cancel.cancel();
    let _ = signals.await;

    match result {
        Ok(()) => {
            tracing::info!("guardian stopped");
            Ok(())
        }
        Err(e) if is_clean_stop(&e) => {
            tracing::info!("guardian stopped by signal");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn print_summary(config: &AppConfig) {
    println!("configuration is valid");
    println!("  healthcheck: {}{}", config.healthcheck.address, config.healthcheck.path);
    for server in &config.servers {
        println!(
            "  server {}: {} downstreams, {} upstreams, rate limit {}",
            server.address,
            server.downstreams.len(),
            server.upstreams.len(),
            if server.limit.is_enabled() {
                format!("{} rps / burst {}", server.limit.rps, server.limit.burst)
            } else {
                "off".to_string()
            }
        );
    }
    for route in &config.tcp_proxies {
        println!("  tcp {} -> {}", route.src_address, route.dst_address);
    }
}
