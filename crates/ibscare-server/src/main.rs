use clap::Parser;
use ibscare_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use ibscare_server::{ServerBuilder, shutdown_tracing};

/// IBS Care SMART-on-FHIR backend.
#[derive(Debug, Parser)]
#[command(name = "ibscare-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "IBSCARE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level used until the configuration is loaded
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // Initialize tracing early with the CLI level
    ibscare_server::observability::init_tracing_with_level(&cli.log_level);

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %cli.config,
        authority = %cfg.oidc.authority,
        fhir_base = %cfg.fhir.service_base_url(),
        "Configuration loaded"
    );

    ibscare_server::observability::apply_logging_level(&cfg.logging.level);

    let server = ServerBuilder::new().with_config(cfg).build()?;
    let result = server.run().await;

    shutdown_tracing();
    result
}
