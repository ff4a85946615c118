//! waveplan CLI entry point
//!
//! - `waveplan verify|mark|skip-wave2|status|count` - stage gate for a session
//! - `waveplan classify|plan` - query classification and perspective planning
//! - `waveplan analyze|sources` - wave scoring, source gate and pivot decision
//! - `waveplan cache stats|clear|prune` - classification cache maintenance

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use waveplan::cli::{commands, output::Output, Cli};
use waveplan::utils::config::LoggingConfig;

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed flags
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = Output::from_flags(cli.no_color);

    if let Err(e) = run(&cli, &output).await {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, output: &Output) -> anyhow::Result<()> {
    let manager = commands::load_config(cli)?;
    let config = manager.config();
    init_tracing(&config.logging, cli.verbose);
    commands::run(cli, &config, output).await
}

/// `--verbose` forces debug; otherwise `RUST_LOG`, then `[logging].level`
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
