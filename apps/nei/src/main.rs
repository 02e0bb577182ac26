//! # nei - Non-Equilibrium Ionization
//!
//! The main binary for the nei ionization engine.
//!
//! This application provides:
//! - CLI interface for simulations and the run database
//! - HTTP REST API server (axum-based)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       apps/nei (THE BINARY)                     │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │  │   CLI       │    │   HTTP API  │    │  Run config      │     │
//! │  │  (clap)     │    │   (axum)    │    │  (toml)          │     │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘     │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                    ┌───────────────┐                            │
//! │                    │   nei-core    │                            │
//! │                    │ (THE PHYSICS) │                            │
//! │                    └───────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Write a template and run it
//! nei init --template run.toml
//! nei simulate -c run.toml -l "hot oxygen"
//!
//! # Inspect the run database
//! nei runs
//! nei export -i 1 -o run.csv -t csv
//!
//! # Start the HTTP server
//! nei server --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use nei::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // NEI_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("NEI_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "nei=debug,tower_http=debug"
    } else if cli.quiet {
        "nei=warn"
    } else {
        "nei=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ███╗   ██╗███████╗██╗
  ████╗  ██║██╔════╝██║
  ██╔██╗ ██║█████╗  ██║
  ██║╚██╗██║██╔══╝  ██║
  ██║ ╚████║███████╗██║
  ╚═╝  ╚═══╝╚══════╝╚═╝

  Non-Equilibrium Ionization v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
