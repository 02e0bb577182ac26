//! # nei CLI Module
//!
//! ## Available Commands
//!
//! - `simulate` - Run a simulation from a TOML file and store it
//! - `equilibrium` - Print equilibrium ionic fractions
//! - `shock` - Rankine-Hugoniot jump conditions
//! - `runs` - List stored runs
//! - `show` - Show one stored run
//! - `export` - Export a stored run to a file
//! - `hash` - BLAKE3 hash of a stored run
//! - `remove` - Delete a stored run
//! - `init` - Initialize a new run database, optionally writing a run template
//! - `server` - Start the HTTP server

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use nei_core::NeiError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// nei - non-equilibrium ionization modeling
///
/// Evolves the ionization state of plasmas through temperature and density
/// histories and keeps the results in a run database.
#[derive(Parser, Debug)]
#[command(name = "nei")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (per-step progress)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner and progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the run database
    #[arg(short = 'D', long, global = true, default_value = "nei.db")]
    pub database: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// File formats a run can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunFormat {
    /// Persistence format (header + postcard)
    Binary,
    /// Canonical export with checksum header
    Canonical,
    Json,
    Csv,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation described by a TOML file and store it
    Simulate {
        /// Path to the run configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Also write the results to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Format of the output file
        #[arg(short = 't', long, value_enum, default_value = "binary")]
        format: RunFormat,

        /// Label stored with the run
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Print equilibrium ionic fractions of an element
    Equilibrium {
        /// Element symbol, name or atomic number
        #[arg(short, long)]
        element: String,

        /// Electron temperature in kelvin
        #[arg(short, long)]
        temperature: f64,

        /// JSON rate table (default: hydrogenic rates)
        #[arg(short, long)]
        rates: Option<PathBuf>,
    },

    /// Rankine-Hugoniot jump conditions
    Shock {
        /// Adiabatic index
        #[arg(short, long, default_value = "1.6666666666666667")]
        gamma: f64,

        /// Upstream Mach number
        #[arg(short, long)]
        mach: f64,

        /// Upstream number density (cm^-3)
        #[arg(short, long)]
        density: Option<f64>,

        /// Upstream temperature (K)
        #[arg(short, long)]
        temperature: Option<f64>,
    },

    /// List stored runs
    Runs,

    /// Show a stored run
    Show {
        #[arg(short, long)]
        id: u64,
    },

    /// Export a stored run
    Export {
        #[arg(short, long)]
        id: u64,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short = 't', long, value_enum, default_value = "canonical")]
        format: RunFormat,
    },

    /// Compute the BLAKE3 hash of a stored run
    Hash {
        #[arg(short, long)]
        id: u64,
    },

    /// Delete a stored run
    Remove {
        #[arg(short, long)]
        id: u64,
    },

    /// Initialize a new empty run database
    Init {
        /// Force initialization even if the database exists
        #[arg(short, long)]
        force: bool,

        /// Also write a run configuration template to this path
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), NeiError> {
    let db = &cli.database;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Simulate {
            config,
            output,
            format,
            label,
        }) => cmd_simulate(
            db,
            json_mode,
            &config,
            output.as_deref(),
            format,
            label.as_deref(),
        ),
        Some(Commands::Equilibrium {
            element,
            temperature,
            rates,
        }) => cmd_equilibrium(json_mode, &element, temperature, rates.as_deref()),
        Some(Commands::Shock {
            gamma,
            mach,
            density,
            temperature,
        }) => cmd_shock(json_mode, gamma, mach, density, temperature),
        Some(Commands::Runs) | None => cmd_runs(db, json_mode),
        Some(Commands::Show { id }) => cmd_show(db, json_mode, id),
        Some(Commands::Export { id, output, format }) => cmd_export(db, id, &output, format),
        Some(Commands::Hash { id }) => cmd_hash(db, json_mode, id),
        Some(Commands::Remove { id }) => cmd_remove(db, id),
        Some(Commands::Init { force, template }) => cmd_init(db, force, template.as_deref()),
        Some(Commands::Server { host, port }) => cmd_server(db, &host, port).await,
    }
}
