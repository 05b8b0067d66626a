//! Vellum CLI: command-line interface for building and exporting scenes.
//!
//! Usage:
//!   vellum init <DIR>          Create a new scene
//!   vellum add <DIR> <KIND>    Add an element in percent geometry
//!   vellum info <DIR>          Show scene information
//!   vellum validate <DIR>      Validate a scene directory
//!   vellum export <DIR>        Export a scene to PNG

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vellum_common::config::PercentPrecision;

mod commands;

#[derive(Parser)]
#[command(
    name = "vellum",
    about = "Resolution-independent scene composition and export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new scene directory
    Init {
        /// Scene directory to create
        path: PathBuf,

        /// Scene name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Edit canvas width
        #[arg(long)]
        width: Option<u32>,

        /// Edit canvas height
        #[arg(long)]
        height: Option<u32>,

        /// Background image covering the whole canvas
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Add an element to a scene
    Add {
        /// Path to the scene directory
        path: PathBuf,

        #[command(subcommand)]
        element: commands::add::ElementArgs,
    },

    /// Show scene information
    Info {
        /// Path to the scene directory
        path: PathBuf,
    },

    /// Validate a scene directory
    Validate {
        /// Path to the scene directory
        path: PathBuf,
    },

    /// Export a scene to PNG
    Export {
        /// Path to the scene directory
        path: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output width in pixels
        #[arg(long, conflicts_with_all = ["width_mm", "height_mm"])]
        width: Option<u32>,

        /// Output height in pixels
        #[arg(long, conflicts_with_all = ["width_mm", "height_mm"])]
        height: Option<u32>,

        /// Output width in millimetres (96 DPI)
        #[arg(long, requires = "height_mm")]
        width_mm: Option<f64>,

        /// Output height in millimetres (96 DPI)
        #[arg(long, requires = "width_mm")]
        height_mm: Option<f64>,

        /// Precision of the intermediate percent geometry
        #[arg(long, value_enum)]
        precision: Option<PrecisionArg>,
    },
}

/// Percent precision as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Exact,
    WholePercent,
}

impl From<PrecisionArg> for PercentPrecision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Exact => PercentPrecision::Exact,
            PrecisionArg::WholePercent => PercentPrecision::WholePercent,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = vellum_common::config::AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    vellum_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init {
            path,
            name,
            width,
            height,
            image,
        } => commands::init::run(&config, path, name, width, height, image),
        Commands::Add { path, element } => commands::add::run(path, element),
        Commands::Info { path } => commands::info::run(path),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Export {
            path,
            output,
            width,
            height,
            width_mm,
            height_mm,
            precision,
        } => {
            let size = commands::export::SizeArgs {
                width,
                height,
                width_mm,
                height_mm,
            };
            commands::export::run(&config, path, output, size, precision.map(Into::into)).await
        }
    }
}
