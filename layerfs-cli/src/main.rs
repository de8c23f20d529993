use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use layerfs_core::types::MountOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod script;

#[derive(Parser)]
#[command(name = "layerfs")]
#[command(about = "Inspect the per-inode shadow layer of a union filesystem")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script of shadow operations and print the final state
    Replay {
        /// Script to replay
        script: PathBuf,

        /// Mount options, e.g. "xino,udba=notify,noplink"
        #[arg(short, long)]
        options: Option<String>,

        /// JSON file holding the mount options
        #[arg(short, long, conflicts_with = "options")]
        config: Option<PathBuf>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Show the slot flags a mount option string resolves to
    Flags {
        /// Mount options
        #[arg(default_value = "")]
        options: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layerfs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { script, options, config, pretty } => {
            info!("Replaying {}", script.display());
            let report = replay_file(&script, options.as_deref(), config.as_deref())?;
            let out = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", out);
        }
        Commands::Flags { options } => {
            let options: MountOptions = options.parse()?;
            println!("options: {}", options);
            println!("file:    {}", options.slot_flags(false));
            println!("dir:     {}", options.slot_flags(true));
        }
    }

    Ok(())
}

fn replay_file(path: &Path, options: Option<&str>, config: Option<&Path>) -> Result<script::Report> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    let script: script::Script = serde_json::from_str(&raw)
        .with_context(|| format!("parsing script {}", path.display()))?;

    let options = match (config, options, script.options.as_deref()) {
        (Some(config), _, _) => MountOptions::from_json_file(config)
            .with_context(|| format!("loading options from {}", config.display()))?,
        (None, Some(opts), _) | (None, None, Some(opts)) => opts.parse()?,
        (None, None, None) => MountOptions::default(),
    };

    script::replay(&script, options)
}
