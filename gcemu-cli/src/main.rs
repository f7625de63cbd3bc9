// CLI application
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

mod commands;
mod config;

use commands::RunOptions;
use config::EmulatorConfig;

#[derive(Parser)]
#[command(name = "gcemu")]
#[command(about = "GameCube CPU interpreter")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Load a DOL (or a disc's boot DOL) and run it
    Run {
        /// Path to a .dol file or disc image
        image: PathBuf,

        /// Stop after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,

        /// Log every executed instruction at trace level
        #[arg(long)]
        trace: bool,

        /// Keep the last N instructions in the trace recorder
        #[arg(long)]
        trace_limit: Option<usize>,

        /// Write recorded instructions to this JSON file
        #[arg(long)]
        trace_json: Option<PathBuf>,
    },
    /// Disassemble instructions from a program image
    Disasm {
        /// Path to a .dol file or disc image
        image: PathBuf,

        /// First address (hex); defaults to the entry point
        #[arg(short, long, value_parser = parse_address)]
        start: Option<u32>,

        /// Number of instructions
        #[arg(short = 'n', long, default_value = "32")]
        count: usize,
    },
    /// Show DOL sections, or disc header and file list
    Info {
        /// Path to a .dol file or disc image
        image: PathBuf,
    },
    /// Copy a file out of a disc image
    Extract {
        /// Path to the disc image
        disc: PathBuf,

        /// File name or path on disc, e.g. main.dol or /sys/main.dol
        file: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_address(value: &str) -> Result<u32, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).map_err(|err| format!("invalid address {value:?}: {err}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = EmulatorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            image,
            max_steps,
            trace,
            trace_limit,
            trace_json,
        } => {
            if max_steps.is_some() {
                config.max_steps = max_steps;
            }
            if let Some(limit) = trace_limit {
                config.trace_limit = limit;
            }
            if trace_json.is_some() && config.trace_limit == 0 {
                log::warn!("--trace-json has no effect without a trace limit");
            }
            commands::run(
                &image,
                &config,
                RunOptions {
                    trace,
                    trace_json: trace_json.as_deref(),
                },
            )?;
        }
        Commands::Disasm { image, start, count } => commands::disasm(&image, start, count)?,
        Commands::Info { image } => commands::info(&image)?,
        Commands::Extract { disc, file, output } => commands::extract(&disc, &file, &output)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x80003100"), Ok(0x8000_3100));
        assert_eq!(parse_address("80003100"), Ok(0x8000_3100));
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["gcemu", "run", "game.dol", "--max-steps", "100", "--trace"]);
        match cli.command {
            Commands::Run { max_steps, trace, .. } => {
                assert_eq!(max_steps, Some(100));
                assert!(trace);
            }
            _ => panic!("expected run"),
        }
    }
}
