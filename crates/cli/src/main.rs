//! Nintendo DS CPU execution core CLI.
//!
//! A single `run` subcommand: direct-boot a ROM image against the `nds-core`
//! execution engine for a fixed number of bus cycles and print a stats
//! summary. No video, audio, or GUI surface is driven by this binary — it
//! exercises the CPU core in isolation, the way a headless conformance
//! harness would.

use std::{fs, process};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nds_core::config::Config;
use nds_core::Nds;

#[derive(Parser, Debug)]
#[command(
    name = "nds-sim",
    author,
    version,
    about = "Nintendo DS CPU execution core",
    long_about = "Direct-boot a .nds ROM image and run the ARM9/ARM7 execution core for a fixed\nnumber of bus cycles, headless (no video/audio/GUI).\n\nExamples:\n  nds-sim run --rom game.nds --cycles 20000000\n  nds-sim run --rom game.nds --config config.json --sd sdcard.idx --trace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Direct-boot a ROM image and run for a fixed number of bus cycles.
    Run {
        /// Path to the `.nds` ROM image.
        #[arg(long)]
        rom: String,

        /// Path to a JSON configuration document (see `Config`'s field layout).
        /// Falls back to `Config::default()` (direct boot, no SD, no save) if omitted.
        #[arg(long)]
        config: Option<String>,

        /// Path to a FAT-on-directory SD index (`.idx`) file, overriding the config file's.
        #[arg(long)]
        sd: Option<String>,

        /// Number of bus cycles to run before stopping.
        #[arg(long, default_value_t = 1_000_000)]
        cycles: u64,

        /// Enable `trace!`-level instruction tracing.
        #[arg(long)]
        trace: bool,

        /// Stats sections to print (`summary`, `memory`); prints all if omitted.
        #[arg(long)]
        stats: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { rom, config, sd, cycles, trace, stats } => cmd_run(&rom, config.as_deref(), sd, cycles, trace, &stats),
    }
}

/// Loads `config_path` (or the default configuration), applies the `--sd`
/// and `--trace` overrides, direct-boots `rom_path`, runs `cycles` bus
/// cycles, and prints the requested stats sections.
fn cmd_run(rom_path: &str, config_path: Option<&str>, sd: Option<String>, cycles: u64, trace: bool, stats_sections: &[String]) {
    let mut config = match config_path {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config {path}: {e}");
                process::exit(1);
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("Error parsing config {path}: {e}");
                process::exit(1);
            })
        }
        None => Config::default(),
    };

    if trace {
        config.general.trace = true;
    }
    if let Some(sd_path) = sd {
        config.sd.image_path = Some(sd_path);
    }

    let rom = fs::read(rom_path).unwrap_or_else(|e| {
        eprintln!("Error reading ROM {rom_path}: {e}");
        process::exit(1);
    });

    let mut nds = Nds::new(rom, &config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    println!("Game: {} ({})", String::from_utf8_lossy(&nds.header.game_title).trim_end_matches('\0'), String::from_utf8_lossy(&nds.header.game_code));
    println!("Running {cycles} bus cycles...");

    nds.run_cycles(cycles);

    let (stats, elapsed) = nds.stats();
    stats.print_sections(stats_sections, elapsed);
}
