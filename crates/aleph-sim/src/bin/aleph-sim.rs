#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use aleph_sim::campaign::{format_violation, replay_seed, run_campaign};
use aleph_sim::{CampaignConfig, load_campaign_config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "aleph-sim: deterministic simulation of Aleph ordering",
    long_about = None
)]
struct Cli {
    /// Campaign config (TOML). A missing file means defaults.
    #[arg(short, long, global = true, default_value = "aleph-sim.toml")]
    config: PathBuf,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every seed in a range and report invariant violations.
    Campaign {
        /// First seed (overrides the config).
        #[arg(long)]
        from: Option<u64>,
        /// One past the last seed (overrides the config).
        #[arg(long)]
        to: Option<u64>,
    },
    /// Re-run one seed and print its trace and oracle verdict.
    Replay {
        seed: u64,
        /// Print every trace event.
        #[arg(long)]
        trace: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ALEPH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "aleph_sim=debug,aleph_core=debug,info"
        } else {
            "aleph_sim=info,warn"
        })
    });

    let format = env::var("ALEPH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config: CampaignConfig = load_campaign_config(&cli.config)?;

    match cli.command {
        Commands::Campaign { from, to } => {
            if let Some(from) = from {
                config.seed_range.start = from;
            }
            if let Some(to) = to {
                config.seed_range.end = to;
            }
            let report = run_campaign(&config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "campaign: seeds_run={} passed={} interesting={} min_order_len={}",
                    report.seeds_run,
                    report.seeds_passed,
                    report.interesting_states_reached,
                    report.min_final_order_len
                );
                for failure in &report.failures {
                    println!("seed {}:", failure.seed);
                    for violation in &failure.violations {
                        println!("  {violation}");
                    }
                }
            }
            if !report.all_passed() {
                std::process::exit(1);
            }
        }
        Commands::Replay { seed, trace } => {
            let detailed = replay_seed(seed, &config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&detailed.result)?);
            } else {
                if trace {
                    for event in &detailed.result.trace {
                        println!("{:>4} {:?}", event.step, event.kind);
                    }
                }
                println!(
                    "replay: seed={seed} nodes={} ordered={} equivocators={:?} passed={}",
                    detailed.result.nodes.len(),
                    detailed.result.final_order_len(),
                    detailed.result.equivocators,
                    detailed.oracle.passed
                );
                for violation in &detailed.oracle.violations {
                    println!("  {}", format_violation(violation));
                }
            }
            if !detailed.oracle.passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
