//! LSU model CLI.
//!
//! This binary drives the cycle-accurate load/store unit through built-in
//! stimulus scenarios and prints the statistics report. It performs:
//! 1. **Scenario run:** play a named traffic pattern through the test bench.
//! 2. **Configuration:** load a JSON config file or use built-in defaults.
//! 3. **Reporting:** print selected statistics sections.

use clap::{Parser, Subcommand};
use std::{fs, process};

use lsu_core::config::LsuConfig;
use lsu_core::core::uop::{MemCmd, MemWidth, UopCode};
use lsu_core::core::interface::HellaRequest;
use lsu_core::sim::TestBench;

#[derive(Parser, Debug)]
#[command(
    name = "lsusim",
    author,
    version,
    about = "Cycle-accurate out-of-order LSU simulator",
    long_about = "Drive the load/store unit model with a built-in stimulus scenario and print statistics.\n\nExamples:\n  lsusim run --scenario mixed --rounds 200\n  lsusim run --scenario bounds --config cfg.json --trace\n  lsusim scenarios"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a stimulus scenario.
    Run {
        /// Scenario name (see `lsusim scenarios`).
        #[arg(short, long, default_value = "mixed")]
        scenario: String,

        /// JSON configuration file (defaults apply when omitted).
        #[arg(short, long)]
        config: Option<String>,

        /// Stimulus rounds to play.
        #[arg(short, long, default_value_t = 100)]
        rounds: u64,

        /// Enable per-cycle stage tracing to stderr.
        #[arg(long)]
        trace: bool,

        /// Statistics sections to print (all when omitted).
        #[arg(long)]
        sections: Vec<String>,
    },

    /// List the built-in scenarios.
    Scenarios,
}

const SCENARIOS: &[(&str, &str)] = &[
    ("mixed", "interleaved stores and loads with forwarding and drains"),
    ("forwarding", "store-to-load forwarding pairs"),
    ("bounds", "PAC-tagged loads and descriptor stores through the HBT"),
    ("hella", "scalar bypass traffic alongside pipelined loads"),
];

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            config,
            rounds,
            trace,
            sections,
        } => cmd_run(&scenario, config.as_deref(), rounds, trace, &sections),
        Commands::Scenarios => {
            for (name, desc) in SCENARIOS {
                println!("{:<12} {}", name, desc);
            }
        }
    }
}

fn load_config(path: Option<&str>, trace: bool) -> LsuConfig {
    let mut config = match path {
        Some(p) => {
            let text = fs::read_to_string(p).unwrap_or_else(|e| {
                eprintln!("error: cannot read {}: {}", p, e);
                process::exit(1);
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("error: bad config {}: {}", p, e);
                process::exit(1);
            })
        }
        None => LsuConfig::default(),
    };
    config.general.trace |= trace;
    if let Err(e) = config.validate() {
        eprintln!("error: invalid config: {}", e);
        process::exit(1);
    }
    config
}

fn cmd_run(scenario: &str, config: Option<&str>, rounds: u64, trace: bool, sections: &[String]) {
    let config = load_config(config, trace);
    let mut tb = TestBench::new(&config);

    match scenario {
        "mixed" => run_mixed(&mut tb, rounds),
        "forwarding" => run_forwarding(&mut tb, rounds),
        "bounds" => run_bounds(&mut tb, rounds),
        "hella" => run_hella(&mut tb, rounds),
        other => {
            eprintln!("error: unknown scenario '{}'; try `lsusim scenarios`", other);
            process::exit(1);
        }
    }

    // Fold the cache model's accounting into the counter CSRs.
    tb.lsu.stats.num_cache_hit = tb.dcache.hits;
    tb.lsu.stats.num_cache_miss = tb.dcache.misses;
    tb.lsu.stats.print_sections(sections);
}

/// Interleaved stores and dependent loads across a small working set.
fn run_mixed(tb: &mut TestBench, rounds: u64) {
    for i in 0..rounds {
        let addr = 0x1_0000 + (i % 16) * 8;
        let s = tb.store(addr, 0xA500_0000 + i, MemWidth::Double);
        let l = tb.load(addr, MemWidth::Double);
        tb.commit(&s);
        tb.run_until(64, |out| out.iresp.iter().flatten().count() > 0);
        tb.commit(&l);
        tb.step_n(8);
    }
    tb.step_n(32);
}

/// Back-to-back forwarding pairs on one address.
fn run_forwarding(tb: &mut TestBench, rounds: u64) {
    for i in 0..rounds {
        let s = tb.store(0x2_0000, 0x1111_0000 + i, MemWidth::Word);
        let l = tb.load(0x2_0000, MemWidth::Word);
        tb.run_until(32, |out| out.iresp.iter().flatten().count() > 0);
        tb.commit(&s);
        tb.commit(&l);
        tb.step_n(6);
    }
    tb.step_n(32);
}

/// PAC-tagged loads plus descriptor stores exercising the bounds engine.
fn run_bounds(tb: &mut TestBench, rounds: u64) {
    for i in 0..rounds {
        let tagged = ((1 + (i % 8)) << 45) | (0x3_0000 + (i % 16) * 8);
        let b = tb.bounds_op(UopCode::BndStr, tagged, 0xB000 + i);
        tb.commit(&b);
        tb.step_n(4);
        let l = tb.load_tagged(tagged, MemWidth::Double, i % 2 == 0);
        tb.run_until(32, |out| out.iresp.iter().flatten().count() > 0);
        tb.commit(&l);
        tb.step_n(8);
    }
    tb.step_n(32);
}

/// Scalar bypass requests racing pipelined loads.
fn run_hella(tb: &mut TestBench, rounds: u64) {
    for i in 0..rounds {
        tb.dcache.poke(0x4_0000 + i * 8, i * 3);
        tb.hella_request(HellaRequest {
            addr: 0x4_0000 + i * 8,
            data: 0,
            cmd: MemCmd::Read,
            size: MemWidth::Double,
            signed: false,
            tag: i,
        });
        let l = tb.load(0x5_0000 + (i % 8) * 8, MemWidth::Double);
        tb.run_until(64, |out| out.hella_resp.is_some());
        tb.run_until(32, |out| out.iresp.iter().flatten().count() > 0);
        tb.commit(&l);
        tb.step_n(4);
    }
    tb.step_n(32);
}
