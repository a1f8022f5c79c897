use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, ensure};
use clap::Parser;
use env_logger::Env;
use log::info;

use breachmerge::merge::{DEFAULT_RAM_BUDGET, parse_size};
use breachmerge::{MergeConfig, MergeSummary, Merger};

#[derive(Parser)]
#[command(
    name = "breachmerge",
    about = "Merge combolists into a sorted, deduplicated breach compilation",
    long_about = "Merge combolists into a breach compilation. Records are routed into \
                  one leaf file per leading character, then every leaf is sorted and \
                  deduplicated with a bounded-memory external sort."
)]
struct Cli {
    /// Location of the breach compilation; leaves live in its `data` directory
    #[arg(long = "compilation", value_name = "DIR", default_value = ".")]
    compilation: PathBuf,

    /// Memory budget for windows and sort buffers (e.g. 512K, 64M, 1G)
    #[arg(short = 'r', long = "ram", value_name = "SIZE", value_parser = parse_size,
          default_value_t = DEFAULT_RAM_BUDGET)]
    ram: usize,

    /// Number of worker threads (default: one per CPU)
    #[arg(short = 'j', long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Abort if any batch of tasks runs longer than SECS seconds
    #[arg(long = "deadline", value_name = "SECS")]
    deadline: Option<u64>,

    /// Combolists to merge
    combos: Vec<PathBuf>,
}

fn run(cli: Cli) -> anyhow::Result<MergeSummary> {
    ensure!(
        cli.compilation.is_dir(),
        "compilation directory {} does not exist",
        cli.compilation.display()
    );
    for combo in &cli.combos {
        if combo.is_dir() {
            bail!("{} is a directory", combo.display());
        }
        if !combo.exists() {
            bail!("{}: No such file or directory", combo.display());
        }
    }

    let config = MergeConfig {
        compilation: cli.compilation,
        ram_budget: cli.ram,
        threads: cli.threads,
        task_deadline: cli.deadline.map(Duration::from_secs),
    };
    // Library errors already carry their cause in the message.
    let merger = Merger::new(config)?;
    Ok(merger.merge_combolists(cli.combos.as_slice())?)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(summary) => info!(
            "merged {} combolist(s), {} bytes, into {} leaves",
            summary.inputs, summary.bytes, summary.leaves
        ),
        Err(e) => {
            eprintln!("breachmerge: {}", e);
            process::exit(1);
        }
    }
}
