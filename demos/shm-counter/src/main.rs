use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use shm_value::{Backoff, Options, ShmValue, Visibility};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), shm_value::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let CounterCommand {
        relaxed,
        spin,
        max_size,
        init,
        action,
    } = CounterCommand::parse();

    let mut options = Options::new(max_size);
    if relaxed {
        options = options.with_visibility(Visibility::Relaxed);
    }
    if spin {
        options = options.with_backoff(Backoff::Spin);
    }

    match action {
        Action::Get { file } => {
            let counter = open(options, &file, init)?;
            println!("{}", counter.get()?);
        }
        Action::Set { file, value } => {
            let counter = open(options, &file, init)?;
            counter.put(&value)?;
            counter.close()?;
        }
        Action::Incr { file, count } => {
            let counter = open(options, &file, init)?;
            let mut last = counter.get()?;

            for _ in 0..count {
                last = counter.get_and_put(|n| n.wrapping_add(1))?;
            }

            tracing::info!(count, last, "incremented");
            println!("{last}");
            counter.close()?;
        }
    }

    Ok(())
}

fn open(options: Options, file: &Path, init: u64) -> Result<ShmValue<u64>, shm_value::Error> {
    options.open(file, || init)
}

/// A counter persisted in a memory-mapped file, shared by every process running this on it.
#[derive(Parser)]
#[command(name = "shm-counter", version)]
struct CounterCommand {
    /// Access the lock word with relaxed ordering.
    ///
    /// Only sound while no other thread or process uses the same file.
    #[arg(long)]
    relaxed: bool,

    /// Busy wait on a contended lock instead of yielding to the scheduler.
    #[arg(long)]
    spin: bool,

    /// Maximum encoded size of the counter. Every process on one file must agree.
    #[arg(long, default_value_t = 8)]
    max_size: usize,

    /// Count stored when the file holds no counter yet.
    #[arg(long, default_value_t = 0)]
    init: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Print the current count.
    Get { file: PathBuf },
    /// Overwrite the count.
    Set { file: PathBuf, value: u64 },
    /// Increment the count, atomically with respect to every other process, and print the last
    /// value this process produced.
    Incr {
        file: PathBuf,
        #[arg(long, short, default_value_t = 1)]
        count: u64,
    },
}
