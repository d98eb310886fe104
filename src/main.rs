use clap::Parser;

use sber_collector::config::Config;
use sber_collector::runner;

/// Collects accounts and transactions from Sberbank online banking and
/// forwards them to a budget-tracker collector.
#[derive(Parser)]
#[command(name = "sber-collector", version, about)]
struct Cli {
    /// Run a single collection pass and exit instead of looping forever.
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    if cli.once {
        runner::run_once(&config)
    } else {
        runner::run_forever(&config)
    }
}
