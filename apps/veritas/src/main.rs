mod commands;
mod obs;

use clap::{Args, Parser, Subcommand};
use commands::{CommandArgs, Mode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "veritas")]
#[command(
    about = "Historical replay and statistical validation of trading strategies.",
    version,
    arg_required_else_help = true
)]
#[command(
    after_help = "Examples:\n  veritas backtest --config configs/eurusd.toml --data data/eurusd_h1.csv\n  veritas monte-carlo --config configs/eurusd.toml --data data/eurusd_h1.csv\n  veritas stress --config configs/eurusd.toml --data data/eurusd_h1.csv --out runs/stress.json\n  veritas compare --config configs/eurusd.toml --data data/eurusd_h1.csv\n"
)]
struct Cli {
    /// Log filter used when VERITAS_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format: text | json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Serve Prometheus metrics on host:port.
    #[arg(long, global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args)]
struct RunArgs {
    /// Config file path (TOML). If omitted, uses env VERITAS_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// OHLCV CSV file for the configured symbol.
    #[arg(long)]
    data: PathBuf,

    /// Also write the pretty-printed report to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Replay one strategy over the data.
    Backtest(RunArgs),
    /// Replay, then resample the trade returns.
    MonteCarlo(RunArgs),
    /// Replay under the configured stress scenarios.
    Stress(RunArgs),
    /// Rank several strategies (plus benchmarks) on the same data.
    Compare(RunArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = obs::init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = obs::init_metrics(cli.metrics_addr.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let (mode, args) = match cli.command {
        CliCommand::Backtest(args) => (Mode::Backtest, args),
        CliCommand::MonteCarlo(args) => (Mode::MonteCarlo, args),
        CliCommand::Stress(args) => (Mode::Stress, args),
        CliCommand::Compare(args) => (Mode::Compare, args),
    };

    let config_path = match args.config.or_else(|| {
        std::env::var("VERITAS_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    }) {
        Some(path) => path,
        None => {
            eprintln!("error: missing --config and env VERITAS_CONFIG is not set");
            std::process::exit(1);
        }
    };

    let result = commands::run(CommandArgs {
        mode,
        config_path,
        data_path: args.data,
        out: args.out,
    });

    match result {
        Ok(json) => {
            println!(
                "{}",
                serde_json::to_string(&json)
                    .unwrap_or_else(|_| "{\"status\":\"error\",\"error\":\"json\"}".to_string())
            );
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
