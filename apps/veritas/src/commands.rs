use std::fs;
use std::path::{Path, PathBuf};
use veritas_application::config::load_config_with_source;
use veritas_application::reporting::to_json_pretty;
use veritas_infrastructure::market_data::CsvMarketData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Backtest,
    MonteCarlo,
    Stress,
    Compare,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Backtest => "backtest",
            Mode::MonteCarlo => "monte_carlo",
            Mode::Stress => "stress",
            Mode::Compare => "compare",
        }
    }
}

pub struct CommandArgs {
    pub mode: Mode,
    pub config_path: PathBuf,
    pub data_path: PathBuf,
    pub out: Option<PathBuf>,
}

pub fn run(args: CommandArgs) -> Result<serde_json::Value, String> {
    let (config, _source) = load_config_with_source(&args.config_path)?;
    let market_data = CsvMarketData::new(&args.data_path);

    let report = match args.mode {
        Mode::Backtest => to_value(&veritas_application::backtesting::run_backtest(
            &config,
            &market_data,
        )?)?,
        Mode::MonteCarlo => to_value(&veritas_application::monte_carlo::run_monte_carlo(
            &config,
            &market_data,
        )?)?,
        Mode::Stress => to_value(&veritas_application::stress::run_stress_suite(
            &config,
            &market_data,
        )?)?,
        Mode::Compare => to_value(&veritas_application::comparison::run_comparison(
            &config,
            &market_data,
        )?)?,
    };

    if let Some(out) = args.out.as_deref() {
        write_report(out, &report)?;
    }

    Ok(serde_json::json!({
        "status": "ok",
        "mode": args.mode.as_str(),
        "run_id": config.run.run_id,
        "report": report,
    }))
}

fn to_value<T: serde::Serialize>(report: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(report).map_err(|err| format!("failed to serialize report: {err}"))
}

fn write_report(path: &Path, report: &serde_json::Value) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create {}: {err}", parent.display()))?;
    }
    fs::write(path, to_json_pretty(report)?)
        .map_err(|err| format!("failed to write report {}: {err}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
