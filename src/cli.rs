//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestEngine, BacktestResult};
use crate::domain::config_validation::{
    load_optimizer, load_param_specs, load_risk, load_strategy, load_structure, load_walk_forward,
};
use crate::domain::error::TradesimError;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::Bar;
use crate::domain::optimizer::{Optimizer, ProgressSnapshot, RunHandle};
use crate::domain::structure::run_structural_backtest;
use crate::domain::walk_forward::run_walk_forward;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "tradesim", about = "Bar-by-bar strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by the commands that run on bar data.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Strategy INI file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Bar CSV file
    #[arg(short, long)]
    pub data: PathBuf,
    /// Print the full result as JSON on stdout
    #[arg(long)]
    pub json: bool,
    /// Also write the JSON result to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one backtest over the whole data file
    Backtest {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Out-of-sample validation over consecutive folds
    WalkForward {
        #[command(flatten)]
        args: RunArgs,
        /// Override `[walk_forward] folds`
        #[arg(long)]
        folds: Option<usize>,
    },
    /// Search the `[param.*]` space for the best objective score
    Optimize {
        #[command(flatten)]
        args: RunArgs,
        /// Override `[optimizer] trials`
        #[arg(long)]
        trials: Option<usize>,
        /// Override `[optimizer] seed`
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Check a strategy file without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { args } => run_backtest(&args),
        Command::WalkForward { args, folds } => run_walk_forward_command(&args, folds),
        Command::Optimize {
            args,
            trials,
            seed,
        } => run_optimize(&args, trials, seed),
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradesimError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Bars from a CSV file, read through the CSV data port of its directory.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>, TradesimError> {
    let symbol = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| TradesimError::Data {
            reason: format!("{} is not a file", path.display()),
        })?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let bars = CsvAdapter::new(dir).fetch_bars(&symbol)?;
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        eprintln!(
            "Loaded {} bars for {} ({} to {})",
            bars.len(),
            symbol,
            first.timestamp,
            last.timestamp
        );
    }
    Ok(bars)
}

fn run_backtest(args: &RunArgs) -> Result<(), TradesimError> {
    let config = load_config(&args.config)?;
    let bars = load_bars(&args.data)?;

    let result = run_configured_backtest(&config, &bars)?;

    eprintln!("\n=== {} ===", result.strategy);
    print_metrics(&result.metrics);
    emit(&result, args)
}

/// A `[structure]` section selects a structural evaluator; otherwise the
/// rule strategy is run.
pub fn run_configured_backtest(
    config: &dyn ConfigPort,
    bars: &[Bar],
) -> Result<BacktestResult, TradesimError> {
    match load_structure(config)? {
        Some(structure) => {
            let risk = load_risk(config)?;
            let mut evaluator = structure.build()?;
            eprintln!("Running structural backtest on {} bars", bars.len());
            let mut result = run_structural_backtest(evaluator.as_mut(), bars, &risk)?;
            if let Some(name) = config.get_string("strategy", "name") {
                result.strategy = name;
            }
            Ok(result)
        }
        None => {
            let strategy = load_strategy(config)?;
            eprintln!("Running {} on {} bars", strategy.name, bars.len());
            BacktestEngine::new(&strategy)?.run(bars)
        }
    }
}

fn run_walk_forward_command(args: &RunArgs, folds: Option<usize>) -> Result<(), TradesimError> {
    let config = load_config(&args.config)?;
    let strategy = load_strategy(&config)?;
    let mut wf_config = load_walk_forward(&config)?;
    if let Some(folds) = folds {
        wf_config.n_folds = folds;
    }
    let bars = load_bars(&args.data)?;

    eprintln!(
        "Running walk-forward: {} folds, {:.0}% train, {:?}",
        wf_config.n_folds,
        wf_config.train_pct * 100.0,
        wf_config.mode
    );
    let result = run_walk_forward(&strategy, &bars, &wf_config)?;

    eprintln!("\n=== Folds ===");
    for fold in &result.folds {
        let pnl_sign = if fold.test.net_profit >= 0.0 { "+" } else { "" };
        eprintln!(
            "  fold {}: bars {}..{}, {} trades, {}{:.2}",
            fold.fold + 1,
            fold.window.test_start,
            fold.window.test_end,
            fold.test.total_trades,
            pnl_sign,
            fold.test.net_profit
        );
    }
    eprintln!("\n=== Out-of-Sample Aggregate ===");
    print_metrics(&result.metrics);
    eprintln!(
        "Consistency:      {:.1}% ({}/{} folds positive)",
        result.consistency_score,
        result.positive_folds,
        result.folds.len()
    );
    emit(&result, args)
}

fn run_optimize(
    args: &RunArgs,
    trials: Option<usize>,
    seed: Option<u64>,
) -> Result<(), TradesimError> {
    let config = load_config(&args.config)?;
    let strategy = load_strategy(&config)?;
    let mut opt_config = load_optimizer(&config)?;
    if let Some(trials) = trials {
        opt_config.n_trials = trials;
    }
    if seed.is_some() {
        opt_config.seed = seed;
    }
    let specs = load_param_specs(&config)?;
    let bars = load_bars(&args.data)?;

    eprintln!(
        "Optimizing {} parameters: {} trials, {}, objective {:?}",
        specs.len(),
        opt_config.n_trials,
        opt_config.method,
        opt_config.objective
    );
    let optimizer = Optimizer::new(strategy, specs, opt_config)?;
    let handle = RunHandle::new();
    let step = (optimizer.config().n_trials / 10).max(1);
    let result = optimizer.run(&bars, &handle, |progress: &ProgressSnapshot| {
        if progress.completed % step == 0 || progress.completed == progress.total {
            match progress.best_score {
                Some(best) => eprintln!(
                    "  {}/{} trials, best {:.4}",
                    progress.completed, progress.total, best
                ),
                None => eprintln!("  {}/{} trials", progress.completed, progress.total),
            }
        }
    })?;

    eprintln!("\n=== Best Trial ===");
    eprintln!("Score:            {:.4}", result.best_score);
    match &result.best_params {
        Some(params) => {
            for (name, value) in params {
                eprintln!("  {name} = {value}");
            }
        }
        None => eprintln!("  no trial completed"),
    }
    if !result.parameter_importance.is_empty() {
        eprintln!("\n=== Parameter Importance ===");
        for (name, importance) in &result.parameter_importance {
            eprintln!("  {name}: {importance:.3}");
        }
    }
    emit(&result, args)
}

fn run_validate(config_path: &Path) -> Result<(), TradesimError> {
    let config = load_config(config_path)?;

    if let Some(structure) = load_structure(&config)? {
        load_risk(&config)?;
        let evaluator = structure.build()?;
        eprintln!(
            "Structural strategy valid: needs at least {} bars",
            evaluator.min_bars()
        );
        return Ok(());
    }

    let strategy = load_strategy(&config)?;
    BacktestEngine::new(&strategy)?;
    eprintln!("Strategy: {}", strategy.name);
    eprintln!("  indicators:  {}", strategy.indicators.len());
    eprintln!("  entry rules: {}", strategy.entry_rules.len());
    eprintln!("  exit rules:  {}", strategy.exit_rules.len());

    let wf_config = load_walk_forward(&config)?;
    wf_config.validate()?;

    let specs = load_param_specs(&config)?;
    if !specs.is_empty() {
        let opt_config = load_optimizer(&config)?;
        let trials = opt_config.n_trials;
        Optimizer::new(strategy, specs, opt_config)?;
        eprintln!("  optimizer:   {} trials", trials);
    }

    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn print_metrics(metrics: &Metrics) {
    eprintln!("Net Profit:       {:.2}", metrics.net_profit);
    eprintln!("Total Return:     {:.2}%", metrics.total_return_pct);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown_pct);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Final Balance:    {:.2}", metrics.final_balance);
}

fn emit<T: Serialize>(result: &T, args: &RunArgs) -> Result<(), TradesimError> {
    if !args.json && args.output.is_none() {
        return Ok(());
    }
    let json = serde_json::to_string_pretty(result).map_err(std::io::Error::from)?;
    if args.json {
        println!("{json}");
    }
    if let Some(path) = &args.output {
        fs::write(path, &json)?;
        eprintln!("\nResult written to: {}", path.display());
    }
    Ok(())
}
