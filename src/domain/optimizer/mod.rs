//! Parameter search over strategy configurations.
//!
//! Every trial clones the base strategy, writes its candidate values at their
//! dotted paths and runs the backtest engine. Trials never abort the search:
//! failures and thin results get [`PENALTY_SCORE`] and are recorded like any
//! other trial.

pub mod evolution;
pub mod importance;
pub mod param_path;
pub mod space;
pub mod tpe;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::backtest::{BacktestEngine, BacktestOptions, DEFAULT_MIN_BARS};
use super::error::TradesimError;
use super::metrics::Metrics;
use super::ohlcv::Bar;
use super::strategy::StrategyConfig;

pub use space::{ParamKind, ParamSet, ParamSpec, ParamValue};

pub const PENALTY_SCORE: f64 = -1e9;
pub const MIN_TRADES: usize = 5;
pub const PROFIT_FACTOR_CAP: f64 = 100.0;
const IN_SAMPLE_WEIGHT: f64 = 0.4;
const OUT_OF_SAMPLE_WEIGHT: f64 = 0.6;
/// Share of the budget the hybrid search spends on the model-based phase.
const HYBRID_MODEL_SHARE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Tree-structured Parzen estimator.
    #[default]
    Tpe,
    Evolutionary,
    Hybrid,
}

impl SearchMethod {
    pub fn parse(text: &str) -> Option<SearchMethod> {
        match text.trim().to_ascii_lowercase().as_str() {
            "tpe" | "bayesian" => Some(SearchMethod::Tpe),
            "evolutionary" | "genetic" => Some(SearchMethod::Evolutionary),
            "hybrid" => Some(SearchMethod::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::Tpe => "tpe",
            SearchMethod::Evolutionary => "evolutionary",
            SearchMethod::Hybrid => "hybrid",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Sharpe,
    NetProfit,
    ProfitFactor,
    WinRate,
}

impl Objective {
    pub fn parse(text: &str) -> Option<Objective> {
        match text.trim().to_ascii_lowercase().as_str() {
            "sharpe" | "sharpe_ratio" => Some(Objective::Sharpe),
            "net_profit" => Some(Objective::NetProfit),
            "profit_factor" => Some(Objective::ProfitFactor),
            "win_rate" => Some(Objective::WinRate),
            _ => None,
        }
    }

    pub fn value(&self, metrics: &Metrics) -> f64 {
        match self {
            Objective::Sharpe => metrics.sharpe_ratio,
            Objective::NetProfit => metrics.net_profit,
            Objective::ProfitFactor => metrics.profit_factor.min(PROFIT_FACTOR_CAP),
            Objective::WinRate => metrics.win_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub method: SearchMethod,
    pub objective: Objective,
    pub n_trials: usize,
    pub seed: Option<u64>,
    /// Trailing share of bars held out of sample inside each trial.
    pub holdout_pct: Option<f64>,
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            method: SearchMethod::Tpe,
            objective: Objective::Sharpe,
            n_trials: 50,
            seed: None,
            holdout_pct: None,
            parallel: false,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.n_trials == 0 {
            return Err(TradesimError::configuration("n_trials must be at least 1"));
        }
        if let Some(pct) = self.holdout_pct {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(TradesimError::configuration(
                    "holdout_pct must be strictly between 0 and 1",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub number: usize,
    pub params: ParamSet,
    pub score: f64,
    pub in_sample_score: Option<f64>,
    pub out_of_sample_score: Option<f64>,
    pub trades: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub method: SearchMethod,
    pub objective: Objective,
    pub best_params: Option<ParamSet>,
    pub best_score: f64,
    pub history: Vec<TrialRecord>,
    pub parameter_importance: BTreeMap<String, f64>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub best_score: Option<f64>,
    pub cancelled: bool,
}

/// Caller-owned control for one run: a cancel flag plus the latest progress.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    cancelled: Arc<AtomicBool>,
    progress: Arc<Mutex<ProgressSnapshot>>,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop before the next trial; the run returns what it has so far.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, snapshot: &ProgressSnapshot) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
    }
}

#[derive(Debug, Default)]
struct TrialLedger {
    history: Vec<TrialRecord>,
    best: Option<(f64, ParamSet)>,
}

impl TrialLedger {
    fn scored(&self) -> Vec<(ParamSet, f64)> {
        self.history
            .iter()
            .map(|t| (t.params.clone(), t.score))
            .collect()
    }
}

struct Outcome {
    score: f64,
    in_sample: Option<f64>,
    out_of_sample: Option<f64>,
    trades: usize,
    error: Option<String>,
}

struct RunContext<'a, F> {
    bars: &'a [Bar],
    split: usize,
    handle: &'a RunHandle,
    on_progress: &'a F,
    total: usize,
    ledger: Mutex<TrialLedger>,
}

impl<F> RunContext<'_, F> {
    fn completed(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .len()
    }

    fn scored(&self) -> Vec<(ParamSet, f64)> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scored()
    }
}

pub struct Optimizer {
    base: StrategyConfig,
    specs: Vec<ParamSpec>,
    config: OptimizerConfig,
}

impl Optimizer {
    /// Validates the search space against the base strategy: every path must
    /// resolve in its serialized form.
    pub fn new(
        base: StrategyConfig,
        specs: Vec<ParamSpec>,
        config: OptimizerConfig,
    ) -> Result<Self, TradesimError> {
        config.validate()?;
        if specs.is_empty() {
            return Err(TradesimError::configuration(
                "optimizer needs at least one parameter",
            ));
        }
        let tree = serde_json::to_value(&base)
            .map_err(|e| TradesimError::configuration(format!("cannot serialize strategy: {}", e)))?;
        let mut names = std::collections::HashSet::new();
        for spec in &specs {
            spec.validate()?;
            if !names.insert(spec.name.as_str()) {
                return Err(TradesimError::configuration(format!(
                    "duplicate parameter '{}'",
                    spec.name
                )));
            }
            param_path::get(&tree, &spec.path)?;
        }
        Ok(Optimizer {
            base,
            specs,
            config,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn run<F>(
        &self,
        bars: &[Bar],
        handle: &RunHandle,
        on_progress: F,
    ) -> Result<OptimizationResult, TradesimError>
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        let split = match self.config.holdout_pct {
            Some(pct) => bars.len() - (bars.len() as f64 * pct).floor() as usize,
            None => bars.len(),
        };
        if split < DEFAULT_MIN_BARS {
            return Err(TradesimError::InsufficientData {
                bars: split,
                required: DEFAULT_MIN_BARS,
            });
        }

        let total = self.config.n_trials;
        let ctx = RunContext {
            bars,
            split,
            handle,
            on_progress: &on_progress,
            total,
            ledger: Mutex::new(TrialLedger::default()),
        };
        handle.publish(&ProgressSnapshot {
            total,
            ..Default::default()
        });

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        log::info!(
            "optimizing {} parameter(s) with {} over {} trials",
            self.specs.len(),
            self.config.method,
            total
        );
        match self.config.method {
            SearchMethod::Tpe => self.run_model(total, &ctx, &mut rng),
            SearchMethod::Evolutionary => self.run_evolution(total, Vec::new(), &ctx, &mut rng),
            SearchMethod::Hybrid => {
                let model_budget = ((total as f64 * HYBRID_MODEL_SHARE).round() as usize).clamp(1, total);
                self.run_model(model_budget, &ctx, &mut rng);
                let pool = evolution::population_size(total);
                let seeds = evolution::elites(&ctx.scored(), pool);
                self.run_evolution(total - model_budget, seeds, &ctx, &mut rng);
            }
        }

        let ledger = ctx.ledger.into_inner().unwrap_or_else(PoisonError::into_inner);
        let cancelled = handle.is_cancelled();
        let importance = importance::parameter_importance(&self.specs, &ledger.history);
        let (best_score, best_params) = match ledger.best {
            Some((score, params)) => (score, Some(params)),
            None => (PENALTY_SCORE, None),
        };
        handle.publish(&ProgressSnapshot {
            completed: ledger.history.len(),
            total,
            best_score: best_params.as_ref().map(|_| best_score),
            cancelled,
        });
        log::info!(
            "optimization finished: {} trials, best score {:.4}{}",
            ledger.history.len(),
            best_score,
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(OptimizationResult {
            method: self.config.method,
            objective: self.config.objective,
            best_params,
            best_score,
            history: ledger.history,
            parameter_importance: importance,
            cancelled,
        })
    }

    fn run_model<F>(&self, budget: usize, ctx: &RunContext<'_, F>, rng: &mut StdRng)
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        let sampler = tpe::TpeSampler::new(&self.specs, budget);
        let startup = sampler.n_startup().min(budget);
        let batch = (0..startup)
            .map(|_| space::sample_set(&self.specs, rng))
            .collect();
        self.run_batch(batch, ctx);

        for _ in startup..budget {
            if ctx.handle.is_cancelled() {
                break;
            }
            let candidate = sampler.suggest(&ctx.scored(), rng);
            self.run_batch(vec![candidate], ctx);
        }
    }

    fn run_evolution<F>(
        &self,
        budget: usize,
        seeds: Vec<(ParamSet, f64)>,
        ctx: &RunContext<'_, F>,
        rng: &mut StdRng,
    ) where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        if budget == 0 {
            return;
        }
        let size = evolution::population_size(self.config.n_trials);
        let mut population = seeds;
        population.truncate(size);

        let fill = (size - population.len()).min(budget);
        let fresh = (0..fill)
            .map(|_| space::sample_set(&self.specs, rng))
            .collect();
        let scored = self.run_batch(fresh, ctx);
        let mut used = scored.len();
        population.extend(scored);

        while used < budget && !ctx.handle.is_cancelled() {
            let elites = evolution::elites(&population, evolution::ELITE_COUNT);
            let count = (size - elites.len()).min(budget - used);
            let children = evolution::breed(&population, &self.specs, count, rng);
            if children.is_empty() {
                break;
            }
            let scored = self.run_batch(children, ctx);
            if scored.is_empty() {
                break;
            }
            used += scored.len();
            population = elites;
            population.extend(scored);
        }
    }

    /// Evaluate and record a batch; stops early on cancellation.
    fn run_batch<F>(&self, batch: Vec<ParamSet>, ctx: &RunContext<'_, F>) -> Vec<(ParamSet, f64)>
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        let trial = |params: ParamSet| -> Option<(ParamSet, f64)> {
            if ctx.handle.is_cancelled() || ctx.completed() >= ctx.total {
                return None;
            }
            let outcome = self.evaluate(&params, ctx.bars, ctx.split);
            let score = self.record(ctx, params.clone(), outcome);
            Some((params, score))
        };

        if self.config.parallel {
            batch.into_par_iter().filter_map(trial).collect()
        } else {
            batch.into_iter().map_while(trial).collect()
        }
    }

    fn record<F>(&self, ctx: &RunContext<'_, F>, params: ParamSet, outcome: Outcome) -> f64
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        let snapshot = {
            let mut ledger = ctx.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            let improved = ledger
                .best
                .as_ref()
                .is_none_or(|(best, _)| outcome.score > *best);
            if improved {
                ledger.best = Some((outcome.score, params.clone()));
            }
            let number = ledger.history.len();
            ledger.history.push(TrialRecord {
                number,
                params,
                score: outcome.score,
                in_sample_score: outcome.in_sample,
                out_of_sample_score: outcome.out_of_sample,
                trades: outcome.trades,
                error: outcome.error,
            });
            ProgressSnapshot {
                completed: ledger.history.len(),
                total: ctx.total,
                best_score: ledger.best.as_ref().map(|(score, _)| *score),
                cancelled: ctx.handle.is_cancelled(),
            }
        };
        ctx.handle.publish(&snapshot);
        (ctx.on_progress)(&snapshot);
        outcome.score
    }

    fn evaluate(&self, params: &ParamSet, bars: &[Bar], split: usize) -> Outcome {
        match self.try_evaluate(params, bars, split) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("trial {:?} failed: {}", params, err);
                Outcome {
                    score: PENALTY_SCORE,
                    in_sample: None,
                    out_of_sample: None,
                    trades: 0,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn try_evaluate(
        &self,
        params: &ParamSet,
        bars: &[Bar],
        split: usize,
    ) -> Result<Outcome, TradesimError> {
        let config = param_path::apply_params(&self.base, &self.specs, params)?;
        let engine = BacktestEngine::new(&config)?;
        let in_sample = engine.run(&bars[..split])?;
        let is_score = self.config.objective.value(&in_sample.metrics);

        let (blended, out_of_sample, trades) = if split < bars.len() {
            let held_out = engine
                .with_options(BacktestOptions {
                    min_bars: 1,
                    initial_balance: None,
                })
                .run_range(bars, split, bars.len())?;
            let oos_score = self.config.objective.value(&held_out.metrics);
            (
                IN_SAMPLE_WEIGHT * is_score + OUT_OF_SAMPLE_WEIGHT * oos_score,
                Some(oos_score),
                in_sample.metrics.total_trades + held_out.metrics.total_trades,
            )
        } else {
            (is_score, None, in_sample.metrics.total_trades)
        };

        let score = if trades < MIN_TRADES {
            log::warn!(
                "trial {:?} penalized: {} trades, need {}",
                params,
                trades,
                MIN_TRADES
            );
            PENALTY_SCORE
        } else {
            blended
        };

        Ok(Outcome {
            score,
            in_sample: Some(is_score),
            out_of_sample,
            trades,
            error: None,
        })
    }
}
