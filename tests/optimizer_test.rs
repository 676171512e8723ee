//! Parameter search over a real strategy and bar series.

mod common;

use common::*;
use tradesim::adapters::file_config_adapter::FileConfigAdapter;
use tradesim::domain::config_validation::{load_optimizer, load_param_specs, load_strategy};
use tradesim::domain::optimizer::{
    Objective, OptimizerConfig, Optimizer, PENALTY_SCORE, ParamSpec, ParamValue, RunHandle,
    SearchMethod,
};

fn ten_trials(method: SearchMethod) -> OptimizerConfig {
    OptimizerConfig {
        method,
        objective: Objective::NetProfit,
        n_trials: 10,
        seed: Some(7),
        ..Default::default()
    }
}

fn fast_period() -> Vec<ParamSpec> {
    vec![ParamSpec::int("fast", "indicators.fast.period", 1, 5, 1)]
}

#[test]
fn ten_trials_over_one_int_param() {
    for method in [SearchMethod::Tpe, SearchMethod::Evolutionary, SearchMethod::Hybrid] {
        let optimizer =
            Optimizer::new(sma_cross_strategy(3, 12), fast_period(), ten_trials(method)).unwrap();
        let result = optimizer.run(&wave(300), &RunHandle::new(), |_| {}).unwrap();

        assert!(result.history.len() <= 10);
        assert!(!result.cancelled);
        let max = result
            .history
            .iter()
            .map(|t| t.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_score, max, "{method}");

        for trial in &result.history {
            match trial.params.get("fast") {
                Some(ParamValue::Int(v)) => assert!((1..=5).contains(v)),
                other => panic!("unexpected value {other:?}"),
            }
        }
        let best = result.best_params.as_ref().unwrap();
        let best_trial = result
            .history
            .iter()
            .find(|t| t.score == result.best_score)
            .unwrap();
        assert_eq!(&best_trial.params, best);
    }
}

#[test]
fn seeded_runs_repeat_exactly() {
    let run = || {
        Optimizer::new(
            sma_cross_strategy(3, 12),
            fast_period(),
            ten_trials(SearchMethod::Hybrid),
        )
        .unwrap()
        .run(&wave(300), &RunHandle::new(), |_| {})
        .unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn progress_reaches_total_and_handle_mirrors_it() {
    let handle = RunHandle::new();
    let optimizer = Optimizer::new(
        sma_cross_strategy(3, 12),
        fast_period(),
        ten_trials(SearchMethod::Tpe),
    )
    .unwrap();
    let result = optimizer.run(&wave(300), &handle, |_| {}).unwrap();

    let progress = handle.progress();
    assert_eq!(progress.completed, result.history.len());
    assert_eq!(progress.total, 10);
    assert!(!progress.cancelled);
}

#[test]
fn thin_trials_are_penalized() {
    // One crossover in the whole series: never enough trades to score.
    let optimizer = Optimizer::new(
        sma_cross_strategy(5, 20),
        vec![ParamSpec::int("fast", "indicators.fast.period", 3, 6, 1)],
        ten_trials(SearchMethod::Evolutionary),
    )
    .unwrap();
    let result = optimizer
        .run(&trend_up_then_down(), &RunHandle::new(), |_| {})
        .unwrap();
    assert!(result.history.iter().all(|t| t.score == PENALTY_SCORE));
}

#[test]
fn search_space_from_ini() {
    let ini = r#"
[strategy]
name = Tuned

[indicator.fast]
type = sma
period = 3

[indicator.slow]
type = sma
period = 12

[entry.1]
left = fast
operator = crosses_above
right = slow

[exit.1]
left = fast
operator = crosses_below
right = slow

[risk]
pip_size = 0.01

[optimizer]
trials = 8
method = evolutionary
objective = net_profit
seed = 3

[param.fast]
path = indicators.fast.period
type = int
min = 2
max = 6
"#;
    let adapter = FileConfigAdapter::from_string(ini).unwrap();
    let optimizer = Optimizer::new(
        load_strategy(&adapter).unwrap(),
        load_param_specs(&adapter).unwrap(),
        load_optimizer(&adapter).unwrap(),
    )
    .unwrap();
    let result = optimizer.run(&wave(300), &RunHandle::new(), |_| {}).unwrap();
    assert!(!result.history.is_empty());
    assert!(result.history.len() <= 8);
    assert_eq!(result.method, SearchMethod::Evolutionary);
}
