//! Genetic operators for the evolutionary search.

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};

use super::space::{ParamKind, ParamSet, ParamSpec, ParamValue};

pub const ELITE_COUNT: usize = 2;
pub const TOURNAMENT_SIZE: usize = 3;
pub const MUTATION_RATE: f64 = 0.3;

pub fn population_size(n_trials: usize) -> usize {
    (n_trials / 5).max(8).min(20)
}

/// Best-first copy of the top `count` members.
pub fn elites(population: &[(ParamSet, f64)], count: usize) -> Vec<(ParamSet, f64)> {
    let mut ranked = population.to_vec();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(count);
    ranked
}

/// Best of `TOURNAMENT_SIZE` members drawn with replacement.
pub fn tournament<'a, R: Rng + ?Sized>(
    population: &'a [(ParamSet, f64)],
    rng: &mut R,
) -> Option<&'a ParamSet> {
    (0..TOURNAMENT_SIZE)
        .filter_map(|_| population.choose(rng))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(params, _)| params)
}

/// Each parameter comes from either parent with equal odds.
pub fn crossover<R: Rng + ?Sized>(
    a: &ParamSet,
    b: &ParamSet,
    specs: &[ParamSpec],
    rng: &mut R,
) -> ParamSet {
    specs
        .iter()
        .map(|spec| {
            let (first, second) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };
            let value = first
                .get(&spec.name)
                .or_else(|| second.get(&spec.name))
                .filter(|v| spec.contains(v))
                .cloned()
                .unwrap_or_else(|| spec.sample_uniform(rng));
            (spec.name.clone(), value)
        })
        .collect()
}

/// Perturb each parameter with probability `rate`, keeping it legal.
pub fn mutate<R: Rng + ?Sized>(params: &mut ParamSet, specs: &[ParamSpec], rate: f64, rng: &mut R) {
    for spec in specs {
        if !rng.gen_bool(rate.clamp(0.0, 1.0)) {
            continue;
        }
        let current = params.get(&spec.name).cloned();
        let next = match (&spec.kind, current) {
            (ParamKind::Int { step, .. }, Some(ParamValue::Int(v))) => {
                let jump = rng.gen_range(1..=2) * (*step).max(1);
                let moved = if rng.gen_bool(0.5) { v + jump } else { v - jump };
                spec.snap(moved as f64)
            }
            (ParamKind::Float { min, max }, Some(ParamValue::Float(v))) => {
                let sigma = 0.1 * (max - min);
                match Normal::new(v, sigma) {
                    Ok(normal) if sigma > 0.0 => spec.snap(normal.sample(rng)),
                    _ => spec.snap(v),
                }
            }
            _ => Some(spec.sample_uniform(rng)),
        };
        if let Some(value) = next {
            params.insert(spec.name.clone(), value);
        }
    }
}

/// `count` children bred from a scored population.
pub fn breed<R: Rng + ?Sized>(
    population: &[(ParamSet, f64)],
    specs: &[ParamSpec],
    count: usize,
    rng: &mut R,
) -> Vec<ParamSet> {
    let mut children = Vec::with_capacity(count);
    while children.len() < count {
        let (Some(a), Some(b)) = (tournament(population, rng), tournament(population, rng)) else {
            break;
        };
        let mut child = crossover(a, b, specs, rng);
        mutate(&mut child, specs, MUTATION_RATE, rng);
        children.push(child);
    }
    children
}
