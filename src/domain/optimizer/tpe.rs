//! Tree-structured Parzen estimator sampling.
//!
//! Past trials are split into the best quarter ("good") and the rest. For each
//! numeric parameter a batch of candidates is drawn around good values and the
//! one with the highest good/bad density ratio wins. Categoricals are drawn in
//! proportion to their smoothed frequency among good trials.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand_distr::Normal;

use super::space::{ParamKind, ParamSet, ParamSpec, ParamValue, sample_set};

pub const TPE_CANDIDATES: usize = 24;
/// Share of trials counted as good.
pub const TPE_GAMMA: f64 = 0.25;

/// Random trials before the model takes over.
pub fn startup_trials(budget: usize) -> usize {
    (budget / 4).max(1).min(10)
}

fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

fn density(x: f64, centers: &[f64], sigma: f64) -> f64 {
    if centers.is_empty() {
        return 0.0;
    }
    centers.iter().map(|&c| gaussian_pdf(x, c, sigma)).sum::<f64>() / centers.len() as f64
}

#[derive(Debug, Clone)]
pub struct TpeSampler<'a> {
    specs: &'a [ParamSpec],
    n_startup: usize,
}

impl<'a> TpeSampler<'a> {
    pub fn new(specs: &'a [ParamSpec], budget: usize) -> Self {
        TpeSampler {
            specs,
            n_startup: startup_trials(budget),
        }
    }

    pub fn n_startup(&self) -> usize {
        self.n_startup
    }

    /// Next candidate given `(params, score)` history. Uniform while the
    /// history is too short to split.
    pub fn suggest<R: Rng + ?Sized>(&self, history: &[(ParamSet, f64)], rng: &mut R) -> ParamSet {
        let mut ranked: Vec<&(ParamSet, f64)> =
            history.iter().filter(|(_, score)| score.is_finite()).collect();
        if ranked.len() < self.n_startup.max(2) {
            return sample_set(self.specs, rng);
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let n_good = ((ranked.len() as f64 * TPE_GAMMA).ceil() as usize).clamp(1, ranked.len() - 1);
        let (good, bad) = ranked.split_at(n_good);

        self.specs
            .iter()
            .map(|spec| {
                let value = match &spec.kind {
                    ParamKind::Categorical { choices } => sample_categorical(spec, choices, good, rng),
                    _ => sample_numeric(spec, good, bad, rng),
                };
                (spec.name.clone(), value)
            })
            .collect()
    }
}

fn values_of(spec: &ParamSpec, trials: &[&(ParamSet, f64)]) -> Vec<f64> {
    trials
        .iter()
        .filter_map(|(params, _)| params.get(&spec.name).and_then(ParamValue::as_f64))
        .collect()
}

fn sample_numeric<R: Rng + ?Sized>(
    spec: &ParamSpec,
    good: &[&(ParamSet, f64)],
    bad: &[&(ParamSet, f64)],
    rng: &mut R,
) -> ParamValue {
    let Some((min, max)) = spec.bounds() else {
        return spec.sample_uniform(rng);
    };
    let good_values = values_of(spec, good);
    let bad_values = values_of(spec, bad);
    let range = max - min;
    if good_values.is_empty() || !(range > 0.0) {
        return spec.sample_uniform(rng);
    }

    let sigma = 0.1 * range;
    let mut best: Option<(f64, f64)> = None;
    for _ in 0..TPE_CANDIDATES {
        let center = good_values[rng.gen_range(0..good_values.len())];
        let Ok(normal) = Normal::new(center, sigma) else {
            continue;
        };
        let candidate = normal.sample(rng).clamp(min, max);
        let ratio = density(candidate, &good_values, sigma)
            / (density(candidate, &bad_values, sigma) + 1e-12);
        if best.is_none_or(|(_, r)| ratio > r) {
            best = Some((candidate, ratio));
        }
    }

    match best.and_then(|(x, _)| spec.snap(x)) {
        Some(value) => value,
        None => spec.sample_uniform(rng),
    }
}

fn sample_categorical<R: Rng + ?Sized>(
    spec: &ParamSpec,
    choices: &[ParamValue],
    good: &[&(ParamSet, f64)],
    rng: &mut R,
) -> ParamValue {
    let weights: Vec<f64> = choices
        .iter()
        .map(|choice| {
            1.0 + good
                .iter()
                .filter(|(params, _)| params.get(&spec.name) == Some(choice))
                .count() as f64
        })
        .collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => choices[dist.sample(rng)].clone(),
        Err(_) => spec.sample_uniform(rng),
    }
}
