//! Parameter importance as normalized absolute Pearson correlation.

use std::collections::BTreeMap;

use super::space::{ParamSpec, ParamValue};
use super::{PENALTY_SCORE, TrialRecord};

/// Pearson correlation, 0 with fewer than two points or no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Importance of each numeric parameter, summing to 1 (all zeros when no
/// parameter correlates). Failed and penalized trials are left out.
pub fn parameter_importance(specs: &[ParamSpec], history: &[TrialRecord]) -> BTreeMap<String, f64> {
    let scored: Vec<&TrialRecord> = history
        .iter()
        .filter(|t| t.error.is_none() && t.score > PENALTY_SCORE && t.score.is_finite())
        .collect();

    let mut raw: BTreeMap<String, f64> = specs
        .iter()
        .filter(|spec| spec.is_numeric())
        .map(|spec| {
            let (xs, ys): (Vec<f64>, Vec<f64>) = scored
                .iter()
                .filter_map(|t| {
                    t.params
                        .get(&spec.name)
                        .and_then(ParamValue::as_f64)
                        .map(|x| (x, t.score))
                })
                .unzip();
            (spec.name.clone(), pearson(&xs, &ys).abs())
        })
        .collect();

    let total: f64 = raw.values().sum();
    if total > 0.0 {
        for value in raw.values_mut() {
            *value /= total;
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimizer::space::ParamSet;
    use approx::assert_relative_eq;

    fn trial(number: usize, a: f64, b: f64, score: f64) -> TrialRecord {
        let mut params = ParamSet::new();
        params.insert("a".into(), ParamValue::Float(a));
        params.insert("b".into(), ParamValue::Float(b));
        params.insert("c".into(), ParamValue::Text("x".into()));
        TrialRecord {
            number,
            params,
            score,
            in_sample_score: None,
            out_of_sample_score: None,
            trades: 10,
            error: None,
        }
    }

    #[test]
    fn pearson_extremes() {
        assert_relative_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), -1.0, epsilon = 1e-12);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(pearson(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn importance_normalizes_numeric_params() {
        let specs = vec![
            ParamSpec::float("a", "x", 0.0, 10.0),
            ParamSpec::float("b", "y", 0.0, 10.0),
            ParamSpec::categorical("c", "z", vec![ParamValue::Text("x".into())]),
        ];
        let history = vec![
            trial(0, 1.0, 5.0, 1.0),
            trial(1, 2.0, 5.0, 2.0),
            trial(2, 3.0, 5.0, 3.0),
            trial(3, 4.0, 5.0, PENALTY_SCORE),
        ];
        let importance = parameter_importance(&specs, &history);
        assert_eq!(importance.len(), 2);
        assert_relative_eq!(importance["a"], 1.0);
        assert_eq!(importance["b"], 0.0);
    }

    #[test]
    fn no_signal_gives_zeros() {
        let specs = vec![ParamSpec::float("a", "x", 0.0, 10.0)];
        let history = vec![trial(0, 1.0, 0.0, 1.0), trial(1, 2.0, 0.0, 1.0)];
        assert_eq!(parameter_importance(&specs, &history)["a"], 0.0);
    }
}
