//! Swing-pivot breakout evaluator.
//!
//! Tracks the latest confirmed swing high and low. A close beyond an unbroken
//! level breaks it once; the break is a continuation when it goes the same way
//! as the previous break and a reversal otherwise (the first break included).
//! Entry, stop and targets are measured in percent of the average daily range.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{BreakoutKind, StructuralEvaluator, StructuralSignal};
use crate::domain::error::TradesimError;
use crate::domain::indicator::adr::DailyRangeTracker;
use crate::domain::indicator::swing_pivot::{is_pivot_high, is_pivot_low};
use crate::domain::ohlcv::Bar;
use crate::domain::position::TradeDirection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotBreakConfig {
    pub lookback: usize,
    pub adr_period: usize,
    pub stop_adr_pct: f64,
    pub target_adr_pcts: Vec<f64>,
    /// Share of the stop distance the entry is pulled back toward the pivot.
    /// The pulled-back price is treated as a limit order filled on the
    /// breakout bar itself, whether or not that bar traded back to it.
    pub pullback_fraction: f64,
}

impl Default for PivotBreakConfig {
    fn default() -> Self {
        PivotBreakConfig {
            lookback: 5,
            adr_period: 10,
            stop_adr_pct: 20.0,
            target_adr_pcts: vec![20.0, 40.0],
            pullback_fraction: 0.0,
        }
    }
}

impl PivotBreakConfig {
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.lookback == 0 || self.adr_period == 0 {
            return Err(TradesimError::configuration(
                "pivot lookback and ADR period must be at least 1",
            ));
        }
        if !(self.stop_adr_pct > 0.0) || self.target_adr_pcts.iter().any(|p| !(*p > 0.0)) {
            return Err(TradesimError::configuration(
                "ADR percentages must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.pullback_fraction) {
            return Err(TradesimError::configuration(
                "pullback fraction must be in [0, 1)",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SwingLevel {
    price: f64,
    broken: bool,
}

impl SwingLevel {
    fn fresh(price: f64) -> Self {
        SwingLevel {
            price,
            broken: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PivotBreakEvaluator {
    config: PivotBreakConfig,
    adr: DailyRangeTracker,
    swing_high: Option<SwingLevel>,
    swing_low: Option<SwingLevel>,
    last_break: Option<TradeDirection>,
    last_timestamp: Option<NaiveDateTime>,
}

impl PivotBreakEvaluator {
    pub fn new(config: PivotBreakConfig) -> Result<Self, TradesimError> {
        config.validate()?;
        Ok(PivotBreakEvaluator {
            adr: DailyRangeTracker::new(config.adr_period),
            config,
            swing_high: None,
            swing_low: None,
            last_break: None,
            last_timestamp: None,
        })
    }

    pub fn config(&self) -> &PivotBreakConfig {
        &self.config
    }

    /// Latest confirmed swing high, if still unbroken.
    pub fn active_high(&self) -> Option<f64> {
        self.swing_high.filter(|l| !l.broken).map(|l| l.price)
    }

    pub fn active_low(&self) -> Option<f64> {
        self.swing_low.filter(|l| !l.broken).map(|l| l.price)
    }

    pub fn last_break(&self) -> Option<TradeDirection> {
        self.last_break
    }

    /// Levels as they stand once the newest bar's pivot candidate is confirmed.
    fn levels_for(&self, bars: &[Bar]) -> (Option<SwingLevel>, Option<SwingLevel>) {
        let lookback = self.config.lookback;
        let newest = bars.len() - 1;
        if newest < 2 * lookback {
            return (self.swing_high, self.swing_low);
        }
        let candidate = newest - lookback;
        let high = if is_pivot_high(bars, candidate, lookback) {
            Some(SwingLevel::fresh(bars[candidate].high))
        } else {
            self.swing_high
        };
        let low = if is_pivot_low(bars, candidate, lookback) {
            Some(SwingLevel::fresh(bars[candidate].low))
        } else {
            self.swing_low
        };
        (high, low)
    }

    fn breakout(
        high: Option<SwingLevel>,
        low: Option<SwingLevel>,
        close: f64,
    ) -> Option<TradeDirection> {
        if high.is_some_and(|l| !l.broken && close > l.price) {
            Some(TradeDirection::Long)
        } else if low.is_some_and(|l| !l.broken && close < l.price) {
            Some(TradeDirection::Short)
        } else {
            None
        }
    }

    fn is_processed(&self, bar: &Bar) -> bool {
        self.last_timestamp.is_some_and(|t| bar.timestamp <= t)
    }

    fn step(&mut self, bars: &[Bar]) -> Option<StructuralSignal> {
        let bar = bars.last()?;
        if self.is_processed(bar) {
            return None;
        }
        self.last_timestamp = Some(bar.timestamp);
        self.adr.update(bar);

        let (high, low) = self.levels_for(bars);
        self.swing_high = high;
        self.swing_low = low;

        let direction = Self::breakout(high, low, bar.close)?;
        let level = match direction {
            TradeDirection::Long => self.swing_high.as_mut(),
            TradeDirection::Short => self.swing_low.as_mut(),
        };
        if let Some(level) = level {
            level.broken = true;
        }

        let kind = if self.last_break == Some(direction) {
            BreakoutKind::Continuation
        } else {
            BreakoutKind::Reversal
        };
        self.last_break = Some(direction);
        log::debug!("{} {:?} break at {}", direction, kind, bar.timestamp);

        let adr = self.adr.average()?;
        Some(self.signal(bar, direction, kind, adr))
    }

    /// Levels for a breakout on `bar`. The entry assumes an immediate limit
    /// fill at the pulled-back price.
    fn signal(
        &self,
        bar: &Bar,
        direction: TradeDirection,
        kind: BreakoutKind,
        adr: f64,
    ) -> StructuralSignal {
        let sign = direction.sign();
        let stop_distance = adr * self.config.stop_adr_pct / 100.0;
        let entry = bar.close - sign * self.config.pullback_fraction * stop_distance;
        StructuralSignal {
            timestamp: bar.timestamp,
            direction,
            entry,
            stop_loss: entry - sign * stop_distance,
            targets: self
                .config
                .target_adr_pcts
                .iter()
                .map(|pct| entry + sign * adr * pct / 100.0)
                .collect(),
            kind: Some(kind),
        }
    }
}

impl StructuralEvaluator for PivotBreakEvaluator {
    fn warmup(&mut self, bars: &[Bar]) {
        for end in 1..=bars.len() {
            self.step(&bars[..end]);
        }
    }

    fn evaluate(&mut self, bars: &[Bar]) -> Option<StructuralSignal> {
        self.step(bars)
    }

    fn would_fire_opposite(&self, bars: &[Bar], current: TradeDirection) -> bool {
        let Some(bar) = bars.last() else {
            return false;
        };
        if self.is_processed(bar) {
            return false;
        }
        let mut adr = self.adr.clone();
        adr.update(bar);
        if adr.average().is_none() {
            return false;
        }
        let (high, low) = self.levels_for(bars);
        Self::breakout(high, low, bar.close) == Some(current.opposite())
    }

    fn min_bars(&self) -> usize {
        2 * self.config.lookback + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::RiskConfig;
    use crate::domain::structure::run_structural_backtest;
    use chrono::{Duration, NaiveDate};

    fn daily(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
            })
            .collect()
    }

    const PATH: [f64; 20] = [
        10.0, 11.0, 12.0, 11.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 14.0, 13.0, 14.0, 15.0, 16.0,
        17.0, 16.0, 15.0, 13.0, 11.0,
    ];

    fn evaluator() -> PivotBreakEvaluator {
        PivotBreakEvaluator::new(PivotBreakConfig {
            lookback: 2,
            adr_period: 2,
            stop_adr_pct: 50.0,
            target_adr_pcts: vec![100.0],
            pullback_fraction: 0.0,
        })
        .unwrap()
    }

    fn signals(bars: &[Bar]) -> Vec<(usize, StructuralSignal)> {
        let mut eval = evaluator();
        (1..=bars.len())
            .filter_map(|end| eval.evaluate(&bars[..end]).map(|s| (end - 1, s)))
            .collect()
    }

    #[test]
    fn classifies_choch_then_bos_then_choch() {
        let found = signals(&daily(&PATH));
        let summary: Vec<_> = found
            .iter()
            .map(|(i, s)| (*i, s.direction, s.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                (8, TradeDirection::Long, Some(BreakoutKind::Reversal)),
                (15, TradeDirection::Long, Some(BreakoutKind::Continuation)),
                (19, TradeDirection::Short, Some(BreakoutKind::Reversal)),
            ]
        );
    }

    #[test]
    fn levels_come_from_adr() {
        let found = signals(&daily(&PATH));
        let (_, first) = &found[0];
        // ADR of two 2.0-wide days: stop 50% below, target 100% above
        assert_eq!(first.entry, 14.0);
        assert_eq!(first.stop_loss, 13.0);
        assert_eq!(first.targets, vec![16.0]);
    }

    #[test]
    fn pullback_moves_entry_toward_pivot() {
        let mut eval = PivotBreakEvaluator::new(PivotBreakConfig {
            pullback_fraction: 0.5,
            ..evaluator().config().clone()
        })
        .unwrap();
        let bars = daily(&PATH);
        eval.warmup(&bars[..8]);
        let signal = eval.evaluate(&bars[..9]).unwrap();
        assert_eq!(signal.entry, 13.5);
        assert_eq!(signal.stop_loss, 12.5);
    }

    #[test]
    fn same_bar_is_not_processed_twice() {
        let bars = daily(&PATH);
        let mut eval = evaluator();
        eval.warmup(&bars[..8]);
        assert!(eval.evaluate(&bars[..9]).is_some());
        assert!(eval.evaluate(&bars[..9]).is_none());
        assert_eq!(eval.active_high(), None);
    }

    #[test]
    fn opposite_check_does_not_mutate() {
        let bars = daily(&PATH);
        let mut eval = evaluator();
        eval.warmup(&bars[..19]);
        assert_eq!(eval.last_break(), Some(TradeDirection::Long));
        assert!(eval.would_fire_opposite(&bars, TradeDirection::Long));
        assert!(!eval.would_fire_opposite(&bars, TradeDirection::Short));
        assert_eq!(eval.active_low(), Some(12.0));
        let signal = eval.evaluate(&bars).unwrap();
        assert_eq!(signal.direction, TradeDirection::Short);
    }

    #[test]
    fn needs_two_lookbacks_plus_one() {
        let mut eval = PivotBreakEvaluator::new(PivotBreakConfig::default()).unwrap();
        assert_eq!(eval.min_bars(), 11);
        let err = run_structural_backtest(&mut eval, &daily(&PATH[..10]), &RiskConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            TradesimError::InsufficientData {
                bars: 10,
                required: 11
            }
        ));
    }

    #[test]
    fn rejects_zero_lookback() {
        let config = PivotBreakConfig {
            lookback: 0,
            ..Default::default()
        };
        assert!(PivotBreakEvaluator::new(config).is_err());
    }
}
