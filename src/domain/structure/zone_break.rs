//! Periodic zone breakout evaluator.
//!
//! Every `interval_minutes` (counted from midnight) the first bar's open
//! becomes the reference price. The zone spans `zone_height` pips centred on
//! it, and the triggers sit `buffer` pips outside. A close crossing a trigger
//! fires once per side per period. Distances are in pips of `pip_size`.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::{StructuralEvaluator, StructuralSignal};
use crate::domain::error::TradesimError;
use crate::domain::ohlcv::Bar;
use crate::domain::position::TradeDirection;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ZoneStop {
    #[default]
    OppositeTrigger,
    /// Far edge of the zone.
    ZoneBoundary,
    Fixed {
        pips: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneBreakConfig {
    pub interval_minutes: u32,
    pub zone_height: f64,
    pub buffer: f64,
    /// Height of each stacked target zone, nearest first.
    pub target_heights: Vec<f64>,
    pub target_gap: f64,
    pub stop: ZoneStop,
    pub pip_size: f64,
}

impl Default for ZoneBreakConfig {
    fn default() -> Self {
        ZoneBreakConfig {
            interval_minutes: 240,
            zone_height: 20.0,
            buffer: 5.0,
            target_heights: vec![20.0, 20.0],
            target_gap: 0.0,
            stop: ZoneStop::OppositeTrigger,
            pip_size: 0.0001,
        }
    }
}

impl ZoneBreakConfig {
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.interval_minutes == 0 || self.interval_minutes > 24 * 60 {
            return Err(TradesimError::configuration(
                "zone interval must be between 1 and 1440 minutes",
            ));
        }
        if !(self.pip_size > 0.0) || self.zone_height < 0.0 || self.buffer < 0.0 {
            return Err(TradesimError::configuration(
                "zone sizes must be non-negative with a positive pip size",
            ));
        }
        if self.target_gap < 0.0 || self.target_heights.iter().any(|h| !(*h > 0.0)) {
            return Err(TradesimError::configuration(
                "target heights must be positive and the gap non-negative",
            ));
        }
        if let ZoneStop::Fixed { pips } = self.stop {
            if !(pips > 0.0) {
                return Err(TradesimError::configuration("fixed stop must be positive"));
            }
        }
        Ok(())
    }
}

/// Price levels of one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub top: f64,
    pub bottom: f64,
    pub buy_trigger: f64,
    pub sell_trigger: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PeriodState {
    key: (NaiveDate, u32),
    zone: Zone,
    fired_long: bool,
    fired_short: bool,
}

#[derive(Debug, Clone)]
pub struct ZoneBreakEvaluator {
    config: ZoneBreakConfig,
    period: Option<PeriodState>,
    prev_close: Option<f64>,
    last_timestamp: Option<NaiveDateTime>,
}

impl ZoneBreakEvaluator {
    pub fn new(config: ZoneBreakConfig) -> Result<Self, TradesimError> {
        config.validate()?;
        Ok(ZoneBreakEvaluator {
            config,
            period: None,
            prev_close: None,
            last_timestamp: None,
        })
    }

    /// Zone of the current period.
    pub fn zone(&self) -> Option<Zone> {
        self.period.map(|p| p.zone)
    }

    fn zone_around(&self, reference: f64) -> Zone {
        let pip = self.config.pip_size;
        let half = self.config.zone_height * pip / 2.0;
        let buffer = self.config.buffer * pip;
        Zone {
            top: reference + half,
            bottom: reference - half,
            buy_trigger: reference + half + buffer,
            sell_trigger: reference - half - buffer,
        }
    }

    fn period_key(&self, timestamp: NaiveDateTime) -> (NaiveDate, u32) {
        let minutes = timestamp.hour() * 60 + timestamp.minute();
        (timestamp.date(), minutes / self.config.interval_minutes)
    }

    /// Period state in force for `bar`, starting a new period when it crosses
    /// an interval boundary.
    fn period_for(&self, bar: &Bar) -> PeriodState {
        let key = self.period_key(bar.timestamp);
        match self.period {
            Some(state) if state.key == key => state,
            _ => PeriodState {
                key,
                zone: self.zone_around(bar.open),
                fired_long: false,
                fired_short: false,
            },
        }
    }

    fn crossing(state: &PeriodState, prev_close: f64, close: f64) -> Option<TradeDirection> {
        let zone = state.zone;
        if !state.fired_long && prev_close <= zone.buy_trigger && close > zone.buy_trigger {
            Some(TradeDirection::Long)
        } else if !state.fired_short && prev_close >= zone.sell_trigger && close < zone.sell_trigger
        {
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

        let mut state = self.period_for(bar);
        let prev_close = self.prev_close.replace(bar.close);
        let direction = prev_close.and_then(|prev| Self::crossing(&state, prev, bar.close));
        match direction {
            Some(TradeDirection::Long) => state.fired_long = true,
            Some(TradeDirection::Short) => state.fired_short = true,
            None => {}
        }
        self.period = Some(state);

        direction.map(|d| self.signal(bar, &state.zone, d))
    }

    fn signal(&self, bar: &Bar, zone: &Zone, direction: TradeDirection) -> StructuralSignal {
        let pip = self.config.pip_size;
        let sign = direction.sign();
        let (trigger, opposite, far_edge) = match direction {
            TradeDirection::Long => (zone.buy_trigger, zone.sell_trigger, zone.bottom),
            TradeDirection::Short => (zone.sell_trigger, zone.buy_trigger, zone.top),
        };

        let mut offset = 0.0;
        let targets = self
            .config
            .target_heights
            .iter()
            .map(|height| {
                offset += (self.config.target_gap + height) * pip;
                trigger + sign * offset
            })
            .collect();

        let stop_loss = match self.config.stop {
            ZoneStop::OppositeTrigger => opposite,
            ZoneStop::ZoneBoundary => far_edge,
            ZoneStop::Fixed { pips } => bar.close - sign * pips * pip,
        };

        StructuralSignal {
            timestamp: bar.timestamp,
            direction,
            entry: bar.close,
            stop_loss,
            targets,
            kind: None,
        }
    }
}

impl StructuralEvaluator for ZoneBreakEvaluator {
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
        let Some(prev_close) = self.prev_close else {
            return false;
        };
        let state = self.period_for(bar);
        Self::crossing(&state, prev_close, bar.close) == Some(current.opposite())
    }

    fn min_bars(&self) -> usize {
        2
    }
}
