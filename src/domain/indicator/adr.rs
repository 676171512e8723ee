//! Average Daily Range.
//!
//! Intraday bars are grouped by calendar date. ADR at a bar is the mean range
//! (high - low) of the `period` most recent *completed* days; the day the bar
//! belongs to is excluded. `NaN` until `period` days have completed.

use std::collections::VecDeque;

use chrono::NaiveDate;

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

/// Incremental ADR state, fed one bar at a time.
#[derive(Debug, Clone)]
pub struct DailyRangeTracker {
    period: usize,
    current_day: Option<NaiveDate>,
    day_high: f64,
    day_low: f64,
    completed: VecDeque<f64>,
}

impl DailyRangeTracker {
    pub fn new(period: usize) -> Self {
        DailyRangeTracker {
            period,
            current_day: None,
            day_high: f64::NEG_INFINITY,
            day_low: f64::INFINITY,
            completed: VecDeque::with_capacity(period + 1),
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        let date = bar.date();
        match self.current_day {
            Some(day) if day == date => {
                self.day_high = self.day_high.max(bar.high);
                self.day_low = self.day_low.min(bar.low);
            }
            Some(_) => {
                self.completed.push_back(self.day_high - self.day_low);
                while self.completed.len() > self.period {
                    self.completed.pop_front();
                }
                self.start_day(bar);
            }
            None => self.start_day(bar),
        }
    }

    fn start_day(&mut self, bar: &Bar) {
        self.current_day = Some(bar.date());
        self.day_high = bar.high;
        self.day_low = bar.low;
    }

    /// Mean completed-day range, `None` until `period` days are complete.
    pub fn average(&self) -> Option<f64> {
        if self.period == 0 || self.completed.len() < self.period {
            return None;
        }
        Some(self.completed.iter().sum::<f64>() / self.period as f64)
    }

    pub fn completed_days(&self) -> usize {
        self.completed.len()
    }
}

pub fn calculate_adr(bars: &[Bar], period: usize) -> IndicatorSeries {
    let mut tracker = DailyRangeTracker::new(period);
    let values = bars
        .iter()
        .map(|bar| {
            tracker.update(bar);
            tracker.average().unwrap_or(f64::NAN)
        })
        .collect();
    IndicatorSeries::from_simple(IndicatorType::Adr { period }, values)
}
