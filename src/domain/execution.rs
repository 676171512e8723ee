//! Trade execution and fill simulation.
//!
//! Slippage and commission, stop/target placement, exit priority and the
//! trailing-stop ratchet. The lifecycle steps here operate on a [`Portfolio`]
//! and are shared by the rule-driven engine and the structural driver.

use std::collections::HashMap;

use super::indicator::adr::calculate_adr;
use super::indicator::atr::atr_values;
use super::ohlcv::Bar;
use super::portfolio::Portfolio;
use super::position::{ExitReason, Trade, TradeDirection};
use super::rule::RuleDirection;
use super::strategy::{PositionSizing, RiskConfig, StopMethod, TargetMethod};

/// flat_fee + (traded value * pct / 100), charged once per round trip.
pub fn calculate_commission(traded_value: f64, risk: &RiskConfig) -> f64 {
    risk.commission_per_trade + traded_value * risk.commission_pct / 100.0
}

/// Entry fills move against the trader: longs pay up, shorts sell lower.
pub fn apply_entry_slippage(price: f64, direction: TradeDirection, slippage_pct: f64) -> f64 {
    price * (1.0 + direction.sign() * slippage_pct / 100.0)
}

/// Exit fills move against the trader: longs sell lower, shorts cover higher.
pub fn apply_exit_slippage(price: f64, direction: TradeDirection, slippage_pct: f64) -> f64 {
    price * (1.0 - direction.sign() * slippage_pct / 100.0)
}

/// Absolute stop and target prices for a new entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryLevels {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub take_profit_2: Option<f64>,
}

fn target_as_distance(method: &TargetMethod) -> Option<StopMethod> {
    match *method {
        TargetMethod::Fixed { pips } => Some(StopMethod::Fixed { pips }),
        TargetMethod::Atr { period, multiplier } => Some(StopMethod::Atr { period, multiplier }),
        TargetMethod::Adr { period, percent } => Some(StopMethod::Adr { period, percent }),
        TargetMethod::Percent { percent } => Some(StopMethod::Percent { percent }),
        TargetMethod::None | TargetMethod::RiskReward { .. } => None,
    }
}

/// ATR and ADR series needed by the configured stop, target and trailing
/// methods, keyed by period.
#[derive(Debug, Clone, Default)]
pub struct RiskSeries {
    atr: HashMap<usize, Vec<f64>>,
    adr: HashMap<usize, Vec<f64>>,
}

impl RiskSeries {
    pub fn compute(bars: &[Bar], risk: &RiskConfig) -> Self {
        let mut methods = vec![risk.stop_loss];
        methods.extend(target_as_distance(&risk.take_profit));
        methods.extend(risk.take_profit_2.as_ref().and_then(target_as_distance));
        methods.extend(risk.trailing_stop.map(|t| t.distance));

        let mut series = RiskSeries::default();
        for method in methods {
            match method {
                StopMethod::Atr { period, .. } => {
                    series
                        .atr
                        .entry(period)
                        .or_insert_with(|| atr_values(bars, period));
                }
                StopMethod::Adr { period, .. } => {
                    series.adr.entry(period).or_insert_with(|| {
                        let adr = calculate_adr(bars, period);
                        (0..adr.len()).map(|i| adr.simple_at(i)).collect()
                    });
                }
                _ => {}
            }
        }
        series
    }

    /// Price distance for `method` at `index`, `None` while warming up or
    /// when the method yields no positive distance.
    pub fn distance(
        &self,
        method: &StopMethod,
        index: usize,
        price: f64,
        pip_size: f64,
    ) -> Option<f64> {
        let distance = match *method {
            StopMethod::None => return None,
            StopMethod::Fixed { pips } => pips * pip_size,
            StopMethod::Atr { period, multiplier } => {
                self.atr.get(&period)?.get(index).copied()? * multiplier
            }
            StopMethod::Adr { period, percent } => {
                self.adr.get(&period)?.get(index).copied()? * percent / 100.0
            }
            StopMethod::Percent { percent } => price * percent / 100.0,
        };
        (distance.is_finite() && distance > 0.0).then_some(distance)
    }

    /// Stop and targets for an entry filled at `price`. `None` means a
    /// configured method cannot produce a level yet and the entry is skipped.
    pub fn entry_levels(
        &self,
        risk: &RiskConfig,
        index: usize,
        direction: TradeDirection,
        price: f64,
    ) -> Option<EntryLevels> {
        let sign = direction.sign();
        let stop_distance = if risk.stop_loss.is_none() {
            None
        } else {
            Some(self.distance(&risk.stop_loss, index, price, risk.pip_size)?)
        };

        let target = |method: &TargetMethod| -> Option<Option<f64>> {
            let distance = match method {
                TargetMethod::None => return Some(None),
                TargetMethod::RiskReward { ratio } => stop_distance? * ratio,
                other => {
                    let as_stop = target_as_distance(other)?;
                    self.distance(&as_stop, index, price, risk.pip_size)?
                }
            };
            Some(Some(price + sign * distance))
        };

        let take_profit = target(&risk.take_profit)?;
        let take_profit_2 = match &risk.take_profit_2 {
            Some(method) => target(method)?,
            None => None,
        };

        Some(EntryLevels {
            stop_loss: stop_distance.map(|d| price - sign * d),
            take_profit,
            take_profit_2,
        })
    }
}

/// Exit decision for one open trade on `bar`, with the raw fill level.
///
/// Priority: second target, first target (only when the stop was not also
/// breached on this bar), stop (reported as trailing once the trail moved
/// it), exit signal at the close.
pub fn check_exit(trade: &Trade, bar: &Bar, exit_signal: bool) -> Option<(ExitReason, f64)> {
    let stop_hit = trade.stop_reached(bar.high, bar.low);

    if let Some(tp2) = trade.take_profit_2 {
        if trade.target_reached(tp2, bar.high, bar.low) {
            return Some((ExitReason::TakeProfit2, tp2));
        }
    }
    if let Some(tp1) = trade.take_profit {
        if !stop_hit && trade.target_reached(tp1, bar.high, bar.low) {
            return Some((ExitReason::TakeProfit, tp1));
        }
    }
    if stop_hit {
        if let Some(stop) = trade.stop_loss {
            let reason = if trade.trailing_active {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            return Some((reason, stop));
        }
    }
    if exit_signal {
        return Some((ExitReason::ExitSignal, bar.close));
    }
    None
}

/// Tighten the stop to `close ∓ distance` once the trade is `activation`
/// in profit. The stop never loosens. Returns whether it moved.
pub fn ratchet_trailing_stop(trade: &mut Trade, close: f64, distance: f64, activation: f64) -> bool {
    let sign = trade.direction.sign();
    if sign * (close - trade.entry_price) < activation {
        return false;
    }
    let candidate = close - sign * distance;
    let tighter = match trade.stop_loss {
        None => true,
        Some(stop) => sign * (candidate - stop) > 0.0,
    };
    if tighter {
        trade.stop_loss = Some(candidate);
        trade.trailing_active = true;
    }
    tighter
}

/// Close the open trade at `position` with a raw fill level.
pub fn close_position(
    portfolio: &mut Portfolio,
    risk: &RiskConfig,
    position: usize,
    index: usize,
    bar: &Bar,
    level: f64,
    reason: ExitReason,
) -> f64 {
    let trade = &portfolio.open_trades[position];
    let price = apply_exit_slippage(level, trade.direction, risk.slippage_pct);
    let traded = (trade.entry_price + price) * trade.size * trade.contract_size;
    let commission = calculate_commission(traded, risk);
    portfolio.close_trade(
        position,
        index,
        bar.timestamp,
        price,
        reason,
        commission,
        risk.breakeven_on_tp1,
    )
}

/// Exit step of a bar: fixed-priority exits for every open trade, decided on
/// the state at the start of the bar, then the trailing ratchet for the
/// survivors.
pub fn process_exits(
    portfolio: &mut Portfolio,
    risk: &RiskConfig,
    series: &RiskSeries,
    index: usize,
    bar: &Bar,
    exit_signal: Option<RuleDirection>,
) {
    let triggered: Vec<(usize, ExitReason, f64)> = portfolio
        .open_trades
        .iter()
        .filter_map(|trade| {
            let signalled = exit_signal.is_some_and(|d| d.covers(trade.direction));
            check_exit(trade, bar, signalled).map(|(reason, level)| (trade.id, reason, level))
        })
        .collect();

    for (id, reason, level) in triggered {
        if let Some(position) = portfolio.open_trades.iter().position(|t| t.id == id) {
            close_position(portfolio, risk, position, index, bar, level, reason);
        }
    }

    if let Some(trailing) = &risk.trailing_stop {
        if let Some(distance) = series.distance(&trailing.distance, index, bar.close, risk.pip_size)
        {
            let activation = trailing.activation_pips * risk.pip_size;
            for trade in &mut portfolio.open_trades {
                ratchet_trailing_stop(trade, bar.close, distance, activation);
            }
        }
    }
}

/// Close every open trade on `direction` at the bar's close.
pub fn close_direction(
    portfolio: &mut Portfolio,
    risk: &RiskConfig,
    index: usize,
    bar: &Bar,
    direction: TradeDirection,
    reason: ExitReason,
) -> usize {
    let mut closed = 0;
    while let Some(position) = portfolio
        .open_trades
        .iter()
        .position(|t| t.direction == direction)
    {
        close_position(portfolio, risk, position, index, bar, bar.close, reason);
        closed += 1;
    }
    closed
}

/// Close everything at the bar's close.
pub fn close_all(
    portfolio: &mut Portfolio,
    risk: &RiskConfig,
    index: usize,
    bar: &Bar,
    reason: ExitReason,
) {
    while !portfolio.open_trades.is_empty() {
        close_position(portfolio, risk, 0, index, bar, bar.close, reason);
    }
}

/// Units for a new entry, `None` when sizing cannot be resolved.
pub fn position_size(risk: &RiskConfig, balance: f64, price: f64, stop: Option<f64>) -> Option<f64> {
    match risk.sizing {
        PositionSizing::Fixed { units } => Some(units),
        PositionSizing::RiskPercent { percent } => {
            let distance = (price - stop?).abs();
            if distance <= 0.0 || balance <= 0.0 {
                return None;
            }
            Some(balance * percent / 100.0 / (distance * risk.contract_size))
        }
    }
}

/// Open one trade, or a lot-split pair when both targets exist and a split
/// fraction is configured. Returns the number of trades opened; zero when the
/// open-trade limit leaves no room.
pub fn open_entry(
    portfolio: &mut Portfolio,
    risk: &RiskConfig,
    index: usize,
    bar: &Bar,
    direction: TradeDirection,
    price: f64,
    levels: EntryLevels,
) -> usize {
    let split = match (risk.lot_split, levels.take_profit, levels.take_profit_2) {
        (Some(fraction), Some(_), Some(_)) => Some(fraction),
        _ => None,
    };
    let needed = if split.is_some() { 2 } else { 1 };
    if portfolio.open_count() + needed > risk.max_open_trades {
        return 0;
    }
    let Some(size) = position_size(risk, portfolio.balance, price, levels.stop_loss) else {
        return 0;
    };
    if !(size > 0.0) {
        return 0;
    }

    let template = Trade {
        id: 0,
        direction,
        entry_bar: index,
        entry_time: bar.timestamp,
        entry_price: price,
        size,
        contract_size: risk.contract_size,
        stop_loss: levels.stop_loss,
        take_profit: levels.take_profit,
        take_profit_2: levels.take_profit_2,
        trailing_active: false,
        sibling: None,
        exit_bar: None,
        exit_time: None,
        exit_price: None,
        exit_reason: None,
        pnl: 0.0,
        commission: 0.0,
    };

    match split {
        Some(fraction) => {
            let first_id = portfolio.next_trade_id();
            let second_id = portfolio.next_trade_id();
            let first = Trade {
                id: first_id,
                size: size * fraction,
                take_profit_2: None,
                sibling: Some(second_id),
                ..template.clone()
            };
            let second = Trade {
                id: second_id,
                size: size * (1.0 - fraction),
                take_profit: None,
                sibling: Some(first_id),
                ..template
            };
            log::debug!(
                "opened lot-split #{}/#{} {} at {:.5} on bar {}",
                first_id,
                second_id,
                direction,
                price,
                index
            );
            portfolio.add_trade(first);
            portfolio.add_trade(second);
            2
        }
        None => {
            let id = portfolio.next_trade_id();
            log::debug!("opened #{} {} at {:.5} on bar {}", id, direction, price, index);
            portfolio.add_trade(Trade { id, ..template });
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator_helpers::bars_from_closes;
    use crate::domain::strategy::TrailingStop;

    fn risk() -> RiskConfig {
        RiskConfig {
            initial_balance: 10_000.0,
            pip_size: 0.01,
            max_open_trades: 2,
            close_on_reversal: true,
            ..Default::default()
        }
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        let mut b = bars_from_closes(&[close]).remove(0);
        b.open = open;
        b.high = high;
        b.low = low;
        b
    }

    fn open_trade(direction: TradeDirection, levels: EntryLevels) -> Portfolio {
        let mut portfolio = Portfolio::new(10_000.0);
        let opened = open_entry(
            &mut portfolio,
            &risk(),
            0,
            &bar(100.0, 100.0, 100.0, 100.0),
            direction,
            100.0,
            levels,
        );
        assert_eq!(opened, 1);
        portfolio
    }

    #[test]
    fn commission_flat_plus_pct() {
        let r = RiskConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            ..risk()
        };
        let expected = 10.0 + 20000.0 * 0.1 / 100.0;
        assert!((calculate_commission(20000.0, &r) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn slippage_moves_against_trader() {
        assert!((apply_entry_slippage(100.0, TradeDirection::Long, 0.05) - 100.05).abs() < 1e-9);
        assert!((apply_entry_slippage(100.0, TradeDirection::Short, 0.05) - 99.95).abs() < 1e-9);
        assert!((apply_exit_slippage(100.0, TradeDirection::Long, 0.05) - 99.95).abs() < 1e-9);
        assert!((apply_exit_slippage(100.0, TradeDirection::Short, 0.05) - 100.05).abs() < 1e-9);
    }

    #[test]
    fn fixed_levels_for_long_and_short() {
        let r = RiskConfig {
            stop_loss: StopMethod::Fixed { pips: 50.0 },
            take_profit: TargetMethod::Fixed { pips: 100.0 },
            ..risk()
        };
        let series = RiskSeries::compute(&[], &r);
        let long = series.entry_levels(&r, 0, TradeDirection::Long, 100.0).unwrap();
        assert!((long.stop_loss.unwrap() - 99.5).abs() < 1e-9);
        assert!((long.take_profit.unwrap() - 101.0).abs() < 1e-9);
        let short = series.entry_levels(&r, 0, TradeDirection::Short, 100.0).unwrap();
        assert!((short.stop_loss.unwrap() - 100.5).abs() < 1e-9);
        assert!((short.take_profit.unwrap() - 99.0).abs() < 1e-9);
    }

    #[test]
    fn risk_reward_target_scales_stop() {
        let r = RiskConfig {
            stop_loss: StopMethod::Percent { percent: 1.0 },
            take_profit: TargetMethod::RiskReward { ratio: 2.5 },
            ..risk()
        };
        let series = RiskSeries::compute(&[], &r);
        let levels = series.entry_levels(&r, 0, TradeDirection::Long, 200.0).unwrap();
        assert!((levels.stop_loss.unwrap() - 198.0).abs() < 1e-9);
        assert!((levels.take_profit.unwrap() - 205.0).abs() < 1e-9);
    }

    #[test]
    fn warming_atr_skips_entry() {
        let bars = bars_from_closes(&[100.0; 20]);
        let r = RiskConfig {
            stop_loss: StopMethod::Atr {
                period: 14,
                multiplier: 2.0,
            },
            ..risk()
        };
        let series = RiskSeries::compute(&bars, &r);
        assert!(series.entry_levels(&r, 5, TradeDirection::Long, 100.0).is_none());
    }

    #[test]
    fn adr_levels_wait_for_completed_days() {
        use crate::domain::indicator_helpers::intraday_bars;

        // hourly bars: day one is 0..24, day two 24..48
        let bars = intraday_bars(24 * 4, 60);
        let r = RiskConfig {
            stop_loss: StopMethod::Adr {
                period: 2,
                percent: 50.0,
            },
            take_profit: TargetMethod::Adr {
                period: 2,
                percent: 100.0,
            },
            ..risk()
        };
        let series = RiskSeries::compute(&bars, &r);
        assert!(series.entry_levels(&r, 10, TradeDirection::Long, 100.0).is_none());
        assert!(series.entry_levels(&r, 47, TradeDirection::Long, 100.0).is_none());

        let adr = calculate_adr(&bars, 2).simple_at(60);
        assert!(adr > 0.0);
        let long = series.entry_levels(&r, 60, TradeDirection::Long, 100.0).unwrap();
        assert!((long.stop_loss.unwrap() - (100.0 - adr * 0.5)).abs() < 1e-9);
        assert!((long.take_profit.unwrap() - (100.0 + adr)).abs() < 1e-9);

        let short = series.entry_levels(&r, 60, TradeDirection::Short, 100.0).unwrap();
        assert!((short.stop_loss.unwrap() - (100.0 + adr * 0.5)).abs() < 1e-9);
        assert!((short.take_profit.unwrap() - (100.0 - adr)).abs() < 1e-9);
    }

    #[test]
    fn exit_priority_tp2_over_everything() {
        let levels = EntryLevels {
            stop_loss: Some(95.0),
            take_profit: Some(105.0),
            take_profit_2: Some(110.0),
        };
        let portfolio = open_trade(TradeDirection::Long, levels);
        let straddle = bar(100.0, 111.0, 94.0, 100.0);
        assert_eq!(
            check_exit(&portfolio.open_trades[0], &straddle, true),
            Some((ExitReason::TakeProfit2, 110.0))
        );
    }

    #[test]
    fn exit_priority_stop_beats_tp1_on_same_bar() {
        let levels = EntryLevels {
            stop_loss: Some(95.0),
            take_profit: Some(105.0),
            take_profit_2: None,
        };
        let portfolio = open_trade(TradeDirection::Long, levels);
        let trade = &portfolio.open_trades[0];
        assert_eq!(
            check_exit(trade, &bar(100.0, 106.0, 94.0, 100.0), false),
            Some((ExitReason::StopLoss, 95.0))
        );
        assert_eq!(
            check_exit(trade, &bar(100.0, 106.0, 99.0, 100.0), false),
            Some((ExitReason::TakeProfit, 105.0))
        );
        assert_eq!(
            check_exit(trade, &bar(100.0, 101.0, 99.0, 100.5), true),
            Some((ExitReason::ExitSignal, 100.5))
        );
        assert_eq!(check_exit(trade, &bar(100.0, 101.0, 99.0, 100.5), false), None);
    }

    #[test]
    fn short_exits_mirror() {
        let levels = EntryLevels {
            stop_loss: Some(105.0),
            take_profit: Some(95.0),
            take_profit_2: None,
        };
        let portfolio = open_trade(TradeDirection::Short, levels);
        let trade = &portfolio.open_trades[0];
        assert_eq!(
            check_exit(trade, &bar(100.0, 101.0, 94.0, 96.0), false),
            Some((ExitReason::TakeProfit, 95.0))
        );
        assert_eq!(
            check_exit(trade, &bar(100.0, 106.0, 99.0, 104.0), false),
            Some((ExitReason::StopLoss, 105.0))
        );
    }

    #[test]
    fn trailing_stop_only_tightens() {
        let levels = EntryLevels {
            stop_loss: Some(95.0),
            take_profit: None,
            take_profit_2: None,
        };
        let mut portfolio = open_trade(TradeDirection::Long, levels);
        let trade = &mut portfolio.open_trades[0];

        assert!(!ratchet_trailing_stop(trade, 101.0, 3.0, 2.0));
        assert!(ratchet_trailing_stop(trade, 104.0, 3.0, 2.0));
        assert_eq!(trade.stop_loss, Some(101.0));
        assert!(trade.trailing_active);
        assert!(!ratchet_trailing_stop(trade, 103.0, 3.0, 2.0));
        assert_eq!(trade.stop_loss, Some(101.0));

        assert_eq!(
            check_exit(trade, &bar(102.0, 102.0, 100.5, 101.0), false),
            Some((ExitReason::TrailingStop, 101.0))
        );
    }

    #[test]
    fn process_exits_ratchets_survivors() {
        let r = RiskConfig {
            trailing_stop: Some(TrailingStop {
                distance: StopMethod::Fixed { pips: 100.0 },
                activation_pips: 0.0,
            }),
            ..risk()
        };
        let series = RiskSeries::compute(&[], &r);
        let mut portfolio = Portfolio::new(10_000.0);
        let levels = EntryLevels {
            stop_loss: Some(95.0),
            take_profit: None,
            take_profit_2: None,
        };
        open_entry(
            &mut portfolio,
            &r,
            0,
            &bar(100.0, 100.0, 100.0, 100.0),
            TradeDirection::Long,
            100.0,
            levels,
        );
        process_exits(&mut portfolio, &r, &series, 1, &bar(100.0, 103.0, 99.0, 102.0), None);
        assert_eq!(portfolio.open_count(), 1);
        assert_eq!(portfolio.open_trades[0].stop_loss, Some(101.0));
    }

    #[test]
    fn lot_split_opens_linked_pair() {
        let r = RiskConfig {
            lot_split: Some(0.25),
            sizing: PositionSizing::Fixed { units: 4.0 },
            ..risk()
        };
        let mut portfolio = Portfolio::new(10_000.0);
        let levels = EntryLevels {
            stop_loss: Some(95.0),
            take_profit: Some(105.0),
            take_profit_2: Some(110.0),
        };
        let opened = open_entry(
            &mut portfolio,
            &r,
            3,
            &bar(100.0, 100.0, 100.0, 100.0),
            TradeDirection::Long,
            100.0,
            levels,
        );
        assert_eq!(opened, 2);
        let (a, b) = (&portfolio.open_trades[0], &portfolio.open_trades[1]);
        assert_eq!(a.size, 1.0);
        assert_eq!(b.size, 3.0);
        assert_eq!(a.take_profit, Some(105.0));
        assert_eq!(a.take_profit_2, None);
        assert_eq!(b.take_profit, None);
        assert_eq!(b.take_profit_2, Some(110.0));
        assert_eq!(a.sibling, Some(b.id));
        assert_eq!(b.sibling, Some(a.id));
    }

    #[test]
    fn breakeven_after_first_target() {
        let r = RiskConfig {
            lot_split: Some(0.5),
            breakeven_on_tp1: true,
            ..risk()
        };
        let series = RiskSeries::compute(&[], &r);
        let mut portfolio = Portfolio::new(10_000.0);
        let levels = EntryLevels {
            stop_loss: Some(95.0),
            take_profit: Some(105.0),
            take_profit_2: Some(110.0),
        };
        open_entry(
            &mut portfolio,
            &r,
            0,
            &bar(100.0, 100.0, 100.0, 100.0),
            TradeDirection::Long,
            100.0,
            levels,
        );
        process_exits(&mut portfolio, &r, &series, 1, &bar(100.0, 106.0, 99.0, 104.0), None);
        assert_eq!(portfolio.closed_trades.len(), 1);
        assert_eq!(portfolio.closed_trades[0].exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(portfolio.open_trades[0].stop_loss, Some(100.0));
    }

    #[test]
    fn open_limit_is_respected() {
        let r = RiskConfig {
            max_open_trades: 1,
            ..risk()
        };
        let mut portfolio = Portfolio::new(10_000.0);
        let levels = EntryLevels {
            stop_loss: None,
            take_profit: None,
            take_profit_2: None,
        };
        let b = bar(100.0, 100.0, 100.0, 100.0);
        assert_eq!(open_entry(&mut portfolio, &r, 0, &b, TradeDirection::Long, 100.0, levels), 1);
        assert_eq!(open_entry(&mut portfolio, &r, 1, &b, TradeDirection::Long, 100.0, levels), 0);
        assert_eq!(portfolio.open_count(), 1);
    }

    #[test]
    fn risk_percent_sizing_from_stop() {
        let r = RiskConfig {
            sizing: PositionSizing::RiskPercent { percent: 1.0 },
            contract_size: 10.0,
            ..risk()
        };
        // risk 100 over a 2.0 stop at 10 per point
        let size = position_size(&r, 10_000.0, 100.0, Some(98.0)).unwrap();
        assert!((size - 5.0).abs() < 1e-9);
        assert!(position_size(&r, 10_000.0, 100.0, None).is_none());
    }

    #[test]
    fn close_direction_only_matching_side() {
        let r = RiskConfig {
            max_open_trades: 3,
            ..risk()
        };
        let mut portfolio = Portfolio::new(10_000.0);
        let levels = EntryLevels {
            stop_loss: None,
            take_profit: None,
            take_profit_2: None,
        };
        let b = bar(100.0, 100.0, 100.0, 100.0);
        open_entry(&mut portfolio, &r, 0, &b, TradeDirection::Long, 100.0, levels);
        open_entry(&mut portfolio, &r, 0, &b, TradeDirection::Short, 100.0, levels);
        open_entry(&mut portfolio, &r, 0, &b, TradeDirection::Long, 100.0, levels);
        let closed = close_direction(&mut portfolio, &r, 1, &b, TradeDirection::Long, ExitReason::Reversal);
        assert_eq!(closed, 2);
        assert_eq!(portfolio.open_count(), 1);
        assert_eq!(portfolio.open_trades[0].direction, TradeDirection::Short);
    }
}
