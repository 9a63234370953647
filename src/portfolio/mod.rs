//! Portfolio-level decision layer. A `PortfolioAlgorithm` sees all of the
//! day's bars and the read-only state and proposes ticker-tagged orders; most
//! strategies are per-asset algorithms lifted through `PerAssetAdapter`.

use log::info;

use crate::algo::{AlgoIncome, ProposedOrder, Side, TradingAlgorithm};
use crate::input::DateBars;
use crate::schedule::{MonthListSchedule, TradingSchedule};
use crate::state::SimulationState;
use crate::types::AssetState;

pub trait PortfolioAlgorithm {
    /// Called once per trading day, before execution. Proposals are executed
    /// in the order returned.
    fn evaluate(
        &mut self,
        date: &i64,
        bars: &DateBars,
        state: &SimulationState,
    ) -> Vec<(String, ProposedOrder)>;

    /// Withdrawal-policy hook, consulted per asset before forced sales.
    fn withdrawal_shares(&mut self, _needed: f64, _asset: &AssetState) -> Option<f64> {
        None
    }

    fn income(&self) -> AlgoIncome {
        AlgoIncome::default()
    }
}

/// Runs one independent `TradingAlgorithm` per ticker against a shared bank.
/// Tickers are evaluated in the fixed order they were added, so runs are
/// reproducible.
pub struct PerAssetAdapter {
    algos: Vec<(String, Box<dyn TradingAlgorithm>)>,
}

impl PerAssetAdapter {
    pub fn new() -> Self {
        Self { algos: Vec::new() }
    }

    pub fn add_algo(&mut self, ticker: impl Into<String>, algo: Box<dyn TradingAlgorithm>) {
        self.algos.push((ticker.into(), algo));
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.algos.iter().map(|(ticker, _)| ticker.as_str()).collect()
    }
}

impl Default for PerAssetAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioAlgorithm for PerAssetAdapter {
    fn evaluate(
        &mut self,
        _date: &i64,
        bars: &DateBars,
        state: &SimulationState,
    ) -> Vec<(String, ProposedOrder)> {
        let mut proposals = Vec::new();
        //Running balance the day's proposals will leave behind, mirroring the
        //arithmetic execution applies in proposal order. Each algorithm sees
        //only the cash earlier proposals have not already committed, so a
        //no-margin run never proposes a buy execution would skip.
        let mut bank = if state.margin_allowed() {
            f64::MAX
        } else {
            state.bank()
        };
        for (ticker, algo) in &mut self.algos {
            //Missing bar means the ticker did not trade that day
            let Some(bar) = bars.get(ticker) else {
                continue;
            };
            let asset = AssetState {
                ticker: ticker.clone(),
                holdings: state.holdings(ticker),
                price: bar.close,
            };
            for order in algo.evaluate(bar, &asset, bank) {
                match order.side {
                    Side::Buy => bank -= order.qty * order.price,
                    Side::Sell => bank += order.qty * order.price,
                }
                proposals.push((ticker.clone(), order));
            }
        }
        proposals
    }

    fn withdrawal_shares(&mut self, needed: f64, asset: &AssetState) -> Option<f64> {
        for (ticker, algo) in &mut self.algos {
            if ticker == &asset.ticker {
                return algo.withdrawal_shares(needed, asset);
            }
        }
        None
    }

    fn income(&self) -> AlgoIncome {
        let mut total = AlgoIncome::default();
        for (_, algo) in &self.algos {
            let income = algo.income();
            total.primary += income.primary;
            total.secondary += income.secondary;
            total.fill_alpha += income.fill_alpha;
        }
        total
    }
}

//A calendar month can contain many trading days; the day-count throttle keeps
//a scheduled month from rebalancing more than once.
const REBALANCE_THROTTLE_SECS: i64 = 80 * 86400;

/// Rebalances to fixed target weights in scheduled calendar months. Sells are
/// proposed before buys so the sales fund the purchases within the day.
pub struct CalendarRebalance {
    weights: Vec<(String, f64)>,
    schedule: MonthListSchedule,
    last_rebalance: Option<i64>,
    min_trade_value: f64,
}

impl CalendarRebalance {
    pub fn new(weights: Vec<(String, f64)>, schedule: MonthListSchedule) -> Self {
        Self {
            weights,
            schedule,
            last_rebalance: None,
            min_trade_value: 100.0,
        }
    }

    pub fn with_min_trade_value(mut self, value: f64) -> Self {
        self.min_trade_value = value;
        self
    }
}

impl PortfolioAlgorithm for CalendarRebalance {
    fn evaluate(
        &mut self,
        date: &i64,
        bars: &DateBars,
        state: &SimulationState,
    ) -> Vec<(String, ProposedOrder)> {
        if !self.schedule.should_trade(date) {
            return Vec::new();
        }
        if let Some(last) = self.last_rebalance {
            if date - last < REBALANCE_THROTTLE_SECS {
                return Vec::new();
            }
        }
        self.last_rebalance = Some(*date);

        let total = state.portfolio_value(bars);
        info!("rebalancing portfolio of {:.2}", total);

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for (ticker, weight) in &self.weights {
            let Some(bar) = bars.get(ticker) else {
                continue;
            };
            if !bar.is_valid() {
                continue;
            }
            let current = state.holdings(ticker) * bar.close;
            let delta = weight * total - current;
            if delta.abs() < self.min_trade_value {
                continue;
            }
            let qty = (delta.abs() / bar.close).floor();
            if qty <= 0.0 {
                continue;
            }
            if delta < 0.0 {
                sells.push((
                    ticker.clone(),
                    ProposedOrder::sell(qty, bar.close, "rebalance"),
                ));
            } else {
                buys.push((
                    ticker.clone(),
                    ProposedOrder::buy(qty, bar.close, "rebalance"),
                ));
            }
        }
        sells.extend(buys);
        sells
    }
}
