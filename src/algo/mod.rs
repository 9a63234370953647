//! Per-asset trading algorithms. Algorithms are pure proposers: they are
//! handed the day's bar, a read-only asset snapshot, and the shared bank
//! balance, and return proposed orders. Only `SimulationState` mutates
//! balances.

pub mod synthetic;

pub use synthetic::{AthOnly, BuybackLot, SyntheticDividend};

use serde::{Deserialize, Serialize};

use crate::input::Bar;
use crate::types::AssetState;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// An order proposed by an algorithm. Execution (and therefore acceptance or
/// degradation to a SKIP entry) happens in `SimulationState`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProposedOrder {
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub note: String,
}

impl ProposedOrder {
    pub fn buy(qty: f64, price: f64, note: impl Into<String>) -> Self {
        Self {
            side: Side::Buy,
            qty,
            price,
            note: note.into(),
        }
    }

    pub fn sell(qty: f64, price: f64, note: impl Into<String>) -> Self {
        Self {
            side: Side::Sell,
            qty,
            price,
            note: note.into(),
        }
    }
}

/// Income and alpha accumulated by an algorithm, split the way the results
/// aggregator reports it: `primary` is profit-taking at new highs, `secondary`
/// is buyback-harvesting profit, both in dollars. `fill_alpha` is the
/// dimensionless per-fill alpha estimate accrued on buyback fills. Dividends
/// and interest are universal income and tracked by the ledger, not here.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct AlgoIncome {
    pub primary: f64,
    pub secondary: f64,
    pub fill_alpha: f64,
}

pub trait TradingAlgorithm {
    /// Called once per trading day with the day's bar for this asset. `bank`
    /// is the cash still uncommitted for the day (`f64::MAX` on margin
    /// accounts); proposals must stay inside it, since an unaffordable buy
    /// would be skipped at execution and leave the algorithm's bookkeeping
    /// describing fills that never happened.
    fn evaluate(&mut self, bar: &Bar, asset: &AssetState, bank: f64) -> Vec<ProposedOrder>;

    /// Withdrawal-policy hook: how many shares this asset volunteers to sell
    /// toward a cash shortfall. `None` keeps the default cash-first
    /// proportional policy.
    fn withdrawal_shares(&mut self, _needed: f64, _asset: &AssetState) -> Option<f64> {
        None
    }

    fn income(&self) -> AlgoIncome {
        AlgoIncome::default()
    }
}

/// Invests the full budget at the first valid open, then holds.
pub struct BuyAndHold {
    budget: f64,
    invested: bool,
}

impl BuyAndHold {
    pub fn new(budget: f64) -> Self {
        Self {
            budget,
            invested: false,
        }
    }
}

impl TradingAlgorithm for BuyAndHold {
    fn evaluate(&mut self, bar: &Bar, _asset: &AssetState, bank: f64) -> Vec<ProposedOrder> {
        if self.invested || !bar.is_valid() {
            return Vec::new();
        }
        let qty = (self.budget.min(bank) / bar.open).floor();
        self.invested = true;
        if qty <= 0.0 {
            return Vec::new();
        }
        vec![ProposedOrder::buy(qty, bar.open, "initial position")]
    }
}
