//! Shared-bank accounting. `SimulationState` is the only writer of the bank
//! balance, holdings, and the ledger; everything else proposes.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::algo::{ProposedOrder, Side};
use crate::input::DateBars;
use crate::types::{Action, Transaction};

/// Pseudo-ticker for uninvested cash. It never holds shares; allocations to it
/// stay in the bank and earn interest there.
pub const CASH: &str = "CASH";

/// End-of-day portfolio valuation row.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PortfolioSnapshot {
    pub date: i64,
    pub bank: f64,
    pub value: f64,
    pub holdings: HashMap<String, f64>,
}

pub struct SimulationState {
    bank: f64,
    //A negative bank is a margin loan. Without margin, buys that would
    //overdraw degrade to SKIP BUY rows instead.
    margin_allowed: bool,
    holdings: HashMap<String, f64>,
    last_price: HashMap<String, f64>,
    ledger: Vec<Transaction>,
    history: Vec<PortfolioSnapshot>,
    min_bank: f64,
    max_bank: f64,
    bank_total: f64,
    negative_bank_days: usize,
    positive_bank_days: usize,
}

impl SimulationState {
    pub fn new(initial_bank: f64, margin_allowed: bool) -> Self {
        Self {
            bank: initial_bank,
            margin_allowed,
            holdings: HashMap::new(),
            last_price: HashMap::new(),
            ledger: Vec::new(),
            history: Vec::new(),
            min_bank: initial_bank,
            max_bank: initial_bank,
            bank_total: 0.0,
            negative_bank_days: 0,
            positive_bank_days: 0,
        }
    }

    pub fn bank(&self) -> f64 {
        self.bank
    }

    pub fn margin_allowed(&self) -> bool {
        self.margin_allowed
    }

    pub fn holdings(&self, ticker: &str) -> f64 {
        self.holdings.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn all_holdings(&self) -> &HashMap<String, f64> {
        &self.holdings
    }

    pub fn ledger(&self) -> &[Transaction] {
        &self.ledger
    }

    pub fn history(&self) -> &[PortfolioSnapshot] {
        &self.history
    }

    pub fn min_bank(&self) -> f64 {
        self.min_bank
    }

    pub fn max_bank(&self) -> f64 {
        self.max_bank
    }

    pub fn average_bank(&self) -> f64 {
        if self.history.is_empty() {
            self.bank
        } else {
            self.bank_total / self.history.len() as f64
        }
    }

    pub fn negative_bank_days(&self) -> usize {
        self.negative_bank_days
    }

    pub fn positive_bank_days(&self) -> usize {
        self.positive_bank_days
    }

    fn last_price(&self, ticker: &str) -> f64 {
        self.last_price.get(ticker).copied().unwrap_or(0.0)
    }

    /// Marked value of everything held plus the bank. Tickers missing from
    /// today's bars are valued at their last seen close.
    pub fn portfolio_value(&self, bars: &DateBars) -> f64 {
        let assets: f64 = self
            .holdings
            .iter()
            .map(|(ticker, qty)| {
                let price = bars
                    .get(ticker)
                    .map(|bar| bar.close)
                    .unwrap_or_else(|| self.last_price(ticker));
                qty * price
            })
            .sum();
        self.bank + assets
    }

    /// Average bank balance over the trailing window, the accrual basis for
    /// scheduled interest on the CASH pseudo-ticker.
    pub fn average_bank_over(&self, as_of: i64, lookback_secs: i64) -> f64 {
        let from = as_of - lookback_secs;
        let mut total = 0.0;
        let mut days = 0;
        for snapshot in self.history.iter().rev() {
            if snapshot.date > as_of {
                continue;
            }
            if snapshot.date < from {
                break;
            }
            total += snapshot.bank;
            days += 1;
        }
        if days == 0 {
            self.bank
        } else {
            total / days as f64
        }
    }

    /// Average daily holdings of `ticker` over the trailing `lookback_secs`
    /// window ending at `as_of`. Payment-date accruals use this so shares
    /// bought the day before a payment do not earn a full period.
    pub fn average_holdings(&self, ticker: &str, as_of: i64, lookback_secs: i64) -> f64 {
        let from = as_of - lookback_secs;
        let mut total = 0.0;
        let mut days = 0;
        for snapshot in self.history.iter().rev() {
            if snapshot.date > as_of {
                continue;
            }
            if snapshot.date < from {
                break;
            }
            total += snapshot.holdings.get(ticker).copied().unwrap_or(0.0);
            days += 1;
        }
        if days == 0 {
            self.holdings(ticker)
        } else {
            total / days as f64
        }
    }

    fn push(&mut self, action: Action, qty: f64, price: f64, date: i64, ticker: &str, note: String) {
        let tx = Transaction {
            action,
            quantity: qty,
            price,
            date,
            ticker: ticker.to_string(),
            note,
            holdings: self.holdings(ticker),
            bank: self.bank,
        };
        debug!("{}", tx);
        self.ledger.push(tx);
    }

    /// Applies a proposed order, degrading it to a SKIP row when the shared
    /// bank (without margin) or the position cannot support it. Returns true
    /// if shares actually moved.
    pub fn execute(&mut self, date: i64, ticker: &str, order: &ProposedOrder) -> bool {
        match order.side {
            Side::Buy => {
                let cost = order.qty * order.price;
                if !self.margin_allowed && cost > self.bank {
                    info!(
                        "insufficient bank {:.2} for {:.2} {} buy, skipping",
                        self.bank, order.qty, ticker
                    );
                    self.push(
                        Action::SkipBuy,
                        order.qty,
                        order.price,
                        date,
                        ticker,
                        format!("short {:.2} of {:.2} cost", cost - self.bank, cost),
                    );
                    return false;
                }
                self.bank -= cost;
                *self.holdings.entry(ticker.to_string()).or_insert(0.0) += order.qty;
                self.push(
                    Action::Buy,
                    order.qty,
                    order.price,
                    date,
                    ticker,
                    order.note.clone(),
                );
                true
            }
            Side::Sell => {
                let available = self.holdings(ticker);
                if order.qty > available {
                    info!(
                        "insufficient {} position {:.2} for {:.2} sell, skipping",
                        ticker, available, order.qty
                    );
                    self.push(
                        Action::SkipSell,
                        order.qty,
                        order.price,
                        date,
                        ticker,
                        format!("short {:.2} of {:.2} shares", order.qty - available, order.qty),
                    );
                    return false;
                }
                self.bank += order.qty * order.price;
                if let Some(held) = self.holdings.get_mut(ticker) {
                    *held -= order.qty;
                }
                self.push(
                    Action::Sell,
                    order.qty,
                    order.price,
                    date,
                    ticker,
                    order.note.clone(),
                );
                true
            }
        }
    }

    /// Credits dividend or interest income to the bank.
    pub fn record_income(
        &mut self,
        date: i64,
        ticker: &str,
        action: Action,
        amount: f64,
        note: impl Into<String>,
    ) {
        self.bank += amount;
        self.push(action, amount, 1.0, date, ticker, note.into());
    }

    /// Debits a withdrawal from the bank. Callers are responsible for raising
    /// the cash first; without margin the bank must not go negative.
    pub fn record_withdrawal(&mut self, date: i64, amount: f64, note: impl Into<String>) {
        self.bank -= amount;
        self.push(Action::Withdrawal, amount, 1.0, date, CASH, note.into());
    }

    /// Closes the day: values the portfolio, updates the bank trackers, and
    /// appends to the holdings history used by trailing-average accrual.
    pub fn snapshot(&mut self, date: i64, bars: &DateBars) {
        for (ticker, bar) in bars {
            self.last_price.insert(ticker.clone(), bar.close);
        }
        let value = self.portfolio_value(bars);
        self.min_bank = self.min_bank.min(self.bank);
        self.max_bank = self.max_bank.max(self.bank);
        self.bank_total += self.bank;
        if self.bank < 0.0 {
            self.negative_bank_days += 1;
        } else {
            self.positive_bank_days += 1;
        }
        self.history.push(PortfolioSnapshot {
            date,
            bank: self.bank,
            value,
            holdings: self.holdings.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::SimulationState;
    use crate::algo::ProposedOrder;
    use crate::input::{Bar, DateBars};
    use crate::types::Action;

    fn bars_with(ticker: &str, close: f64, date: i64) -> DateBars {
        let mut bars = DateBars::new();
        bars.insert(
            ticker.to_string(),
            Bar {
                open: close,
                high: close,
                low: close,
                close,
                date,
                ticker: ticker.to_string(),
            },
        );
        bars
    }

    #[test]
    fn test_that_buy_moves_cash_into_holdings() {
        let mut state = SimulationState::new(100_000.0, false);
        let executed = state.execute(100, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
        assert!(executed);
        assert_eq!(state.bank(), 95_000.0);
        assert_eq!(state.holdings("ABC"), 100.0);
        assert_eq!(state.ledger().len(), 1);
        assert_eq!(state.ledger()[0].action, Action::Buy);
    }

    #[test]
    fn test_that_unaffordable_buy_degrades_to_skip_without_margin() {
        let mut state = SimulationState::new(1_000.0, false);
        let executed = state.execute(100, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
        assert!(!executed);
        assert_eq!(state.bank(), 1_000.0);
        assert_eq!(state.holdings("ABC"), 0.0);
        assert_eq!(state.ledger()[0].action, Action::SkipBuy);
    }

    #[test]
    fn test_that_margin_allows_negative_bank() {
        let mut state = SimulationState::new(1_000.0, true);
        let executed = state.execute(100, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
        assert!(executed);
        assert_eq!(state.bank(), -4_000.0);
        assert_eq!(state.holdings("ABC"), 100.0);
    }

    #[test]
    fn test_that_oversized_sell_degrades_to_skip() {
        let mut state = SimulationState::new(10_000.0, false);
        state.execute(100, "ABC", &ProposedOrder::buy(50.0, 100.0, ""));
        let executed = state.execute(186400, "ABC", &ProposedOrder::sell(80.0, 110.0, ""));
        assert!(!executed);
        assert_eq!(state.holdings("ABC"), 50.0);
        assert_eq!(state.ledger()[1].action, Action::SkipSell);
        //The skip row carries the shortfall
        assert!(state.ledger()[1].note.contains("short 30.00"));
    }

    #[test]
    fn test_that_skip_buy_carries_the_shortfall() {
        let mut state = SimulationState::new(1_000.0, false);
        let executed = state.execute(100, "ABC", &ProposedOrder::sell(10.0, 110.0, ""));
        assert!(!executed);
        assert_eq!(state.ledger()[0].action, Action::SkipSell);
        assert_eq!(state.bank(), 1_000.0);

        state.execute(100, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
        assert_eq!(state.ledger()[1].action, Action::SkipBuy);
        assert!(state.ledger()[1].note.contains("short 4000.00"));
    }

    #[test]
    fn test_that_snapshot_tracks_bank_extremes() {
        let mut state = SimulationState::new(1_000.0, true);
        state.execute(100, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
        state.snapshot(100, &bars_with("ABC", 50.0, 100));
        state.execute(186400, "ABC", &ProposedOrder::sell(100.0, 60.0, ""));
        state.snapshot(186400, &bars_with("ABC", 60.0, 186400));

        assert_eq!(state.min_bank(), -4_000.0);
        assert_eq!(state.max_bank(), 2_000.0);
        assert_eq!(state.negative_bank_days(), 1);
        assert_eq!(state.history().len(), 2);
        //Value on day one: -4000 bank + 100 shares at 50
        assert_eq!(state.history()[0].value, 1_000.0);
    }

    #[test]
    fn test_that_average_holdings_is_window_bounded() {
        let mut state = SimulationState::new(100_000.0, false);
        state.execute(0, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
        for day in 0..10 {
            let date = day * 86400;
            if day == 5 {
                state.execute(date, "ABC", &ProposedOrder::buy(100.0, 50.0, ""));
            }
            state.snapshot(date, &bars_with("ABC", 50.0, date));
        }

        //Full window: five days at 100 and five at 200
        let avg = state.average_holdings("ABC", 9 * 86400, 10 * 86400);
        assert_eq!(avg, 150.0);
        //Short window only sees the doubled position
        let avg = state.average_holdings("ABC", 9 * 86400, 4 * 86400);
        assert_eq!(avg, 200.0);
    }

    #[test]
    fn test_that_income_and_withdrawal_move_the_bank() {
        let mut state = SimulationState::new(1_000.0, false);
        state.record_income(100, "ABC", Action::Dividend, 250.0, "quarterly dividend");
        assert_eq!(state.bank(), 1_250.0);
        state.record_withdrawal(100, 200.0, "monthly withdrawal");
        assert_eq!(state.bank(), 1_050.0);
        assert_eq!(state.ledger()[1].action, Action::Withdrawal);
    }
}
