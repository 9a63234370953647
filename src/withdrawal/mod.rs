//! Periodic withdrawal policy. The withdrawal amount is fixed at the start of
//! the run from the initial portfolio value; cash funds it first, then forced
//! sales spread proportionally across the holdings.

use log::{info, warn};

use crate::algo::ProposedOrder;
use crate::input::DateBars;
use crate::portfolio::PortfolioAlgorithm;
use crate::state::SimulationState;
use crate::types::AssetState;

const DAYS_PER_YEAR: f64 = 365.25;

pub struct WithdrawalPolicy {
    annual_rate: f64,
    frequency_days: i64,
    //Fixed dollar amount per period, set from the portfolio value on the
    //first trading day. Withdrawals do not shrink as the portfolio does.
    per_period: Option<f64>,
    last_withdrawal: Option<i64>,
}

impl WithdrawalPolicy {
    /// `annual_rate` is the fraction of the initial portfolio value withdrawn
    /// per year, paid out every `frequency_days`.
    pub fn new(annual_rate: f64, frequency_days: i64) -> Self {
        Self {
            annual_rate,
            frequency_days,
            per_period: None,
            last_withdrawal: None,
        }
    }

    pub fn monthly(annual_rate: f64) -> Self {
        Self::new(annual_rate, 30)
    }

    pub fn quarterly(annual_rate: f64) -> Self {
        Self::new(annual_rate, 91)
    }

    fn raise_cash(
        &self,
        date: &i64,
        shortfall: f64,
        bars: &DateBars,
        state: &mut SimulationState,
        algo: &mut dyn PortfolioAlgorithm,
    ) {
        //Algorithms get first refusal: a bracket algorithm may volunteer
        //shares it would rather part with than its buyback queue
        let mut remaining = shortfall;
        let held: Vec<(String, f64)> = state
            .all_holdings()
            .iter()
            .filter(|(_, qty)| **qty > 0.0)
            .map(|(ticker, qty)| (ticker.clone(), *qty))
            .collect();

        for (ticker, qty) in &held {
            if remaining <= 0.0 {
                return;
            }
            let Some(bar) = bars.get(ticker) else {
                continue;
            };
            let asset = AssetState {
                ticker: ticker.clone(),
                holdings: *qty,
                price: bar.close,
            };
            if let Some(shares) = algo.withdrawal_shares(remaining, &asset) {
                let shares = shares.min(*qty);
                if shares > 0.0 {
                    state.execute(
                        *date,
                        ticker,
                        &ProposedOrder::sell(shares, bar.close, "withdrawal"),
                    );
                    remaining -= shares * bar.close;
                }
            }
        }

        if remaining <= 0.0 {
            return;
        }

        //Forced sales proportional to position value
        let total: f64 = held
            .iter()
            .filter_map(|(ticker, _)| {
                let bar = bars.get(ticker)?;
                Some(state.holdings(ticker) * bar.close)
            })
            .sum();
        if total <= 0.0 {
            return;
        }
        for (ticker, _) in &held {
            let Some(bar) = bars.get(ticker) else {
                continue;
            };
            let value = state.holdings(ticker) * bar.close;
            let target = remaining * value / total;
            let qty = (target / bar.close).ceil().min(state.holdings(ticker));
            if qty > 0.0 {
                state.execute(
                    *date,
                    ticker,
                    &ProposedOrder::sell(qty, bar.close, "forced sale for withdrawal"),
                );
            }
        }
    }

    /// Runs after the day's trading and accrual. Returns the amount actually
    /// withdrawn, zero on non-withdrawal days.
    pub fn process(
        &mut self,
        date: &i64,
        bars: &DateBars,
        state: &mut SimulationState,
        algo: &mut dyn PortfolioAlgorithm,
    ) -> f64 {
        let Some(per_period) = self.per_period else {
            let amount = state.portfolio_value(bars) * self.annual_rate * self.frequency_days as f64
                / DAYS_PER_YEAR;
            self.per_period = Some(amount);
            self.last_withdrawal = Some(*date);
            return 0.0;
        };

        match self.last_withdrawal {
            Some(last) if date - last < self.frequency_days * 86400 => return 0.0,
            _ => {}
        }
        self.last_withdrawal = Some(*date);

        if state.bank() < per_period && !state.margin_allowed() {
            self.raise_cash(date, per_period - state.bank(), bars, state, algo);
        }

        let amount = if state.margin_allowed() {
            per_period
        } else {
            //Whatever forced sales could raise caps the payout
            per_period.min(state.bank().max(0.0))
        };
        if amount < per_period {
            warn!(
                "portfolio exhausted: withdrew {:.2} of {:.2}",
                amount, per_period
            );
        }
        if amount > 0.0 {
            info!("withdrawal of {:.2}", amount);
            state.record_withdrawal(*date, amount, "periodic withdrawal");
        }
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::WithdrawalPolicy;
    use crate::algo::ProposedOrder;
    use crate::input::{Bar, DateBars};
    use crate::portfolio::PerAssetAdapter;
    use crate::state::SimulationState;
    use crate::types::Action;

    fn bars_with(rows: &[(&str, f64)], date: i64) -> DateBars {
        let mut bars = DateBars::new();
        for (ticker, close) in rows {
            bars.insert(
                ticker.to_string(),
                Bar {
                    open: *close,
                    high: *close,
                    low: *close,
                    close: *close,
                    date,
                    ticker: ticker.to_string(),
                },
            );
        }
        bars
    }

    #[test]
    fn test_that_amount_is_fixed_from_initial_value() {
        let mut policy = WithdrawalPolicy::new(0.04, 30);
        let mut state = SimulationState::new(100_000.0, false);
        let mut algo = PerAssetAdapter::new();

        let bars = bars_with(&[("ABC", 100.0)], 0);
        assert_eq!(policy.process(&0, &bars, &mut state, &mut algo), 0.0);

        //100000 * 4% * 30 / 365.25 = 328.54 per period
        let date = 30 * 86400;
        let bars = bars_with(&[("ABC", 100.0)], date);
        let amount = policy.process(&date, &bars, &mut state, &mut algo);
        assert!((amount - 328.54).abs() < 0.01);
        assert!((state.bank() - (100_000.0 - amount)).abs() < 1e-9);
    }

    #[test]
    fn test_that_off_schedule_days_withdraw_nothing() {
        let mut policy = WithdrawalPolicy::new(0.04, 30);
        let mut state = SimulationState::new(100_000.0, false);
        let mut algo = PerAssetAdapter::new();

        let bars = bars_with(&[("ABC", 100.0)], 0);
        policy.process(&0, &bars, &mut state, &mut algo);
        let date = 10 * 86400;
        let bars = bars_with(&[("ABC", 100.0)], date);
        assert_eq!(policy.process(&date, &bars, &mut state, &mut algo), 0.0);
    }

    #[test]
    fn test_that_shortfall_forces_proportional_sales() {
        let mut policy = WithdrawalPolicy::new(0.10, 365);
        let mut state = SimulationState::new(100_000.0, false);
        let mut algo = PerAssetAdapter::new();

        //Fully invested: 600 ABC at 100, 800 BCD at 50
        state.execute(0, "ABC", &ProposedOrder::buy(600.0, 100.0, ""));
        state.execute(0, "BCD", &ProposedOrder::buy(800.0, 50.0, ""));
        assert_eq!(state.bank(), 0.0);

        let bars = bars_with(&[("ABC", 100.0), ("BCD", 50.0)], 0);
        policy.process(&0, &bars, &mut state, &mut algo);

        let date = 365 * 86400;
        let bars = bars_with(&[("ABC", 100.0), ("BCD", 50.0)], date);
        let amount = policy.process(&date, &bars, &mut state, &mut algo);

        //100000 * 10% * 365/365.25, funded entirely by forced sales
        assert!((amount - 9993.16).abs() < 0.01);
        let forced_value = |ticker: &str| {
            state
                .ledger()
                .iter()
                .filter(|tx| tx.action == Action::Sell && tx.ticker == ticker)
                .map(|tx| tx.value())
                .sum::<f64>()
        };
        //60/40 split between the two positions
        assert!((forced_value("ABC") / forced_value("BCD") - 1.5).abs() < 0.05);
        assert!(state.bank() >= 0.0);
    }

    #[test]
    fn test_that_exhausted_portfolio_pays_partial() {
        let mut policy = WithdrawalPolicy::new(1.0, 365);
        let mut state = SimulationState::new(1_000.0, false);
        let mut algo = PerAssetAdapter::new();

        let bars = bars_with(&[("ABC", 100.0)], 0);
        policy.process(&0, &bars, &mut state, &mut algo);

        //Portfolio has lost most of its value, only 200 left to pay out
        state.record_withdrawal(100, 800.0, "drain for test");
        let date = 365 * 86400;
        let bars = bars_with(&[("ABC", 100.0)], date);
        let amount = policy.process(&date, &bars, &mut state, &mut algo);
        assert_eq!(amount, 200.0);
        assert_eq!(state.bank(), 0.0);
    }

    #[test]
    fn test_that_margin_account_skips_forced_sales() {
        let mut policy = WithdrawalPolicy::new(0.10, 365);
        let mut state = SimulationState::new(100_000.0, true);
        let mut algo = PerAssetAdapter::new();

        state.execute(0, "ABC", &ProposedOrder::buy(1000.0, 100.0, ""));
        let bars = bars_with(&[("ABC", 100.0)], 0);
        policy.process(&0, &bars, &mut state, &mut algo);

        let date = 365 * 86400;
        let bars = bars_with(&[("ABC", 100.0)], date);
        let amount = policy.process(&date, &bars, &mut state, &mut algo);
        assert!(amount > 0.0);
        //Position untouched, the bank went further negative instead
        assert_eq!(state.holdings("ABC"), 1000.0);
        assert!(state.bank() < 0.0);
    }
}
