//! Dividend and interest accrual. Dividends pay on their payment date against
//! trailing-average holdings; cash interest accrues daily on the bank balance,
//! as a cost when margin has driven the bank negative.

use crate::input::Market;
use crate::state::{SimulationState, CASH};
use crate::types::Action;

const DAYS_PER_YEAR: f64 = 365.25;
const DEFAULT_LOOKBACK_DAYS: i64 = 90;

pub struct IncomeAccrual {
    lookback_secs: i64,
    //Fixed annual cash rate, used when no rate source ticker is set
    cash_rate: f64,
    //Ticker whose daily close-to-close return sets the day's cash rate
    rate_source: Option<String>,
}

impl IncomeAccrual {
    pub fn new() -> Self {
        Self {
            lookback_secs: DEFAULT_LOOKBACK_DAYS * 86400,
            cash_rate: 0.0,
            rate_source: None,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_secs = days * 86400;
        self
    }

    pub fn with_cash_rate(mut self, annual_rate: f64) -> Self {
        self.cash_rate = annual_rate;
        self
    }

    pub fn with_rate_source(mut self, ticker: impl Into<String>) -> Self {
        self.rate_source = Some(ticker.into());
        self
    }

    fn daily_cash_return(&self, date: &i64, market: &Market) -> f64 {
        match &self.rate_source {
            Some(ticker) => market.daily_return(date, ticker).unwrap_or(0.0),
            None => self.cash_rate / DAYS_PER_YEAR,
        }
    }

    /// Credits dividend payments due today. Average holdings over the
    /// trailing window are the payment basis, so shares bought the day before
    /// a payment date earn almost nothing and shares sold mid-period still
    /// earn their held stretch. Runs before withdrawal processing so the
    /// payment can fund the withdrawal.
    pub fn pay_dividends(&self, date: &i64, market: &Market, state: &mut SimulationState) {
        let tickers: Vec<String> = state.all_holdings().keys().cloned().collect();
        for ticker in tickers {
            let Some(per_share) = market.dividends_due(date, &ticker) else {
                continue;
            };
            let basis = state.average_holdings(&ticker, *date, self.lookback_secs);
            let amount = per_share * basis;
            if amount <= 0.0 {
                continue;
            }
            state.record_income(
                *date,
                &ticker,
                Action::Dividend,
                amount,
                format!("{:.4}/share on {:.2} avg shares", per_share, basis),
            );
        }

        //Scheduled interest on the CASH sweep is sized against the average
        //bank balance, there are no shares to count
        if let Some(rate) = market.dividends_due(date, CASH) {
            let basis = state.average_bank_over(*date, self.lookback_secs);
            let amount = rate * basis;
            if amount > 0.0 {
                state.record_income(
                    *date,
                    CASH,
                    Action::Interest,
                    amount,
                    format!("{:.4} rate on {:.2} avg bank", rate, basis),
                );
            }
        }
    }

    /// Accrues one day of interest on the bank balance, as a cost when margin
    /// has driven it negative. Runs after withdrawal processing, on the
    /// balance the withdrawal left behind.
    pub fn accrue_interest(&self, date: &i64, market: &Market, state: &mut SimulationState) {
        let rate = self.daily_cash_return(date, market);
        let interest = state.bank() * rate;
        if interest.abs() > 1e-9 {
            let note = if interest < 0.0 {
                "margin interest"
            } else {
                "cash interest"
            };
            state.record_income(*date, CASH, Action::Interest, interest, note);
        }
    }
}

impl Default for IncomeAccrual {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::IncomeAccrual;
    use crate::algo::ProposedOrder;
    use crate::input::MarketBuilder;
    use crate::state::SimulationState;
    use crate::types::Action;

    #[test]
    fn test_that_dividend_pays_on_trailing_average_holdings() {
        let mut builder = MarketBuilder::new();
        for day in 0..10 {
            builder.add_flat_bar(100.0, day * 86400, "ABC");
        }
        builder.add_dividend(1.0, 9 * 86400, "ABC");
        let market = builder.build();

        let mut state = SimulationState::new(100_000.0, false);
        state.execute(0, "ABC", &ProposedOrder::buy(100.0, 100.0, ""));
        for day in 0..9 {
            let date = day * 86400;
            if day == 5 {
                state.execute(date, "ABC", &ProposedOrder::buy(100.0, 100.0, ""));
            }
            state.snapshot(date, market.get_bars(&date).unwrap());
        }

        let accrual = IncomeAccrual::new();
        accrual.pay_dividends(&(9 * 86400), &market, &mut state);

        let dividend = state
            .ledger()
            .iter()
            .find(|tx| tx.action == Action::Dividend)
            .unwrap();
        //Five days at 100 shares, four at 200: average 144.44, not the
        //current 200
        assert!((dividend.quantity - 1300.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_that_scheduled_cash_interest_uses_average_bank() {
        let mut builder = MarketBuilder::new();
        for day in 0..4 {
            builder.add_flat_bar(100.0, day * 86400, "ABC");
        }
        //0.1% scheduled sweep payment on the CASH pseudo-ticker
        builder.add_dividend(0.001, 3 * 86400, "CASH");
        let market = builder.build();

        let mut state = SimulationState::new(10_000.0, false);
        state.snapshot(0, market.get_bars(&0).unwrap());
        state.execute(86400, "ABC", &ProposedOrder::buy(50.0, 100.0, ""));
        state.snapshot(86400, market.get_bars(&86400).unwrap());
        state.snapshot(2 * 86400, market.get_bars(&(2 * 86400)).unwrap());

        let accrual = IncomeAccrual::new();
        accrual.pay_dividends(&(3 * 86400), &market, &mut state);

        let interest = state
            .ledger()
            .iter()
            .find(|tx| tx.action == Action::Interest)
            .unwrap();
        //Bank was 10000 for one day and 5000 for two: average 6666.67
        assert!((interest.quantity - 0.001 * 20_000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_that_fixed_cash_rate_accrues_daily_interest() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(100.0, 0, "ABC");
        let market = builder.build();

        let mut state = SimulationState::new(36_525.0, false);
        let accrual = IncomeAccrual::new().with_cash_rate(0.05);
        accrual.accrue_interest(&0, &market, &mut state);

        let interest = state
            .ledger()
            .iter()
            .find(|tx| tx.action == Action::Interest)
            .unwrap();
        //36525 * 5% / 365.25 = 5.00 per day
        assert!((interest.quantity - 5.0).abs() < 1e-9);
        assert_eq!(interest.note, "cash interest");
    }

    #[test]
    fn test_that_negative_bank_pays_margin_interest() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(100.0, 0, "ABC");
        let market = builder.build();

        let mut state = SimulationState::new(1_000.0, true);
        state.execute(0, "ABC", &ProposedOrder::buy(100.0, 100.0, ""));
        assert!(state.bank() < 0.0);

        let accrual = IncomeAccrual::new().with_cash_rate(0.05);
        let before = state.bank();
        accrual.accrue_interest(&0, &market, &mut state);
        assert!(state.bank() < before);

        let interest = state
            .ledger()
            .iter()
            .find(|tx| tx.action == Action::Interest)
            .unwrap();
        assert_eq!(interest.note, "margin interest");
    }

    #[test]
    fn test_that_rate_source_uses_market_daily_return() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(100.0, 0, "BIL");
        builder.add_flat_bar(100.1, 86400, "BIL");
        let market = builder.build();

        let mut state = SimulationState::new(10_000.0, false);
        let accrual = IncomeAccrual::new().with_rate_source("BIL");
        accrual.accrue_interest(&86400, &market, &mut state);

        let interest = state
            .ledger()
            .iter()
            .find(|tx| tx.action == Action::Interest)
            .unwrap();
        //10000 * 0.1% daily return
        assert!((interest.quantity - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_that_no_dividend_and_no_rate_is_silent() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(100.0, 0, "ABC");
        let market = builder.build();

        let mut state = SimulationState::new(10_000.0, false);
        let accrual = IncomeAccrual::new();
        accrual.pay_dividends(&0, &market, &mut state);
        accrual.accrue_interest(&0, &market, &mut state);
        assert!(state.ledger().is_empty());
    }
}
