//! Results aggregation. Builds a `PerformanceSummary` from the completed
//! simulation state: returns, bank statistics, and the three-tier income
//! decomposition (profit-taking, buyback harvest, dividends and interest).

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::algo::AlgoIncome;
use crate::input::Market;
use crate::state::SimulationState;
use crate::types::{format_date, Action};

const SECS_PER_YEAR: f64 = 365.25 * 86400.0;

/// Realized income split by origin. `universal` is income any strategy would
/// have collected (dividends and interest); the other two exist only because
/// the algorithm traded.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct IncomeBreakdown {
    pub primary: f64,
    pub secondary: f64,
    pub universal: f64,
}

impl IncomeBreakdown {
    pub fn total(&self) -> f64 {
        self.primary + self.secondary + self.universal
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PerformanceSummary {
    pub start_date: i64,
    pub end_date: i64,
    pub initial_value: f64,
    pub final_value: f64,
    /// Change in portfolio value alone.
    pub total_return: f64,
    /// Return counting withdrawn cash as returned capital.
    pub gross_return: f64,
    pub annualized_return: f64,
    /// Buy-and-hold return of the benchmark over the same window.
    pub benchmark_return: Option<f64>,
    /// Gross return over the benchmark. Positive means the harvesting paid
    /// for itself.
    pub volatility_alpha: Option<f64>,
    /// Fractional alpha the algorithms accrued fill by fill on buybacks. A
    /// path-local estimate, unlike `volatility_alpha` it needs no benchmark.
    pub fill_alpha: f64,
    pub min_bank: f64,
    pub max_bank: f64,
    pub average_bank: f64,
    pub negative_bank_days: usize,
    pub positive_bank_days: usize,
    pub dividends_by_ticker: HashMap<String, f64>,
    /// Interest earned on a positive bank.
    pub interest_total: f64,
    /// Interest paid on a negative bank, reported as a positive cost.
    pub opportunity_cost: f64,
    pub withdrawals_total: f64,
    pub withdrawal_count: usize,
    pub income: IncomeBreakdown,
}

impl PerformanceSummary {
    pub fn dividends_total(&self) -> f64 {
        self.dividends_by_ticker.values().sum()
    }
}

impl Display for PerformanceSummary {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        writeln!(
            f,
            "{} to {}: {:.2} -> {:.2}",
            format_date(self.start_date),
            format_date(self.end_date),
            self.initial_value,
            self.final_value
        )?;
        writeln!(
            f,
            "return {:.2}% ({:.2}% annualized, {:.2}% gross of withdrawals)",
            self.total_return * 100.0,
            self.annualized_return * 100.0,
            self.gross_return * 100.0
        )?;
        if let (Some(benchmark), Some(alpha)) = (self.benchmark_return, self.volatility_alpha) {
            writeln!(
                f,
                "benchmark {:.2}%, volatility alpha {:.2}%",
                benchmark * 100.0,
                alpha * 100.0
            )?;
        }
        writeln!(f, "per-fill alpha estimate {:.2}%", self.fill_alpha * 100.0)?;
        writeln!(
            f,
            "bank min {:.2} / avg {:.2} / max {:.2}, {} negative days, {} positive days",
            self.min_bank,
            self.average_bank,
            self.max_bank,
            self.negative_bank_days,
            self.positive_bank_days
        )?;
        writeln!(
            f,
            "interest earned {:.2}, opportunity cost {:.2}",
            self.interest_total, self.opportunity_cost
        )?;
        let pct = |v: f64| {
            if self.initial_value > 0.0 {
                v / self.initial_value * 100.0
            } else {
                0.0
            }
        };
        writeln!(
            f,
            "income {:.2} ({:.2}%): profit-taking {:.2} ({:.2}%), buyback harvest {:.2} ({:.2}%), dividends and interest {:.2} ({:.2}%)",
            self.income.total(),
            pct(self.income.total()),
            self.income.primary,
            pct(self.income.primary),
            self.income.secondary,
            pct(self.income.secondary),
            self.income.universal,
            pct(self.income.universal)
        )?;
        write!(
            f,
            "withdrawn {:.2} over {} withdrawals",
            self.withdrawals_total, self.withdrawal_count
        )
    }
}

pub struct ResultsAggregator<'a> {
    market: &'a Market,
    state: &'a SimulationState,
    algo_income: AlgoIncome,
    benchmark: Option<String>,
}

impl<'a> ResultsAggregator<'a> {
    pub fn new(market: &'a Market, state: &'a SimulationState, algo_income: AlgoIncome) -> Self {
        Self {
            market,
            state,
            algo_income,
            benchmark: None,
        }
    }

    pub fn with_benchmark(mut self, ticker: impl Into<String>) -> Self {
        self.benchmark = Some(ticker.into());
        self
    }

    pub fn summary(&self) -> PerformanceSummary {
        let history = self.state.history();
        let (start_date, initial_value) = history
            .first()
            .map(|s| (s.date, s.value))
            .unwrap_or((0, 0.0));
        let (end_date, final_value) = history
            .last()
            .map(|s| (s.date, s.value))
            .unwrap_or((start_date, initial_value));

        let mut dividends_by_ticker: HashMap<String, f64> = HashMap::new();
        let mut interest_earned = 0.0;
        let mut interest_paid = 0.0;
        let mut withdrawals = 0.0;
        let mut withdrawal_count = 0;
        for tx in self.state.ledger() {
            match tx.action {
                Action::Dividend => {
                    *dividends_by_ticker.entry(tx.ticker.clone()).or_insert(0.0) += tx.quantity;
                }
                Action::Interest => {
                    if tx.quantity >= 0.0 {
                        interest_earned += tx.quantity;
                    } else {
                        interest_paid -= tx.quantity;
                    }
                }
                Action::Withdrawal => {
                    withdrawals += tx.quantity;
                    withdrawal_count += 1;
                }
                _ => {}
            }
        }

        let total_return = if initial_value > 0.0 {
            (final_value - initial_value) / initial_value
        } else {
            0.0
        };
        //Withdrawn cash is returned capital, not a loss
        let gross_return = if initial_value > 0.0 {
            (final_value + withdrawals - initial_value) / initial_value
        } else {
            0.0
        };
        let elapsed = (end_date - start_date) as f64;
        let annualized_return = if elapsed > 0.0 && initial_value > 0.0 {
            (1.0 + gross_return).powf(SECS_PER_YEAR / elapsed) - 1.0
        } else {
            0.0
        };

        let benchmark_return = self
            .benchmark
            .as_deref()
            .and_then(|ticker| self.market.whole_period_return(ticker));
        let volatility_alpha = benchmark_return.map(|b| gross_return - b);

        //Net interest: earned minus the margin cost
        let universal =
            dividends_by_ticker.values().sum::<f64>() + interest_earned - interest_paid;
        PerformanceSummary {
            start_date,
            end_date,
            initial_value,
            final_value,
            total_return,
            gross_return,
            annualized_return,
            benchmark_return,
            volatility_alpha,
            fill_alpha: self.algo_income.fill_alpha,
            min_bank: self.state.min_bank(),
            max_bank: self.state.max_bank(),
            average_bank: self.state.average_bank(),
            negative_bank_days: self.state.negative_bank_days(),
            positive_bank_days: self.state.positive_bank_days(),
            dividends_by_ticker,
            interest_total: interest_earned,
            opportunity_cost: interest_paid,
            withdrawals_total: withdrawals,
            withdrawal_count,
            income: IncomeBreakdown {
                primary: self.algo_income.primary,
                secondary: self.algo_income.secondary,
                universal,
            },
        }
    }
}
