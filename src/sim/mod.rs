//! Simulation driver. The builder validates its inputs up front and fails
//! fast; `run` then walks the trading calendar day by day in a fixed order:
//! proposals, execution, accrual, withdrawal, snapshot.

use anyhow::{bail, Context, Result};
use log::info;

use crate::accrual::IncomeAccrual;
use crate::factory;
use crate::input::Market;
use crate::perf::{PerformanceSummary, ResultsAggregator};
use crate::portfolio::PortfolioAlgorithm;
use crate::state::{SimulationState, CASH};
use crate::types::format_date;
use crate::withdrawal::WithdrawalPolicy;

const ALLOCATION_TOLERANCE: f64 = 0.01;

pub struct SimulationBuilder {
    market: Option<Market>,
    initial_cash: f64,
    allocations: Vec<(String, f64)>,
    algo: String,
    margin_allowed: bool,
    accrual: IncomeAccrual,
    withdrawal: Option<WithdrawalPolicy>,
    benchmark: Option<String>,
}

impl SimulationBuilder {
    pub fn new() -> Self {
        Self {
            market: None,
            initial_cash: 0.0,
            allocations: Vec::new(),
            algo: "buy-and-hold".to_string(),
            margin_allowed: false,
            accrual: IncomeAccrual::new(),
            withdrawal: None,
            benchmark: None,
        }
    }

    pub fn with_market(mut self, market: Market) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_initial_cash(mut self, cash: f64) -> Self {
        self.initial_cash = cash;
        self
    }

    /// Fractional allocation of the initial cash to a ticker. The CASH
    /// pseudo-ticker leaves its share in the bank.
    pub fn add_allocation(mut self, ticker: impl Into<String>, weight: f64) -> Self {
        self.allocations.push((ticker.into(), weight));
        self
    }

    /// Strategy text in the factory grammar, e.g. "sd8,50%".
    pub fn with_algo(mut self, algo: impl Into<String>) -> Self {
        self.algo = algo.into();
        self
    }

    pub fn with_margin(mut self) -> Self {
        self.margin_allowed = true;
        self
    }

    pub fn with_accrual(mut self, accrual: IncomeAccrual) -> Self {
        self.accrual = accrual;
        self
    }

    pub fn with_withdrawal(mut self, policy: WithdrawalPolicy) -> Self {
        self.withdrawal = Some(policy);
        self
    }

    pub fn with_benchmark(mut self, ticker: impl Into<String>) -> Self {
        self.benchmark = Some(ticker.into());
        self
    }

    pub fn build(self) -> Result<Simulation> {
        let Some(market) = self.market else {
            bail!("simulation needs a market");
        };
        if market.dates().is_empty() {
            bail!("market has no trading days");
        }
        if self.initial_cash <= 0.0 {
            bail!("initial cash must be positive");
        }
        if self.allocations.is_empty() {
            bail!("simulation needs at least one allocation");
        }
        let total: f64 = self.allocations.iter().map(|(_, weight)| weight).sum();
        if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
            bail!("allocations sum to {:.4}, expected 1.0", total);
        }
        for (ticker, weight) in &self.allocations {
            if *weight < 0.0 {
                bail!("negative allocation for {}", ticker);
            }
            if ticker != CASH && !market.has_ticker(ticker) {
                bail!("no market data for {}", ticker);
            }
        }
        if let Some(ticker) = &self.benchmark {
            if !market.has_ticker(ticker) {
                bail!("no market data for benchmark {}", ticker);
            }
        }

        let algo = factory::build_portfolio(&self.algo, &self.allocations, self.initial_cash)
            .with_context(|| format!("building algorithm '{}'", self.algo))?;

        Ok(Simulation {
            state: SimulationState::new(self.initial_cash, self.margin_allowed),
            market,
            algo,
            accrual: self.accrual,
            withdrawal: self.withdrawal,
            benchmark: self.benchmark,
        })
    }
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Simulation {
    market: Market,
    state: SimulationState,
    algo: Box<dyn PortfolioAlgorithm>,
    accrual: IncomeAccrual,
    withdrawal: Option<WithdrawalPolicy>,
    benchmark: Option<String>,
}

impl Simulation {
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Runs the whole calendar and aggregates the results. Each day follows
    /// the same order: algorithm proposals are executed as proposed, then
    /// dividends due are paid, then the withdrawal policy runs, then interest
    /// accrues, then the day is snapshotted.
    pub fn run(&mut self) -> PerformanceSummary {
        let dates = self.market.dates().to_vec();
        info!(
            "running {} trading days from {}",
            dates.len(),
            dates.first().map(|d| format_date(*d)).unwrap_or_default()
        );

        for date in &dates {
            let Some(bars) = self.market.get_bars(date) else {
                continue;
            };
            let proposals = self.algo.evaluate(date, bars, &self.state);
            for (ticker, order) in proposals {
                self.state.execute(*date, &ticker, &order);
            }
            //Dividends land before the withdrawal so they can fund it;
            //interest accrues after, on the balance the withdrawal left
            self.accrual.pay_dividends(date, &self.market, &mut self.state);
            if let Some(policy) = &mut self.withdrawal {
                policy.process(date, bars, &mut self.state, self.algo.as_mut());
            }
            self.accrual.accrue_interest(date, &self.market, &mut self.state);
            self.state.snapshot(*date, bars);
        }

        let mut aggregator =
            ResultsAggregator::new(&self.market, &self.state, self.algo.income());
        if let Some(ticker) = &self.benchmark {
            aggregator = aggregator.with_benchmark(ticker.clone());
        }
        aggregator.summary()
    }
}
