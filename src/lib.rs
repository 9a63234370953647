//! demeter is a portfolio backtesting library built around a single idea:
//! treat the profits a volatility-harvesting strategy realizes as a
//! "synthetic dividend" and account for it the way real income is accounted
//! for. The simulation walks a calendar of daily bars, runs one trading
//! algorithm per asset against a shared bank, accrues real dividends and
//! interest, services a withdrawal policy, and reports income split by
//! origin.
//!
//! The library is data-source agnostic: callers assemble a [input::Market]
//! up front (from CSV, an API, or [input::Market::random]) and the engine
//! never performs I/O. A run looks like:
//!
//! ```
//! use demeter::input::Market;
//! use demeter::sim::SimulationBuilder;
//!
//! let market = Market::random(252, vec!["ABC"]);
//! let mut sim = SimulationBuilder::new()
//!     .with_market(market)
//!     .with_initial_cash(100_000.0)
//!     .add_allocation("ABC", 1.0)
//!     .with_algo("sd8,50%")
//!     .with_benchmark("ABC")
//!     .build()
//!     .unwrap();
//! let summary = sim.run();
//! println!("{}", summary);
//! ```

pub mod accrual;
pub mod algo;
pub mod bracket;
pub mod factory;
pub mod input;
pub mod perf;
pub mod portfolio;
pub mod schedule;
pub mod sim;
pub mod state;
pub mod types;
pub mod withdrawal;
