//! Algorithm factory. Parses the textual strategy grammar used by the CLI and
//! config layer and builds the portfolio algorithm for a set of allocations.
//!
//! Accepted forms:
//!   buy-and-hold
//!   sd8              bracket count, 50% profit sharing
//!   sd8,75%          explicit profit sharing (a `/` separator also works)
//!   sd-9.05%,50%     explicit trigger rate
//!   sd-ath-only-9.05%,50%
//!   auto             per-ticker bracket count from the asset class
//!   quarterly-rebalance | monthly-rebalance | annual-rebalance
//!   quarterly-rebalance:1,7  explicit rebalance months
//!   per-asset:<algo> explicit per-asset spelling, same meaning as <algo>

use anyhow::{anyhow, bail, Context, Result};

use crate::algo::{AthOnly, BuyAndHold, SyntheticDividend, TradingAlgorithm};
use crate::bracket::BracketSpec;
use crate::portfolio::{CalendarRebalance, PerAssetAdapter, PortfolioAlgorithm};
use crate::schedule::MonthListSchedule;
use crate::state::CASH;

const DEFAULT_PROFIT_SHARING: f64 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub enum RebalanceFrequency {
    Monthly,
    Quarterly,
    Annual,
    /// Explicit calendar months, 1 through 12.
    Months(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlgoSpec {
    BuyAndHold,
    Synthetic {
        rebalance: f64,
        profit_sharing: f64,
    },
    AthOnly {
        rebalance: f64,
        profit_sharing: f64,
    },
    /// Bracket count chosen per ticker from its asset class.
    Auto,
    Rebalance(RebalanceFrequency),
}

//Rates accept "9.05%", "0.0905", and the legacy bare-percent spelling "50"
fn parse_rate(text: &str) -> Result<f64> {
    let text = text.trim();
    let value = if let Some(stripped) = text.strip_suffix('%') {
        stripped
            .trim()
            .parse::<f64>()
            .with_context(|| format!("bad rate '{}'", text))?
            / 100.0
    } else {
        let raw: f64 = text
            .parse()
            .with_context(|| format!("bad rate '{}'", text))?;
        if raw > 1.0 {
            raw / 100.0
        } else {
            raw
        }
    };
    if !(0.0..=1.0).contains(&value) {
        bail!("rate '{}' out of range", text);
    }
    Ok(value)
}

fn split_params(text: &str) -> (&str, Option<&str>) {
    match text.split_once([',', '/']) {
        Some((head, tail)) => (head, Some(tail)),
        None => (text, None),
    }
}

pub fn parse(text: &str) -> Result<AlgoSpec> {
    let text = text.trim().to_lowercase();
    let text = text.strip_prefix("per-asset:").unwrap_or(&text);

    match text {
        "buy-and-hold" | "buy_and_hold" => return Ok(AlgoSpec::BuyAndHold),
        "auto" => return Ok(AlgoSpec::Auto),
        "monthly-rebalance" => return Ok(AlgoSpec::Rebalance(RebalanceFrequency::Monthly)),
        "quarterly-rebalance" => return Ok(AlgoSpec::Rebalance(RebalanceFrequency::Quarterly)),
        "annual-rebalance" => return Ok(AlgoSpec::Rebalance(RebalanceFrequency::Annual)),
        _ => {}
    }

    //Custom month list, e.g. "quarterly-rebalance:1,7"
    if let Some(list) = text.strip_prefix("quarterly-rebalance:") {
        let months = list
            .split(',')
            .map(|month| month.trim().parse::<u8>())
            .collect::<Result<Vec<u8>, _>>()
            .with_context(|| format!("bad month list in '{}'", text))?;
        if months.is_empty() || months.iter().any(|month| !(1..=12).contains(month)) {
            bail!("months must be 1-12 in '{}'", text);
        }
        return Ok(AlgoSpec::Rebalance(RebalanceFrequency::Months(months)));
    }

    if let Some(rest) = text.strip_prefix("sd-ath-only-") {
        let (rate, sharing) = split_params(rest);
        return Ok(AlgoSpec::AthOnly {
            rebalance: parse_rate(rate)?,
            profit_sharing: sharing.map(parse_rate).transpose()?.unwrap_or(DEFAULT_PROFIT_SHARING),
        });
    }
    if let Some(rest) = text.strip_prefix("sd-") {
        let (rate, sharing) = split_params(rest);
        return Ok(AlgoSpec::Synthetic {
            rebalance: parse_rate(rate)?,
            profit_sharing: sharing.map(parse_rate).transpose()?.unwrap_or(DEFAULT_PROFIT_SHARING),
        });
    }
    if let Some(rest) = text.strip_prefix("sd") {
        let (count, sharing) = split_params(rest);
        let count: u32 = count
            .parse()
            .map_err(|_| anyhow!("unknown algorithm '{}'", text))?;
        if count == 0 {
            bail!("bracket count must be positive in '{}'", text);
        }
        let spec = BracketSpec::from_bracket_count(count, 0.0);
        return Ok(AlgoSpec::Synthetic {
            rebalance: spec.rebalance,
            profit_sharing: sharing.map(parse_rate).transpose()?.unwrap_or(DEFAULT_PROFIT_SHARING),
        });
    }

    bail!("unknown algorithm '{}'", text)
}

//Asset-class buckets for `auto`: the more volatile the class, the wider the
//brackets (fewer per doubling)
fn auto_bracket_count(ticker: &str) -> u32 {
    let upper = ticker.to_uppercase();
    let crypto = ["BTC", "ETH", "SOL", "BTC-USD", "ETH-USD", "SOL-USD"];
    let high_growth = ["TSLA", "NVDA", "ARKK", "TQQQ", "SOXL", "COIN", "MSTR"];
    let broad_index = ["SPY", "VOO", "IVV", "VTI", "QQQ", "DIA", "IWM", "VT"];
    let bond_cash = ["BND", "AGG", "TLT", "SHY", "BIL", "SGOV", "VGSH"];

    if crypto.contains(&upper.as_str()) || upper.ends_with("-USD") {
        4
    } else if high_growth.contains(&upper.as_str()) {
        6
    } else if broad_index.contains(&upper.as_str()) {
        8
    } else if bond_cash.contains(&upper.as_str()) {
        10
    } else {
        8
    }
}

fn build_asset_algo(spec: &AlgoSpec, ticker: &str, budget: f64) -> Box<dyn TradingAlgorithm> {
    match spec {
        AlgoSpec::BuyAndHold => Box::new(BuyAndHold::new(budget)),
        AlgoSpec::Synthetic {
            rebalance,
            profit_sharing,
        } => Box::new(SyntheticDividend::new(
            BracketSpec::new(*rebalance, *profit_sharing),
            budget,
        )),
        AlgoSpec::AthOnly {
            rebalance,
            profit_sharing,
        } => Box::new(AthOnly::new(
            BracketSpec::new(*rebalance, *profit_sharing),
            budget,
        )),
        AlgoSpec::Auto => Box::new(SyntheticDividend::new(
            BracketSpec::from_bracket_count(auto_bracket_count(ticker), DEFAULT_PROFIT_SHARING),
            budget,
        )),
        //Handled at the portfolio level
        AlgoSpec::Rebalance(_) => unreachable!("rebalance is not a per-asset algorithm"),
    }
}

/// Builds the portfolio algorithm for `allocations` (ticker, weight) pairs.
/// The CASH pseudo-ticker gets no algorithm; its allocation stays in the bank.
pub fn build_portfolio(
    text: &str,
    allocations: &[(String, f64)],
    initial_cash: f64,
) -> Result<Box<dyn PortfolioAlgorithm>> {
    let spec = parse(text)?;

    if let AlgoSpec::Rebalance(freq) = spec {
        let schedule = match freq {
            RebalanceFrequency::Monthly => MonthListSchedule::monthly(),
            RebalanceFrequency::Quarterly => MonthListSchedule::quarterly(),
            RebalanceFrequency::Annual => MonthListSchedule::annual(),
            RebalanceFrequency::Months(months) => MonthListSchedule::new(months),
        };
        let weights: Vec<(String, f64)> = allocations
            .iter()
            .filter(|(ticker, _)| ticker != CASH)
            .cloned()
            .collect();
        return Ok(Box::new(CalendarRebalance::new(weights, schedule)));
    }

    let mut adapter = PerAssetAdapter::new();
    for (ticker, weight) in allocations {
        if ticker == CASH {
            continue;
        }
        adapter.add_algo(
            ticker.clone(),
            build_asset_algo(&spec, ticker, initial_cash * weight),
        );
    }
    Ok(Box::new(adapter))
}
