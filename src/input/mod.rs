use std::collections::{BTreeMap, HashMap, HashSet};

use rand::thread_rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// One day of trading for a single ticker.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub date: i64,
    pub ticker: String,
}

impl Bar {
    /// Bad rows are treated as "no action possible that day", never as a fatal
    /// error, so one malformed day cannot abort a multi-year run.
    pub fn is_valid(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.high >= self.low
            && self.low > 0.0
    }
}

pub type DateBars = HashMap<String, Bar>;

// Market produces data for the simulation to consume. It is built up-front by
// the data-provider collaborator; the engine never performs I/O against it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Market {
    dates: Vec<i64>,
    inner: HashMap<i64, DateBars>,
    //Sparse payment date -> per-share amount series per ticker
    dividends: HashMap<String, BTreeMap<i64, f64>>,
}

impl Market {
    pub fn get_bars(&self, date: &i64) -> Option<&DateBars> {
        self.inner.get(date)
    }

    pub fn get_bar(&self, date: &i64, ticker: &str) -> Option<&Bar> {
        self.inner.get(date)?.get(ticker)
    }

    /// Trading calendar for the whole run, sorted ascending.
    pub fn dates(&self) -> &[i64] {
        &self.dates
    }

    pub fn first_date(&self) -> Option<i64> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<i64> {
        self.dates.last().copied()
    }

    pub fn has_ticker(&self, ticker: &str) -> bool {
        self.inner
            .values()
            .any(|date_row| date_row.contains_key(ticker))
    }

    pub fn dividends_due(&self, date: &i64, ticker: &str) -> Option<f64> {
        self.dividends.get(ticker)?.get(date).copied()
    }

    /// Close-to-close return for a ticker between the previous trading day and
    /// `date`. Used for benchmark/risk-free daily accrual rates.
    pub fn daily_return(&self, date: &i64, ticker: &str) -> Option<f64> {
        let pos = self.dates.binary_search(date).ok()?;
        if pos == 0 {
            return None;
        }
        let prev = &self.dates[pos - 1];
        let prev_close = self.get_bar(prev, ticker)?.close;
        let close = self.get_bar(date, ticker)?.close;
        if prev_close <= 0.0 {
            return None;
        }
        Some((close / prev_close) - 1.0)
    }

    /// Buy-and-hold return over the full run, first close to last close.
    pub fn whole_period_return(&self, ticker: &str) -> Option<f64> {
        let first = self
            .dates
            .iter()
            .find_map(|date| self.get_bar(date, ticker))?;
        let last = self
            .dates
            .iter()
            .rev()
            .find_map(|date| self.get_bar(date, ticker))?;
        if first.close <= 0.0 {
            return None;
        }
        Some((last.close / first.close) - 1.0)
    }

    /// Loads a market from a JSON array of bar rows, the export format of
    /// the data-provider collaborator.
    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let bars: Vec<Bar> = serde_json::from_str(data)?;
        let mut builder = MarketBuilder::new();
        for bar in bars {
            builder.add_bar(bar.open, bar.high, bar.low, bar.close, bar.date, bar.ticker);
        }
        Ok(builder.build())
    }

    /// Geometric random-walk market for benches and statistical tests.
    pub fn random(days: i64, tickers: Vec<&str>) -> Self {
        let start_dist = Uniform::new(50.0, 150.0);
        let ret_dist = Normal::new(0.0002, 0.015).unwrap();
        let range_dist = Uniform::new(0.0, 0.02);
        let mut rng = thread_rng();

        let mut builder = MarketBuilder::new();
        for ticker in &tickers {
            let mut close: f64 = start_dist.sample(&mut rng);
            for day in 0..days {
                let date = 1609459200 + day * 86400;
                let open = close;
                close = open * (1.0 + ret_dist.sample(&mut rng));
                let spread = range_dist.sample(&mut rng);
                let high = open.max(close) * (1.0 + spread);
                let low = open.min(close) * (1.0 - spread);
                builder.add_bar(open, high, low, close, date, *ticker);
            }
        }
        builder.build()
    }
}

pub struct MarketBuilder {
    inner: HashMap<i64, DateBars>,
    dates: HashSet<i64>,
    dividends: HashMap<String, BTreeMap<i64, f64>>,
}

impl MarketBuilder {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
            dates: HashSet::new(),
            dividends: HashMap::new(),
        }
    }

    pub fn add_bar(
        &mut self,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        date: i64,
        ticker: impl Into<String>,
    ) -> &mut Self {
        let bar = Bar {
            open,
            high,
            low,
            close,
            date,
            ticker: ticker.into(),
        };

        if let Some(date_row) = self.inner.get_mut(&date) {
            date_row.insert(bar.ticker.clone(), bar);
        } else {
            let mut date_row = HashMap::new();
            date_row.insert(bar.ticker.clone(), bar);
            self.inner.insert(date, date_row);
        }
        self.dates.insert(date);
        self
    }

    /// Flat close used across O/H/L/C, convenient for deterministic tests.
    pub fn add_flat_bar(&mut self, price: f64, date: i64, ticker: impl Into<String>) -> &mut Self {
        self.add_bar(price, price, price, price, date, ticker)
    }

    pub fn add_dividend(
        &mut self,
        per_share: f64,
        date: i64,
        ticker: impl Into<String>,
    ) -> &mut Self {
        self.dividends
            .entry(ticker.into())
            .or_default()
            .insert(date, per_share);
        self
    }

    pub fn build(&mut self) -> Market {
        let mut dates = Vec::from_iter(self.dates.clone());
        dates.sort();
        Market {
            dates,
            inner: std::mem::take(&mut self.inner),
            dividends: std::mem::take(&mut self.dividends),
        }
    }
}

impl Default for MarketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Market, MarketBuilder};

    #[test]
    fn test_that_dates_are_sorted_regardless_of_insertion_order() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(101.0, 186400, "ABC");
        builder.add_flat_bar(100.0, 100000, "ABC");
        builder.add_flat_bar(102.0, 272800, "ABC");
        let market = builder.build();

        assert_eq!(market.dates(), &[100000, 186400, 272800]);
        assert_eq!(market.first_date().unwrap(), 100000);
        assert_eq!(market.last_date().unwrap(), 272800);
    }

    #[test]
    fn test_that_daily_return_uses_previous_close() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(100.0, 100000, "ABC");
        builder.add_flat_bar(110.0, 186400, "ABC");
        let market = builder.build();

        assert!(market.daily_return(&100000, "ABC").is_none());
        let ret = market.daily_return(&186400, "ABC").unwrap();
        assert!((ret - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_that_dividends_are_sparse() {
        let mut builder = MarketBuilder::new();
        builder.add_flat_bar(100.0, 100000, "ABC");
        builder.add_dividend(0.5, 100000, "ABC");
        let market = builder.build();

        assert_eq!(market.dividends_due(&100000, "ABC").unwrap(), 0.5);
        assert!(market.dividends_due(&186400, "ABC").is_none());
        assert!(market.dividends_due(&100000, "XYZ").is_none());
    }

    #[test]
    fn test_that_bad_bar_is_flagged_invalid() {
        let mut builder = MarketBuilder::new();
        builder.add_bar(100.0, 90.0, 95.0, 100.0, 100000, "ABC");
        let market = builder.build();
        assert!(!market.get_bar(&100000, "ABC").unwrap().is_valid());
    }

    #[test]
    fn test_that_market_loads_from_json_rows() {
        let data = r#"[
            {"open": 100.0, "high": 101.0, "low": 99.0, "close": 100.5, "date": 100000, "ticker": "ABC"},
            {"open": 100.5, "high": 102.0, "low": 100.0, "close": 101.5, "date": 186400, "ticker": "ABC"}
        ]"#;
        let market = Market::from_json(data).unwrap();
        assert_eq!(market.dates().len(), 2);
        assert_eq!(market.get_bar(&100000, "ABC").unwrap().close, 100.5);

        assert!(Market::from_json("not json").is_err());
    }

    #[test]
    fn test_that_random_market_produces_valid_bars() {
        let market = Market::random(100, vec!["ABC", "BCD"]);
        assert_eq!(market.dates().len(), 100);
        for date in market.dates() {
            for bar in market.get_bars(date).unwrap().values() {
                assert!(bar.is_valid());
            }
        }
    }
}
