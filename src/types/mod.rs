use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const DATE_FORMAT: &[FormatItem] = format_description!("[year]-[month]-[day]");

pub fn format_date(date: i64) -> String {
    if let Ok(time) = OffsetDateTime::from_unix_timestamp(date) {
        if let Ok(formatted) = time.date().format(&DATE_FORMAT) {
            return formatted;
        }
    }
    date.to_string()
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    Dividend,
    Interest,
    Withdrawal,
    SkipBuy,
    SkipSell,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Dividend => "DIVIDEND",
            Action::Interest => "INTEREST",
            Action::Withdrawal => "WITHDRAWAL",
            Action::SkipBuy => "SKIP BUY",
            Action::SkipSell => "SKIP SELL",
        };
        write!(f, "{}", s)
    }
}

/// A single row of the ledger. Created exclusively by `SimulationState` when it
/// accepts or rejects a proposal; never mutated or removed afterwards.
///
/// `holdings` and `bank` are the post-transaction values. Stamping them onto
/// the row keeps rendering independent of any later state.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transaction {
    pub action: Action,
    pub quantity: f64,
    pub price: f64,
    pub date: i64,
    pub ticker: String,
    pub note: String,
    pub holdings: f64,
    pub bank: f64,
}

impl Transaction {
    pub fn value(&self) -> f64 {
        self.quantity * self.price
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {} {:.2} {} @ {:.2} = {:.2}, holdings = {:.2}, bank = {:.2}",
            format_date(self.date),
            self.action,
            self.quantity,
            self.ticker,
            self.price,
            self.value(),
            self.holdings,
            self.bank,
        )?;
        if !self.note.is_empty() {
            write!(f, "  # {}", self.note)?;
        }
        Ok(())
    }
}

/// Read-only snapshot of a single asset handed to algorithms each day.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AssetState {
    pub ticker: String,
    pub holdings: f64,
    pub price: f64,
}

impl AssetState {
    pub fn value(&self) -> f64 {
        self.holdings * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, Transaction};

    #[test]
    fn test_that_ledger_row_renders_with_date_and_note() {
        // Date 30/09/21 - 17:00:0000
        let tx = Transaction {
            action: Action::Buy,
            quantity: 45.0,
            price: 91.7,
            date: 1633021200,
            ticker: "ABC".to_string(),
            note: "bracket buy".to_string(),
            holdings: 1045.0,
            bank: 5873.5,
        };

        let rendered = format!("{}", tx);
        assert_eq!(
            rendered,
            "2021-09-30 BUY 45.00 ABC @ 91.70 = 4126.50, holdings = 1045.00, bank = 5873.50  # bracket buy"
        );
    }

    #[test]
    fn test_that_skip_actions_render_with_space() {
        let tx = Transaction {
            action: Action::SkipBuy,
            quantity: 10.0,
            price: 100.0,
            date: 1633021200,
            ticker: "ABC".to_string(),
            note: String::new(),
            holdings: 0.0,
            bank: 500.0,
        };
        assert!(format!("{}", tx).contains("SKIP BUY"));
    }
}
