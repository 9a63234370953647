use time::OffsetDateTime;

pub trait TradingSchedule {
    fn should_trade(&self, date: &i64) -> bool;
}

pub struct DefaultTradingSchedule;

impl TradingSchedule for DefaultTradingSchedule {
    fn should_trade(&self, _date: &i64) -> bool {
        true
    }
}

/// Trades only in the designated calendar months. Used by the calendar
/// rebalance algorithm, which layers its own day-count throttle on top so a
/// month with many trading days still rebalances once.
pub struct MonthListSchedule {
    months: Vec<u8>,
}

impl MonthListSchedule {
    pub fn new(months: Vec<u8>) -> Self {
        Self { months }
    }

    pub fn quarterly() -> Self {
        Self::new(vec![1, 4, 7, 10])
    }

    pub fn monthly() -> Self {
        Self::new((1..=12).collect())
    }

    pub fn annual() -> Self {
        Self::new(vec![1])
    }
}

impl TradingSchedule for MonthListSchedule {
    fn should_trade(&self, date: &i64) -> bool {
        match OffsetDateTime::from_unix_timestamp(*date) {
            Ok(t) => self.months.contains(&(t.month() as u8)),
            _ => false,
        }
    }
}
