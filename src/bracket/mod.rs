use serde::{Deserialize, Serialize};

/// Parameters of the bracket ladder: `rebalance` is the fractional price move
/// that arms the next buy/sell trigger, `profit_sharing` the fraction of the
/// theoretical share delta that is actually traded.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct BracketSpec {
    pub rebalance: f64,
    pub profit_sharing: f64,
}

impl BracketSpec {
    pub fn new(rebalance: f64, profit_sharing: f64) -> Self {
        Self {
            rebalance,
            profit_sharing,
        }
    }

    /// Trigger width from a bracket count: trigger = 2^(1/n) - 1, so n
    /// brackets span a doubling of the price.
    pub fn from_bracket_count(n: u32, profit_sharing: f64) -> Self {
        let rebalance = 2_f64.powf(1.0 / f64::from(n)) - 1.0;
        Self {
            rebalance,
            profit_sharing,
        }
    }

    pub fn next_buy_price(&self, last_price: f64) -> f64 {
        last_price / (1.0 + self.rebalance)
    }

    pub fn next_sell_price(&self, last_price: f64) -> f64 {
        last_price * (1.0 + self.rebalance)
    }

    //Round half up. Quantities can legitimately come out at zero, for example
    //with 0% profit sharing, callers treat zero as no-op rather than an error.
    pub fn next_buy_qty(&self, holdings: f64) -> f64 {
        (self.rebalance * holdings * self.profit_sharing).round()
    }

    pub fn next_sell_qty(&self, holdings: f64) -> f64 {
        (self.rebalance * holdings * self.profit_sharing / (1.0 + self.rebalance)).round()
    }

    pub fn pending_pair(&self, holdings: f64, anchor: f64) -> PendingOrderPair {
        PendingOrderPair {
            buy_price: self.next_buy_price(anchor),
            buy_qty: self.next_buy_qty(holdings),
            sell_price: self.next_sell_price(anchor),
            sell_qty: self.next_sell_qty(holdings),
        }
    }

    /// Normalizes `price` to the nearest rung of the ladder of powers of
    /// (1+r) anchored at `reference`. Independent backtests with the same
    /// trigger width then land on identical bracket boundaries regardless of
    /// their starting price.
    pub fn align_to_ladder(&self, price: f64, reference: f64) -> f64 {
        if price <= 0.0 || reference <= 0.0 {
            return price;
        }
        let width = (1.0 + self.rebalance).ln();
        let steps = ((price / reference).ln() / width).round();
        reference * (1.0 + self.rebalance).powf(steps)
    }
}

/// The currently armed next-buy and next-sell orders. Recomputed after every
/// fill, anchored at the bracket price that triggered the fill.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PendingOrderPair {
    pub buy_price: f64,
    pub buy_qty: f64,
    pub sell_price: f64,
    pub sell_qty: f64,
}

/// Documented rounding tolerance for buy/sell quantity symmetry. The source
/// tolerates up to 3 shares or 6% of the quantity, whichever is greater;
/// tightening this would change observable behaviour for small holdings.
pub fn symmetry_tolerance(qty: f64) -> f64 {
    3_f64.max(qty * 0.06)
}
