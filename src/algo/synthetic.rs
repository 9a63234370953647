use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::algo::{AlgoIncome, ProposedOrder, Side, TradingAlgorithm};
use crate::bracket::{BracketSpec, PendingOrderPair};
use crate::input::Bar;
use crate::types::AssetState;

//Bounds the per-day fill loop against pathological inputs, a day can never
//produce more fills than this.
const MAX_FILLS_PER_DAY: usize = 20;

/// One buyback purchase awaiting unwind. Lots are consumed oldest-first,
/// partially when a sell is smaller than the front lot.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct BuybackLot {
    pub price: f64,
    pub qty: f64,
}

fn queued_total(queue: &VecDeque<BuybackLot>) -> f64 {
    queue.iter().map(|lot| lot.qty).sum()
}

//Consumes up to `qty` from the front of the queue, returns (consumed, profit
//against the fill price). Partial consumption updates the front lot in place.
fn unwind_queue(queue: &mut VecDeque<BuybackLot>, qty: f64, fill: f64) -> (f64, f64) {
    let mut remaining = qty;
    let mut consumed = 0.0;
    let mut profit = 0.0;
    while remaining > 0.0 {
        let Some(front) = queue.front_mut() else {
            break;
        };
        let take = front.qty.min(remaining);
        front.qty -= take;
        remaining -= take;
        consumed += take;
        profit += (fill - front.price) * take;
        if front.qty <= 0.0 {
            queue.pop_front();
        }
    }
    (consumed, profit)
}

/// Full synthetic-dividend algorithm: sells a profit-sharing slice at every
/// new high, buys the dips back bracket-by-bracket and unwinds those buybacks
/// FIFO as price recovers.
///
/// The running all-time-high is tracked alongside the bracket ladder. Sells
/// below the ATH only ever unwind the buyback queue; a sell that establishes
/// a new high flushes whatever is left of the queue and takes the baseline
/// profit slice, so holdings converge exactly to what the ATH-only variant
/// holds whenever price clears every previous high.
pub struct SyntheticDividend {
    spec: BracketSpec,
    budget: f64,
    ladder_reference: Option<f64>,
    initialized: bool,
    entry_price: f64,
    //Anchor of the bracket ladder, moved to the trigger price on every fill
    anchor: f64,
    pending: PendingOrderPair,
    queue: VecDeque<BuybackLot>,
    //Baseline state mirroring what an ATH-only run would hold
    ath: f64,
    ath_anchor: f64,
    income: AlgoIncome,
}

impl SyntheticDividend {
    pub fn new(spec: BracketSpec, budget: f64) -> Self {
        Self {
            spec,
            budget,
            ladder_reference: None,
            initialized: false,
            entry_price: 0.0,
            anchor: 0.0,
            pending: spec.pending_pair(0.0, 0.0),
            queue: VecDeque::new(),
            ath: 0.0,
            ath_anchor: 0.0,
            income: AlgoIncome::default(),
        }
    }

    /// Anchor the ladder to the shared grid of powers of (1+r) from
    /// `reference`, so independent runs land on identical bracket boundaries.
    pub fn with_ladder_reference(mut self, reference: f64) -> Self {
        self.ladder_reference = Some(reference);
        self
    }

    pub fn queued_qty(&self) -> f64 {
        queued_total(&self.queue)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn unrealized_alpha(&self) -> f64 {
        self.income.fill_alpha
    }

    pub fn pending(&self) -> PendingOrderPair {
        self.pending
    }

    fn enter(&mut self, bar: &Bar, available: f64) -> Option<ProposedOrder> {
        self.initialized = true;
        self.entry_price = bar.open;
        self.ath = bar.open;
        self.anchor = match self.ladder_reference {
            Some(reference) => self.spec.align_to_ladder(bar.open, reference),
            None => bar.open,
        };
        self.ath_anchor = self.anchor;
        let qty = (self.budget.min(available) / bar.open).floor();
        self.pending = self.spec.pending_pair(qty, self.anchor);
        if qty <= 0.0 {
            return None;
        }
        Some(ProposedOrder::buy(qty, bar.open, "initial position"))
    }
}

impl TradingAlgorithm for SyntheticDividend {
    fn evaluate(&mut self, bar: &Bar, asset: &AssetState, bank: f64) -> Vec<ProposedOrder> {
        if !bar.is_valid() {
            return Vec::new();
        }

        let mut orders = Vec::new();
        let mut holdings = asset.holdings;
        //Cash still uncommitted today. Buys the bank cannot fund are withheld
        //rather than proposed: execution would skip them and the queue would
        //hold lots that were never bought.
        let mut available = bank;
        //Intraday ordering of High and Low is unknowable from a daily bar so
        //the first fill locks the day's direction, a gap across K brackets
        //produces exactly K fills and never a same-day round trip.
        let mut direction: Option<Side> = None;

        if !self.initialized {
            match self.enter(bar, available) {
                Some(order) => {
                    holdings += order.qty;
                    available -= order.qty * order.price;
                    self.pending = self.spec.pending_pair(holdings, self.anchor);
                    direction = Some(Side::Buy);
                    orders.push(order);
                }
                //Budget too small for a single share, nothing to trade
                None => return orders,
            }
        }

        for _ in 0..MAX_FILLS_PER_DAY {
            let pending = self.pending;

            //Buyback: price reached down to the next buy bracket and the
            //bank can fund it
            if direction != Some(Side::Sell)
                && bar.low <= pending.buy_price
                && pending.buy_qty > 0.0
                && pending.buy_qty * pending.buy_price.min(bar.open) <= available
            {
                let fill = pending.buy_price.min(bar.open);
                let value = holdings * fill;
                if value > 0.0 {
                    self.income.fill_alpha += (self.anchor - fill) * pending.buy_qty / value;
                }
                self.queue.push_back(BuybackLot {
                    price: fill,
                    qty: pending.buy_qty,
                });
                holdings += pending.buy_qty;
                available -= pending.buy_qty * fill;
                self.anchor = pending.buy_price;
                self.pending = self.spec.pending_pair(holdings, self.anchor);
                direction = Some(Side::Buy);
                orders.push(ProposedOrder::buy(
                    pending.buy_qty,
                    fill,
                    format!("buyback at bracket {:.2}", pending.buy_price),
                ));
                continue;
            }

            if direction != Some(Side::Buy) {
                let queued = queued_total(&self.queue);

                //Unwind: recovery below the all-time-high only ever sells
                //queued buybacks, oldest first
                if bar.high >= pending.sell_price && pending.sell_qty > 0.0 && queued > 0.0 {
                    let fill = pending.sell_price.max(bar.open);
                    if fill <= self.ath {
                        let (consumed, profit) =
                            unwind_queue(&mut self.queue, pending.sell_qty.min(queued), fill);
                        if consumed > 0.0 {
                            self.income.secondary += profit;
                            holdings -= consumed;
                            available += consumed * fill;
                            self.anchor = pending.sell_price;
                            self.pending = self.spec.pending_pair(holdings, self.anchor);
                            direction = Some(Side::Sell);
                            orders.push(ProposedOrder::sell(
                                consumed,
                                fill,
                                format!("unwound {:.0} from stack", consumed),
                            ));
                            continue;
                        }
                    }
                }

                //New high: flush the queue remainder and take the baseline
                //profit slice, sized off what the ATH-only variant would hold
                let ath_sell = self.spec.next_sell_price(self.ath_anchor);
                if bar.high > self.ath && bar.high >= ath_sell {
                    let fill = ath_sell.max(bar.open);
                    let core_qty = self.spec.next_sell_qty(holdings - queued);
                    let (consumed, profit) = unwind_queue(&mut self.queue, queued, fill);
                    let total = consumed + core_qty;
                    if total > 0.0 {
                        self.income.secondary += profit;
                        self.income.primary += (fill - self.entry_price) * core_qty;
                        holdings -= total;
                        available += total * fill;
                        self.ath = fill;
                        self.ath_anchor = ath_sell;
                        self.anchor = ath_sell;
                        self.pending = self.spec.pending_pair(holdings, self.anchor);
                        direction = Some(Side::Sell);
                        orders.push(ProposedOrder::sell(
                            total,
                            fill,
                            format!("new high, unwound {:.0} from stack", consumed),
                        ));
                        continue;
                    }
                }
            }

            break;
        }
        orders
    }

    fn income(&self) -> AlgoIncome {
        self.income
    }
}

/// Baseline variant: sells the profit-sharing slice at every new high and
/// never buys back. The extra return the full algorithm generates over this
/// one on the same price path is the volatility alpha.
pub struct AthOnly {
    spec: BracketSpec,
    budget: f64,
    initialized: bool,
    entry_price: f64,
    anchor: f64,
    ath: f64,
    income: AlgoIncome,
}

impl AthOnly {
    pub fn new(spec: BracketSpec, budget: f64) -> Self {
        Self {
            spec,
            budget,
            initialized: false,
            entry_price: 0.0,
            anchor: 0.0,
            ath: 0.0,
            income: AlgoIncome::default(),
        }
    }
}

impl TradingAlgorithm for AthOnly {
    fn evaluate(&mut self, bar: &Bar, asset: &AssetState, bank: f64) -> Vec<ProposedOrder> {
        if !bar.is_valid() {
            return Vec::new();
        }

        let mut orders = Vec::new();
        let mut holdings = asset.holdings;

        if !self.initialized {
            self.initialized = true;
            self.entry_price = bar.open;
            self.anchor = bar.open;
            self.ath = bar.open;
            let qty = (self.budget.min(bank) / bar.open).floor();
            if qty > 0.0 {
                holdings += qty;
                orders.push(ProposedOrder::buy(qty, bar.open, "initial position"));
            }
        }

        for _ in 0..MAX_FILLS_PER_DAY {
            let sell_price = self.spec.next_sell_price(self.anchor);
            let qty = self.spec.next_sell_qty(holdings);
            if bar.high > self.ath && bar.high >= sell_price && qty > 0.0 {
                let fill = sell_price.max(bar.open);
                self.income.primary += (fill - self.entry_price) * qty;
                holdings -= qty;
                self.ath = fill;
                self.anchor = sell_price;
                orders.push(ProposedOrder::sell(qty, fill, "new high"));
            } else {
                break;
            }
        }
        orders
    }

    fn income(&self) -> AlgoIncome {
        self.income
    }
}
