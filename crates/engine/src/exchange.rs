//! The exchange: the single ingress point for orders.
//!
//! Owns the lit and dark pools, the consolidated tape, per-agent fee and
//! registration records, the monotonic order-id counter, and the trigger
//! bookkeeping for composite (one-sends/one-cancels) orders.

use crate::book_side::{BookResponse, OrderBookSide};
use crate::config::ExchangeConfig;
use crate::error::EngineError;
use crate::pool::Pool;
use agora_core::tape::summarize;
use agora_core::{
    AgentId, ExchangeMsg, LadderView, Order, OrderEvent, OrderId, OrderStyle, OxoPair, PoolId,
    PublishedBook, Quantity, SimTime, TapeEvent, TradeSummary,
};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};

/// The exchange's records for one agent.
#[derive(Debug, Clone)]
pub struct TraderRecord {
    /// Time of first contact.
    pub registered: SimTime,
    /// Balance at the exchange (fee debits accumulate here).
    pub balance: i64,
    /// Every message sent to this agent, in order.
    pub blotter: Vec<ExchangeMsg>,
}

impl TraderRecord {
    fn new(registered: SimTime) -> Self {
        TraderRecord { registered, balance: 0, blotter: Vec::new() }
    }
}

/// What one call to `process_order` produced.
#[derive(Debug)]
pub struct ProcessReport {
    /// Exchange id assigned to the incoming order, `None` for cancels.
    pub order_id: Option<OrderId>,
    /// All messages generated, for the submitter and for counterparties.
    pub messages: Vec<ExchangeMsg>,
    /// Volume-weighted aggregate of any trades, counterparties anonymized.
    pub summary: Option<TradeSummary>,
}

/// Pending trigger for a composite order.
#[derive(Debug)]
enum OxoWatch {
    /// One-sends-other: submit `next` once `trigger` fully fills.
    SendOnFill { trigger: OrderId, next: Order },
    /// One-cancels-other: withdraw `other` once `trigger` fills or is
    /// cancelled.
    CancelOnResolve { trigger: OrderId, other: OrderId },
}

enum WatchAction {
    Submit(Order),
    Withdraw(OrderId),
}

/// What to do with the tape after dumping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeDumpMode {
    Keep,
    Wipe,
}

pub struct Exchange {
    config: ExchangeConfig,
    lit: Pool,
    dark: Pool,
    tape: Vec<TapeEvent>,
    traders: HashMap<AgentId, TraderRecord>,
    next_order_id: u64,
    watches: Vec<OxoWatch>,
}

impl Exchange {
    pub fn new(config: ExchangeConfig) -> Self {
        let lit = Pool::new(PoolId::Lit, &config);
        let dark = Pool::new(PoolId::Dark, &config);
        Exchange {
            config,
            lit,
            dark,
            tape: Vec::new(),
            traders: HashMap::new(),
            next_order_id: 1,
            watches: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn lit(&self) -> &Pool {
        &self.lit
    }

    pub fn dark(&self) -> &Pool {
        &self.dark
    }

    pub fn tape(&self) -> &[TapeEvent] {
        &self.tape
    }

    pub fn trader(&self, agent: &AgentId) -> Option<&TraderRecord> {
        self.traders.get(agent)
    }

    pub fn traders(&self) -> impl Iterator<Item = (&AgentId, &TraderRecord)> {
        self.traders.iter()
    }

    /// How many order ids have been issued so far.
    pub fn orders_issued(&self) -> u64 {
        self.next_order_id - 1
    }

    fn pool_mut(&mut self, id: PoolId) -> &mut Pool {
        match id {
            PoolId::Lit => &mut self.lit,
            PoolId::Dark => &mut self.dark,
        }
    }

    /// Block-size orders route to the dark pool, the rest to the lit pool.
    fn route(&self, qty: Quantity) -> PoolId {
        if qty >= self.config.block_trade_threshold { PoolId::Dark } else { PoolId::Lit }
    }

    fn assign_id(&mut self, order: &mut Order) -> OrderId {
        if let Some(id) = order.id {
            return id;
        }
        let id = OrderId::new(self.next_order_id);
        self.next_order_id += 1;
        order.id = Some(id);
        id
    }

    fn register(&mut self, time: SimTime, agent: &AgentId) {
        if !self.traders.contains_key(agent) {
            tracing::debug!(agent = %agent, time = %time, "registering agent");
            self.traders.insert(agent.clone(), TraderRecord::new(time));
        }
    }

    /// Process one incoming order to completion: route it, run any
    /// composite triggers and all-or-none retries it sets off, write the
    /// tape, apply fees, and report back.
    pub fn process_order(
        &mut self,
        time: SimTime,
        order: Order,
    ) -> Result<ProcessReport, EngineError> {
        self.register(time, &order.agent);
        tracing::debug!(order = %order, "processing order");

        let mut entry_id = None;
        let resp = self.settle(time, VecDeque::from([order]), BookResponse::default(), &mut entry_id)?;
        Ok(self.finalize(time, entry_id, resp))
    }

    /// Open for business: run deferred on-open orders in both pools.
    pub fn open(&mut self, time: SimTime) -> Result<ProcessReport, EngineError> {
        tracing::info!(time = %time, "exchange opening");
        let fee = self.config.processing_fee;
        let mut seed = self.lit.open(time, fee)?;
        seed.extend(self.dark.open(time, fee)?);
        let resp = self.settle(time, VecDeque::new(), seed, &mut None)?;
        Ok(self.finalize(time, None, resp))
    }

    /// Close for business: run deferred on-close orders, then expire
    /// good-for-day orders, in both pools.
    pub fn close(&mut self, time: SimTime) -> Result<ProcessReport, EngineError> {
        tracing::info!(time = %time, "exchange closing");
        let fee = self.config.processing_fee;
        let mut seed = self.lit.close(time, fee)?;
        seed.extend(self.dark.close(time, fee)?);
        let resp = self.settle(time, VecDeque::new(), seed, &mut None)?;
        Ok(self.finalize(time, None, resp))
    }

    /// Cancel by bare id (the harness kill path). The same protocol rules
    /// as a CAN order apply: an id that is live nowhere is misuse.
    pub fn cancel(&mut self, time: SimTime, id: OrderId) -> Result<ProcessReport, EngineError> {
        let mut seed = self.cancel_anywhere(time, id)?;
        seed.extend(self.sweep_all(time));
        let resp = self.settle(time, VecDeque::new(), seed, &mut None)?;
        Ok(self.finalize(time, None, resp))
    }

    /// Drive pending orders and composite triggers to quiescence.
    ///
    /// Composites are expanded here because their sub-orders need exchange
    /// ids. Every message produced is scanned against the registered
    /// watches; a fired watch may queue another order or withdraw one,
    /// which in turn produces messages to scan, so the loop runs until
    /// nothing new appears.
    fn settle(
        &mut self,
        time: SimTime,
        mut pending: VecDeque<Order>,
        mut out: BookResponse,
        entry_id: &mut Option<OrderId>,
    ) -> Result<BookResponse, EngineError> {
        let fee = self.config.processing_fee;
        let mut scanned = 0usize;

        loop {
            while let Some(mut order) = pending.pop_front() {
                match order.style.clone() {
                    OrderStyle::OneCancelsOther(pair) => {
                        let id = self.assign_id(&mut order);
                        entry_id.get_or_insert(id);
                        let OxoPair { first: mut a, second: mut b } = *pair;
                        let trigger = self.assign_id(&mut a);
                        let other = self.assign_id(&mut b);
                        self.watches.push(OxoWatch::CancelOnResolve { trigger, other });
                        pending.push_front(b);
                        pending.push_front(a);
                    }
                    OrderStyle::OneSendsOther(pair) => {
                        let id = self.assign_id(&mut order);
                        entry_id.get_or_insert(id);
                        let OxoPair { first: mut a, second: mut b } = *pair;
                        let trigger = self.assign_id(&mut a);
                        self.assign_id(&mut b);
                        self.watches.push(OxoWatch::SendOnFill { trigger, next: b });
                        pending.push_front(a);
                    }
                    OrderStyle::Iceberg { display } => {
                        let id = self.assign_id(&mut order);
                        entry_id.get_or_insert(id);
                        let chain = expand_iceberg(&order, display)?;
                        pending.push_front(chain);
                    }
                    OrderStyle::Cancel { target } => {
                        out.extend(self.cancel_anywhere(time, target)?);
                        out.extend(self.sweep_all(time));
                    }
                    OrderStyle::CancelAll => {
                        let agent = order.agent.clone();
                        let mut resp = self.lit.cancel_agent(time, &agent)?;
                        resp.extend(self.dark.cancel_agent(time, &agent)?);
                        out.extend(resp);
                        out.extend(self.sweep_all(time));
                    }
                    _ => {
                        let id = self.assign_id(&mut order);
                        entry_id.get_or_insert(id);
                        let pool = self.route(order.qty);
                        out.extend(self.pool_mut(pool).submit(time, order, fee)?);
                        out.extend(self.sweep_all(time));
                    }
                }
            }

            if scanned >= out.messages.len() && pending.is_empty() {
                break;
            }
            while scanned < out.messages.len() {
                let msg = out.messages[scanned].clone();
                scanned += 1;
                for action in self.fire_watches(&msg) {
                    match action {
                        WatchAction::Submit(next) => pending.push_back(next),
                        WatchAction::Withdraw(id) => out.extend(self.withdraw(time, id)?),
                    }
                }
            }
        }
        Ok(out)
    }

    /// Match one message against the composite-order watches.
    fn fire_watches(&mut self, msg: &ExchangeMsg) -> Vec<WatchAction> {
        let mut actions = Vec::new();
        let mut kept = Vec::new();
        for watch in self.watches.drain(..) {
            match watch {
                OxoWatch::SendOnFill { trigger, next } if trigger == msg.order_id => {
                    match msg.event {
                        OrderEvent::Fill { .. } => {
                            tracing::debug!(trigger = %trigger, "one-sends-other trigger filled");
                            actions.push(WatchAction::Submit(next));
                        }
                        // Still live as a maker: keep waiting.
                        OrderEvent::Ack | OrderEvent::Part { .. } => {
                            kept.push(OxoWatch::SendOnFill { trigger, next });
                        }
                        // Failed or cancelled: the second leg is never sent.
                        OrderEvent::Fail | OrderEvent::Cancelled => {}
                    }
                }
                OxoWatch::CancelOnResolve { trigger, other } if trigger == msg.order_id => {
                    match msg.event {
                        OrderEvent::Fill { .. } | OrderEvent::Cancelled => {
                            tracing::debug!(trigger = %trigger, other = %other, "one-cancels-other resolved");
                            actions.push(WatchAction::Withdraw(other));
                        }
                        OrderEvent::Ack | OrderEvent::Part { .. } => {
                            kept.push(OxoWatch::CancelOnResolve { trigger, other });
                        }
                        OrderEvent::Fail => {}
                    }
                }
                other => kept.push(other),
            }
        }
        self.watches = kept;
        actions
    }

    /// Best-effort internal withdrawal for a composite sibling. The order
    /// may already be gone (filled or cancelled); that is not an error.
    fn withdraw(&mut self, time: SimTime, id: OrderId) -> Result<BookResponse, EngineError> {
        if self.lit.contains(id) {
            return self.lit.cancel(time, id);
        }
        if self.dark.contains(id) {
            return self.dark.cancel(time, id);
        }
        Ok(BookResponse::default())
    }

    /// Client-requested cancellation. Unlike `withdraw`, an id that is live
    /// nowhere is protocol misuse.
    fn cancel_anywhere(&mut self, time: SimTime, id: OrderId) -> Result<BookResponse, EngineError> {
        if self.lit.contains(id) {
            return self.lit.cancel(time, id);
        }
        if self.dark.contains(id) {
            return self.dark.cancel(time, id);
        }
        Err(EngineError::UnknownOrder(id))
    }

    fn sweep_all(&mut self, time: SimTime) -> BookResponse {
        let fee = self.config.processing_fee;
        let mut resp = self.lit.sweep_resting(time, fee);
        resp.extend(self.dark.sweep_resting(time, fee));
        resp
    }

    /// Apply a settled response: blotters and balances, pool last-trade
    /// records, the tape, and the aggregate trade summary.
    fn finalize(&mut self, time: SimTime, entry_id: Option<OrderId>, resp: BookResponse) -> ProcessReport {
        for msg in &resp.messages {
            let record =
                self.traders.entry(msg.agent.clone()).or_insert_with(|| TraderRecord::new(time));
            record.balance += msg.balance_delta;
            record.blotter.push(msg.clone());
        }

        for event in &resp.tape {
            if let TapeEvent::Trade { pool, time, price, qty, .. } = event {
                tracing::debug!(pool = %pool, price = %price, qty = %qty, "trade");
                self.pool_mut(*pool).record_trade(*time, *price, *qty);
            }
        }

        let summary = summarize(time, &resp.tape);
        self.tape.extend(resp.tape);
        ProcessReport { order_id: entry_id, messages: resp.messages, summary }
    }

    /// The published snapshot: lit-pool depth only (dark depth is never
    /// published), last trade, a bounded tape tail, and the derived
    /// mid/micro prices.
    pub fn publish_lob(&self, time: SimTime, tape_tail: usize) -> PublishedBook {
        let bids = ladder(self.lit.bids());
        let asks = ladder(self.lit.asks());

        let (mid_price, micro_price) = match (
            self.lit.bids().anon_levels().first(),
            self.lit.asks().anon_levels().first(),
        ) {
            (Some(&(bid_p, bid_q)), Some(&(ask_p, ask_q))) => {
                let mid = (bid_p.to_f64() + ask_p.to_f64()) / 2.0;
                let total_q = (bid_q.units() + ask_q.units()) as f64;
                let micro = (bid_p.to_f64() * ask_q.units() as f64
                    + ask_p.to_f64() * bid_q.units() as f64)
                    / total_q;
                (Some(mid), Some(micro))
            }
            _ => (None, None),
        };

        let tail_start = self.tape.len().saturating_sub(tape_tail);
        PublishedBook {
            time,
            bids,
            asks,
            last_trade: self.lit.last_trade(),
            tape_tail: self.tape[tail_start..].to_vec(),
            mid_price,
            micro_price,
        }
    }

    /// Write the tape's trades as delimited text, one per line, and
    /// optionally wipe the tape afterwards.
    pub fn dump_tape(
        &mut self,
        session_id: &str,
        w: &mut dyn Write,
        mode: TapeDumpMode,
    ) -> io::Result<()> {
        for event in &self.tape {
            if let TapeEvent::Trade { pool, time, price, qty, .. } = event {
                writeln!(w, "{session_id}, {pool}, {:.3}, {price}, {qty}", time.as_secs_f64())?;
            }
        }
        if mode == TapeDumpMode::Wipe {
            self.tape.clear();
        }
        Ok(())
    }
}

fn ladder(side: &OrderBookSide) -> LadderView {
    LadderView {
        best: side.best_price(),
        worst: side.worst_price(),
        orders: side.n_orders(),
        levels: side.anon_levels().to_vec(),
    }
}

/// Mechanical expansion of an iceberg into nested one-sends-other orders:
/// each leg is a limit order for the display quantity (the last leg takes
/// the remainder), and each fill of a leg sends the next.
fn expand_iceberg(parent: &Order, display: Quantity) -> Result<Order, EngineError> {
    if display.is_zero() || display >= parent.qty {
        return Err(EngineError::BadIcebergDisplay { qty: parent.qty, display });
    }

    let leg = |qty: Quantity| {
        let mut o = Order::limit(
            parent.agent.clone(),
            parent.side,
            parent.price,
            qty,
            parent.submitted,
            parent.customer_ref,
        );
        o.expires = parent.expires;
        o
    };

    let remainder = parent.qty.units() % display.units();
    let mut tail = leg(Quantity::new(if remainder > 0 { remainder } else { display.units() }));
    let mut total = tail.qty;
    while total < parent.qty {
        let pair = OxoPair { first: leg(display), second: tail };
        let mut oso = Order::new(
            parent.agent.clone(),
            parent.side,
            OrderStyle::OneSendsOther(Box::new(pair)),
            parent.price,
            parent.qty,
            parent.submitted,
            parent.customer_ref,
        );
        oso.expires = parent.expires;
        tail = oso;
        total += display;
    }
    Ok(tail)
}
