//! Core domain model: instruments, ledger, simulation state, engine events.
//!
//! Everything here is plain data. Mutation rules live in `engine::pricing`
//! and `engine::orders`; this module only enforces the structural invariants
//! (bounded history, paired transaction logs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Opening cash balance for a fresh ledger (and the reset target).
pub const OPENING_BALANCE: f64 = 100_000.0;

/// Price history keeps at most this many points; oldest are discarded.
pub const HISTORY_CAP: usize = 30;

/// Prices never go below one currency unit.
pub const PRICE_FLOOR: f64 = 1.0;

/// Seeded instruments for a fresh state. This table is the external contract
/// for "fresh state": names and starting prices must not drift.
pub const SEED_INSTRUMENTS: &[(&str, f64)] = &[
    ("Reliance", 2500.0),
    ("TCS", 3500.0),
    ("Infosys", 1450.0),
    ("HDFC Bank", 1600.0),
    ("ICICI Bank", 970.0),
    ("Adani Ports", 1200.0),
    ("Bajaj Finance", 7800.0),
    ("Wipro", 400.0),
    ("ONGC", 210.0),
    ("Coal India", 285.0),
    ("Maruti", 11000.0),
    ("Tata Motors", 875.0),
    ("NTPC", 310.0),
    ("Tech Mahindra", 1300.0),
    ("Sun Pharma", 1250.0),
];

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// An executed order. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub instrument: String,
    pub side: Side,
    pub quantity: u32,
    pub price: f64,
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(instrument: &str, side: Side, quantity: u32, price: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            side,
            quantity,
            price,
            executed_at: Utc::now(),
        }
    }
}

/// Momentum classification derived from recent price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Momentum {
    Up,
    Down,
    Flat,
}

/// Direction of the current price relative to the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceDirection {
    Up,
    Down,
    Unchanged,
}

/// A simulated tradable asset with a bounded price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    /// Current price in whole currency units. Invariant: >= PRICE_FLOOR.
    pub price: f64,
    /// Price recorded immediately before the most recent daily tick.
    pub prev_close: f64,
    /// Seed price recorded at creation; the reset target.
    pub initial_price: f64,
    /// Most recent prices, oldest first. Never empty.
    pub history: VecDeque<f64>,
}

impl Instrument {
    pub fn new(name: &str, price: f64) -> Self {
        let mut history = VecDeque::with_capacity(HISTORY_CAP);
        history.push_back(price);
        Self {
            name: name.to_string(),
            price,
            prev_close: price,
            initial_price: price,
            history,
        }
    }

    /// Set a new current price and append it to the capped history.
    pub fn push_price(&mut self, price: f64) {
        self.price = price;
        self.history.push_back(price);
        if self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    /// Restore the seeded starting price, collapsing history to one point.
    pub fn reset_to_initial(&mut self) {
        self.price = self.initial_price;
        self.prev_close = self.initial_price;
        self.history.clear();
        self.history.push_back(self.initial_price);
    }

    pub fn direction(&self) -> PriceDirection {
        if self.price > self.prev_close {
            PriceDirection::Up
        } else if self.price < self.prev_close {
            PriceDirection::Down
        } else {
            PriceDirection::Unchanged
        }
    }

    /// Short-term momentum: relative change between the averages of two
    /// adjacent trailing windows of `min(5, n/2)` points. Needs at least
    /// six history points, otherwise 0.
    pub fn momentum(&self) -> f64 {
        let n = self.history.len();
        if n < 6 {
            return 0.0;
        }
        let window = 5.min(n / 2);
        let sum_new: f64 = self.history.iter().rev().take(window).sum();
        let sum_old: f64 = self.history.iter().rev().skip(window).take(window).sum();
        let avg_new = sum_new / window as f64;
        let avg_old = sum_old / window as f64;
        (avg_new - avg_old) / avg_old
    }

    /// Momentum classified for display: beyond +-1% counts as a trend.
    pub fn momentum_class(&self) -> Momentum {
        let m = self.momentum();
        if m > 0.01 {
            Momentum::Up
        } else if m < -0.01 {
            Momentum::Down
        } else {
            Momentum::Flat
        }
    }

    /// Keyword-based sector tag for display.
    pub fn sector(&self) -> &'static str {
        let name = self.name.to_lowercase();
        if name.contains("bank") || name.contains("icici") || name.contains("hdfc") {
            "Banking & Finance"
        } else if name.contains("tech") || name.contains("tcs") || name.contains("infosys") {
            "IT Services"
        } else if name.contains("reliance") || name.contains("ongc") || name.contains("adani") {
            "Energy / Infrastructure"
        } else if name.contains("pharma") || name.contains("sun") {
            "Healthcare / Pharma"
        } else {
            "Conglomerate"
        }
    }
}

/// The user's cash, holdings and transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Invariant: >= 0 after every validated order.
    pub cash: f64,
    /// Instrument name -> quantity held.
    pub holdings: HashMap<String, u32>,
    /// Cleared at each daily tick.
    pub today_transactions: Vec<Transaction>,
    /// Append-only.
    pub all_transactions: Vec<Transaction>,
    /// Realized profit/loss since the last daily tick.
    pub daily_pnl: f64,
}

impl Ledger {
    pub fn new(opening_cash: f64) -> Self {
        Self {
            cash: opening_cash,
            holdings: HashMap::new(),
            today_transactions: Vec::new(),
            all_transactions: Vec::new(),
            daily_pnl: 0.0,
        }
    }

    pub fn held(&self, instrument: &str) -> u32 {
        self.holdings.get(instrument).copied().unwrap_or(0)
    }

    /// Append a transaction to both logs, preserving insertion order.
    pub fn record(&mut self, tx: Transaction) {
        self.today_transactions.push(tx.clone());
        self.all_transactions.push(tx);
    }

    /// Day rollover: drop day-scoped fields.
    pub fn clear_day(&mut self) {
        self.today_transactions.clear();
        self.daily_pnl = 0.0;
    }
}

/// The whole simulation: the unit of persistence and of the undo snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Insertion order is display order.
    pub instruments: Vec<Instrument>,
    pub ledger: Ledger,
    /// Wall-clock time of the last daily tick; drives resume scheduling.
    pub last_tick: DateTime<Utc>,
    pub day_index: u32,
}

impl SimState {
    /// Fresh state with the seed instruments and the given opening cash.
    pub fn fresh(opening_cash: f64) -> Self {
        Self {
            instruments: SEED_INSTRUMENTS
                .iter()
                .map(|(name, price)| Instrument::new(name, *price))
                .collect(),
            ledger: Ledger::new(opening_cash),
            last_tick: Utc::now(),
            day_index: 0,
        }
    }

    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.name == name)
    }

    pub fn instrument_mut(&mut self, name: &str) -> Option<&mut Instrument> {
        self.instruments.iter_mut().find(|i| i.name == name)
    }
}

/// Outbound notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PriceChanged {
        instrument: String,
        price: f64,
        direction: PriceDirection,
    },
    DayAdvanced {
        day_index: u32,
    },
    OrderExecuted(Transaction),
    ResetPerformed {
        undo_deadline: DateTime<Utc>,
    },
    UndoPerformed,
    UndoExpired,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub state_path: String,
    pub database_path: String,
    /// One simulated trading day.
    pub day_length: Duration,
    /// Period of the live fluctuation tick.
    pub fluct_interval: Duration,
    /// How long a reset can be undone.
    pub undo_window: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let state_path =
            std::env::var("SIM_STATE_PATH").unwrap_or_else(|_| "./sim_state.json".to_string());

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./marketsim.db".to_string());

        let day_secs = std::env::var("SIM_DAY_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let fluct_ms = std::env::var("SIM_FLUCT_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);

        let undo_secs = std::env::var("SIM_UNDO_WINDOW_SECS")
            .unwrap_or_else(|_| "6".to_string())
            .parse()
            .unwrap_or(6);

        Ok(Self {
            state_path,
            database_path,
            day_length: Duration::from_secs(day_secs),
            fluct_interval: Duration::from_millis(fluct_ms),
            undo_window: Duration::from_secs(undo_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_matches_seed_table() {
        let state = SimState::fresh(OPENING_BALANCE);
        assert_eq!(state.instruments.len(), 15);
        assert_eq!(state.ledger.cash, 100_000.0);
        assert_eq!(state.day_index, 0);
        assert!(state.ledger.holdings.is_empty());

        let reliance = state.instrument("Reliance").unwrap();
        assert_eq!(reliance.price, 2500.0);
        assert_eq!(reliance.prev_close, 2500.0);
        assert_eq!(reliance.history.len(), 1);

        let ongc = state.instrument("ONGC").unwrap();
        assert_eq!(ongc.price, 210.0);

        // Insertion order is display order.
        assert_eq!(state.instruments[0].name, "Reliance");
        assert_eq!(state.instruments[14].name, "Sun Pharma");
    }

    #[test]
    fn history_is_capped() {
        let mut inst = Instrument::new("Reliance", 2500.0);
        for i in 0..100 {
            inst.push_price(2500.0 + i as f64);
        }
        assert_eq!(inst.history.len(), HISTORY_CAP);
        assert_eq!(*inst.history.back().unwrap(), 2599.0);
        assert_eq!(inst.price, 2599.0);
    }

    #[test]
    fn momentum_needs_six_points() {
        let mut inst = Instrument::new("TCS", 100.0);
        for p in [101.0, 102.0, 103.0, 104.0] {
            inst.push_price(p);
        }
        assert_eq!(inst.history.len(), 5);
        assert_eq!(inst.momentum(), 0.0);
        assert_eq!(inst.momentum_class(), Momentum::Flat);
    }

    #[test]
    fn momentum_compares_trailing_windows() {
        let mut inst = Instrument::new("TCS", 100.0);
        // Six points total: old window [100, 100, 100], new window [110, 110, 110].
        for p in [100.0, 100.0, 110.0, 110.0, 110.0] {
            inst.push_price(p);
        }
        let m = inst.momentum();
        assert!((m - 0.10).abs() < 1e-9);
        assert_eq!(inst.momentum_class(), Momentum::Up);
    }

    #[test]
    fn momentum_down_when_new_window_lower() {
        let mut inst = Instrument::new("TCS", 200.0);
        for p in [200.0, 200.0, 150.0, 150.0, 150.0] {
            inst.push_price(p);
        }
        assert_eq!(inst.momentum_class(), Momentum::Down);
    }

    #[test]
    fn reset_to_initial_collapses_history() {
        let mut inst = Instrument::new("Wipro", 400.0);
        inst.push_price(450.0);
        inst.prev_close = 430.0;
        inst.reset_to_initial();
        assert_eq!(inst.price, 400.0);
        assert_eq!(inst.prev_close, 400.0);
        assert_eq!(inst.history.len(), 1);
        assert_eq!(*inst.history.front().unwrap(), 400.0);
    }

    #[test]
    fn ledger_records_into_both_logs_in_order() {
        let mut ledger = Ledger::new(OPENING_BALANCE);
        ledger.record(Transaction::new("Reliance", Side::Buy, 10, 2500.0));
        ledger.record(Transaction::new("TCS", Side::Sell, 2, 3500.0));
        assert_eq!(ledger.today_transactions.len(), 2);
        assert_eq!(ledger.all_transactions.len(), 2);
        assert_eq!(ledger.today_transactions[0].instrument, "Reliance");
        assert_eq!(ledger.all_transactions[1].instrument, "TCS");

        ledger.clear_day();
        assert!(ledger.today_transactions.is_empty());
        assert_eq!(ledger.all_transactions.len(), 2);
        assert_eq!(ledger.daily_pnl, 0.0);
    }

    #[test]
    fn sector_tags() {
        assert_eq!(Instrument::new("HDFC Bank", 1.0).sector(), "Banking & Finance");
        assert_eq!(Instrument::new("Infosys", 1.0).sector(), "IT Services");
        assert_eq!(
            Instrument::new("Adani Ports", 1.0).sector(),
            "Energy / Infrastructure"
        );
        assert_eq!(
            Instrument::new("Sun Pharma", 1.0).sector(),
            "Healthcare / Pharma"
        );
        assert_eq!(Instrument::new("Maruti", 1.0).sector(), "Conglomerate");
    }
}
