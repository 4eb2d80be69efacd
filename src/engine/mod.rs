//! Simulation engine facade.
//!
//! One `SimEngine` owns the shared [`SimState`] behind a parking_lot mutex;
//! scheduled ticks, orders, reset and undo all run as short critical
//! sections against it, and every durable mutation writes through to the
//! state store before the section ends. The presentation layer talks to the
//! engine only through the command methods here and the broadcast event
//! stream; the engine never depends on UI types.

pub mod orders;
pub mod pricing;
pub mod reset;
pub mod scheduler;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::{EngineEvent, Ledger, Side, SimState, Transaction, OPENING_BALANCE};
use crate::persistence::StateStore;
use orders::OrderError;
use reset::{ResetController, ResetError};
use scheduler::TimerHandles;

/// Engine timing knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// One simulated trading day.
    pub day_length: Duration,
    /// Period of the live fluctuation tick.
    pub fluct_interval: Duration,
    /// How long a reset can be undone.
    pub undo_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_length: Duration::from_secs(3600),
            fluct_interval: Duration::from_secs(1),
            undo_window: Duration::from_secs(6),
        }
    }
}

impl From<&crate::models::Config> for EngineConfig {
    fn from(cfg: &crate::models::Config) -> Self {
        Self {
            day_length: cfg.day_length,
            fluct_interval: cfg.fluct_interval,
            undo_window: cfg.undo_window,
        }
    }
}

pub(crate) struct EngineInner {
    pub(crate) cfg: EngineConfig,
    pub(crate) state: Mutex<SimState>,
    pub(crate) store: StateStore,
    pub(crate) rng: Mutex<ChaCha8Rng>,
    pub(crate) events: broadcast::Sender<EngineEvent>,
    pub(crate) reset: Mutex<ResetController>,
    pub(crate) timers: Mutex<TimerHandles>,
}

/// Cheaply cloneable handle to the engine.
#[derive(Clone)]
pub struct SimEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl SimEngine {
    pub fn new(cfg: EngineConfig, store: StateStore, state: SimState) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(EngineInner {
                cfg,
                state: Mutex::new(state),
                store,
                rng: Mutex::new(ChaCha8Rng::from_entropy()),
                events,
                reset: Mutex::new(ResetController::new()),
                timers: Mutex::new(TimerHandles::default()),
            }),
        }
    }

    /// Load the persisted state, or create a fresh one with the given
    /// opening cash. Corrupt or missing files never fail startup.
    pub fn load_or_create(cfg: EngineConfig, store: StateStore, opening_cash: f64) -> Self {
        let state = store.load().unwrap_or_else(|| {
            info!(opening_cash, "no usable persisted state; creating fresh state");
            SimState::fresh(opening_cash)
        });
        Self::new(cfg, store, state)
    }

    /// Replace the engine RNG. Tests pin a seed here.
    pub fn with_rng(self, rng: ChaCha8Rng) -> Self {
        *self.inner.rng.lock() = rng;
        self
    }

    // ==================== commands ====================

    /// Validate and execute a buy/sell order. Success writes through to the
    /// store and is broadcast; failure leaves state untouched.
    pub fn place_order(
        &self,
        instrument: &str,
        side: Side,
        quantity: u32,
    ) -> Result<Transaction, OrderError> {
        let tx = {
            let mut state = self.inner.state.lock();
            let tx = orders::place_order(&mut state, instrument, side, quantity)?;
            self.persist(&state);
            tx
        };
        debug!(
            instrument = %tx.instrument,
            side = tx.side.as_str(),
            quantity = tx.quantity,
            price = tx.price,
            "order executed"
        );
        self.emit(EngineEvent::OrderExecuted(tx.clone()));
        Ok(tx)
    }

    /// Reset the market to its seeded starting point, keeping a snapshot of
    /// the prior state for a time-boxed undo. Returns the undo deadline.
    ///
    /// Refused while a previous undo window is still open. If the snapshot
    /// cannot be captured the reset is aborted and the state untouched.
    pub fn reset(&self) -> Result<DateTime<Utc>, ResetError> {
        let mut ctl = self.inner.reset.lock();
        if ctl.is_pending() {
            return Err(ResetError::UndoPending);
        }

        let snapshot = {
            let state = self.inner.state.lock();
            serde_json::to_string(&*state).map_err(|e| ResetError::Snapshot(e.to_string()))?
        };

        self.stop_timers();

        {
            let mut state = self.inner.state.lock();
            for inst in &mut state.instruments {
                inst.reset_to_initial();
            }
            state.ledger = Ledger::new(OPENING_BALANCE);
            state.day_index = 0;
            state.last_tick = Utc::now();
            self.persist(&state);
        }

        self.start();

        let deadline = Utc::now()
            + chrono::Duration::from_std(self.inner.cfg.undo_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(6));
        let snapshot_id = ctl.arm(snapshot, deadline);
        drop(ctl);

        let engine = self.clone();
        let window = self.inner.cfg.undo_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            engine.expire_undo(snapshot_id);
        });

        self.emit_all_prices();
        self.emit(EngineEvent::ResetPerformed {
            undo_deadline: deadline,
        });
        info!(undo_deadline = %deadline, "market reset; undo window open");
        Ok(deadline)
    }

    /// Roll the market back to the snapshot captured by the last `reset`,
    /// if the undo window is still open.
    pub fn undo_reset(&self) -> Result<(), ResetError> {
        let mut ctl = self.inner.reset.lock();
        let (snapshot, deadline) = match ctl.take_pending() {
            Some(pending) => pending,
            None => return Err(ResetError::NothingToUndo),
        };

        if Utc::now() > deadline {
            // The reset stands; the expiry task may simply not have fired yet.
            self.emit(EngineEvent::UndoExpired);
            return Err(ResetError::UndoExpired);
        }

        let restored: SimState =
            serde_json::from_str(&snapshot).map_err(|e| ResetError::Snapshot(e.to_string()))?;

        {
            let mut state = self.inner.state.lock();
            *state = restored;
            self.persist(&state);
        }
        drop(ctl);

        self.emit_all_prices();
        self.emit(EngineEvent::UndoPerformed);
        info!("reset undone");
        Ok(())
    }

    /// Discard the undo snapshot once its window lapses. Only the task armed
    /// for this snapshot id can clear it.
    pub(crate) fn expire_undo(&self, snapshot_id: u64) {
        let expired = self.inner.reset.lock().expire(snapshot_id);
        if expired {
            self.emit(EngineEvent::UndoExpired);
            info!("undo window expired; reset stands");
        }
    }

    /// Cancel both timers, write a final snapshot, and report the closing
    /// cash balance.
    pub fn shutdown(&self) -> f64 {
        self.stop_timers();
        let state = self.inner.state.lock();
        self.persist(&state);
        info!(balance = state.ledger.cash, day_index = state.day_index, "engine shut down");
        state.ledger.cash
    }

    // ==================== queries ====================

    /// Read-only snapshot for display.
    pub fn state_snapshot(&self) -> SimState {
        self.inner.state.lock().clone()
    }

    pub fn transaction_history(&self) -> Vec<Transaction> {
        self.inner.state.lock().ledger.all_transactions.clone()
    }

    pub fn today_transactions(&self) -> Vec<Transaction> {
        self.inner.state.lock().ledger.today_transactions.clone()
    }

    pub fn portfolio(&self) -> HashMap<String, u32> {
        self.inner.state.lock().ledger.holdings.clone()
    }

    pub fn balance(&self) -> f64 {
        self.inner.state.lock().ledger.cash
    }

    pub fn daily_pnl(&self) -> f64 {
        self.inner.state.lock().ledger.daily_pnl
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    // ==================== scheduled ticks ====================

    /// One simulated trading day: large price moves, day rollover, persist.
    pub(crate) fn tick_day(&self) {
        let mut moves = Vec::new();
        let day_index;
        {
            let mut state = self.inner.state.lock();
            let mut rng = self.inner.rng.lock();
            state.day_index += 1;
            state.last_tick = Utc::now();
            day_index = state.day_index;
            for inst in &mut state.instruments {
                pricing::apply_daily_move(inst, &mut *rng);
                moves.push((inst.name.clone(), inst.price, inst.direction()));
            }
            state.ledger.clear_day();
            drop(rng);
            self.persist(&state);
        }
        for (instrument, price, direction) in moves {
            self.emit(EngineEvent::PriceChanged {
                instrument,
                price,
                direction,
            });
        }
        self.emit(EngineEvent::DayAdvanced { day_index });
        info!(day_index, "simulated day advanced");
    }

    /// One live fluctuation pass: small probabilistic jitter, no rollover,
    /// no persistence.
    pub(crate) fn tick_live(&self) {
        let mut moves = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let mut rng = self.inner.rng.lock();
            for inst in &mut state.instruments {
                if pricing::apply_intraday_move(inst, &mut *rng).is_some() {
                    moves.push((inst.name.clone(), inst.price, inst.direction()));
                }
            }
        }
        for (instrument, price, direction) in moves {
            self.emit(EngineEvent::PriceChanged {
                instrument,
                price,
                direction,
            });
        }
    }

    // ==================== internals ====================

    /// Write-through save. A failed save is logged and the in-memory state
    /// remains authoritative.
    fn persist(&self, state: &SimState) {
        if let Err(e) = self.inner.store.save(state) {
            warn!(error = %e, "state save failed; in-memory state remains authoritative");
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events.send(event);
    }

    fn emit_all_prices(&self) {
        let prices: Vec<_> = {
            let state = self.inner.state.lock();
            state
                .instruments
                .iter()
                .map(|i| (i.name.clone(), i.price, i.direction()))
                .collect()
        };
        for (instrument, price, direction) in prices {
            self.emit(EngineEvent::PriceChanged {
                instrument,
                price,
                direction,
            });
        }
    }
}
