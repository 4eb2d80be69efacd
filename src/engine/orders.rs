//! Order validation and ledger mutation.
//!
//! `place_order` is all-or-nothing: a rejected order leaves the state
//! exactly as it found it. Realized profit/loss on sells is measured
//! against the instrument's previous close.

use crate::models::{Side, SimState, Transaction};

/// Why an order was rejected. None of these are fatal; state is untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderError {
    UnknownInstrument(String),
    InvalidQuantity(u32),
    InsufficientFunds { required: f64, available: f64 },
    InsufficientShares { requested: u32, held: u32 },
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownInstrument(name) => write!(f, "unknown instrument: {}", name),
            Self::InvalidQuantity(qty) => write!(f, "quantity must be > 0 (got {})", qty),
            Self::InsufficientFunds { required, available } => write!(
                f,
                "insufficient funds: need {:.0}, have {:.0}",
                required, available
            ),
            Self::InsufficientShares { requested, held } => write!(
                f,
                "insufficient shares: requested {}, holding {}",
                requested, held
            ),
        }
    }
}

impl std::error::Error for OrderError {}

/// Validate and apply a buy/sell order against the simulation state.
///
/// On success the ledger is mutated and the recorded transaction returned;
/// the caller is responsible for persisting the state afterwards.
pub fn place_order(
    state: &mut SimState,
    instrument: &str,
    side: Side,
    quantity: u32,
) -> Result<Transaction, OrderError> {
    if quantity == 0 {
        return Err(OrderError::InvalidQuantity(quantity));
    }

    let (price, prev_close) = match state.instrument(instrument) {
        Some(inst) => (inst.price, inst.prev_close),
        None => return Err(OrderError::UnknownInstrument(instrument.to_string())),
    };

    let total = quantity as f64 * price;

    match side {
        Side::Buy => {
            if state.ledger.cash < total {
                return Err(OrderError::InsufficientFunds {
                    required: total,
                    available: state.ledger.cash,
                });
            }
            state.ledger.cash -= total;
            *state
                .ledger
                .holdings
                .entry(instrument.to_string())
                .or_insert(0) += quantity;
        }
        Side::Sell => {
            let held = state.ledger.held(instrument);
            if held < quantity {
                return Err(OrderError::InsufficientShares {
                    requested: quantity,
                    held,
                });
            }
            state
                .ledger
                .holdings
                .insert(instrument.to_string(), held - quantity);
            state.ledger.daily_pnl += (price - prev_close) * quantity as f64;
            state.ledger.cash += total;
        }
    }

    let tx = Transaction::new(instrument, side, quantity, price);
    state.ledger.record(tx.clone());
    Ok(tx)
}
