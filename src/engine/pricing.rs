//! Price evolution rules.
//!
//! Pure functions over an injected RNG so scheduled ticks and tests share
//! the exact same math. Prices are whole currency units: every move rounds
//! to the nearest unit and never drops below [`PRICE_FLOOR`].

use rand::Rng;

use crate::models::{Instrument, PRICE_FLOOR};

/// Daily move magnitude: uniform percentage in [-10, +10).
pub const DAILY_MOVE_PCT: f64 = 10.0;

/// Intra-day jitter magnitude: uniform percentage in [-1, +1).
pub const INTRADAY_MOVE_PCT: f64 = 1.0;

/// Probability that an instrument moves at all on a fluctuation tick.
pub const INTRADAY_MOVE_PROB: f64 = 0.4;

/// Apply one daily move. The pre-move price becomes the previous close
/// before the perturbation, and the new price is appended to history.
pub fn apply_daily_move(instrument: &mut Instrument, rng: &mut impl Rng) -> f64 {
    instrument.prev_close = instrument.price;
    let pct = rng.gen_range(-DAILY_MOVE_PCT..DAILY_MOVE_PCT);
    let new_price = apply_pct(instrument.price, pct);
    instrument.push_price(new_price);
    new_price
}

/// Apply one intra-day move decision. With probability
/// [`INTRADAY_MOVE_PROB`] the price jitters; otherwise the instrument is
/// left untouched. The previous close never changes here.
pub fn apply_intraday_move(instrument: &mut Instrument, rng: &mut impl Rng) -> Option<f64> {
    if rng.gen::<f64>() > INTRADAY_MOVE_PROB {
        return None;
    }
    let pct = rng.gen_range(-INTRADAY_MOVE_PCT..INTRADAY_MOVE_PCT);
    let new_price = apply_pct(instrument.price, pct);
    instrument.push_price(new_price);
    Some(new_price)
}

/// Percentage perturbation, rounded to a whole unit, floored at 1.
pub fn apply_pct(price: f64, pct: f64) -> f64 {
    (price * (1.0 + pct / 100.0)).round().max(PRICE_FLOOR)
}
