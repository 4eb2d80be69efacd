//! User accounts: the engine's external credential collaborator.
//!
//! The engine only consumes an opening cash balance from here at
//! fresh-state creation and reports the final balance back at shutdown.
//! Nothing inside the simulation depends on these types.

mod user_store;

pub use user_store::{SignupOutcome, UserStore};
