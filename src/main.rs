//! Market Simulator - headless runner
//! Mission: Drive the simulation engine without a UI attached
//!
//! Loads (or creates) the persisted simulation state, starts the two price
//! timers, logs engine events, and shuts down cleanly on Ctrl-C with a final
//! save and a balance write-back to the user store.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketsim_backend::auth::{SignupOutcome, UserStore};
use marketsim_backend::engine::{EngineConfig, SimEngine};
use marketsim_backend::models::{Config, EngineEvent, OPENING_BALANCE};
use marketsim_backend::persistence::StateStore;

#[derive(Parser, Debug)]
#[command(name = "marketsim", about = "Toy stock market simulation engine")]
struct Args {
    /// Path to the persisted simulation state
    #[arg(long, env = "SIM_STATE_PATH")]
    state_path: Option<String>,

    /// Path to the user database
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<String>,

    /// Simulated day length in seconds
    #[arg(long, env = "SIM_DAY_SECS")]
    day_secs: Option<u64>,

    /// Log in as this user; their stored balance seeds a fresh state
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Password for --username
    #[arg(long)]
    password: Option<String>,

    /// Create the account first if it does not exist
    #[arg(long, default_value_t = false)]
    signup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut cfg = Config::from_env()?;
    if let Some(path) = args.state_path {
        cfg.state_path = path;
    }
    if let Some(path) = args.database_path {
        cfg.database_path = path;
    }
    if let Some(secs) = args.day_secs {
        cfg.day_length = Duration::from_secs(secs);
    }

    info!(state = %cfg.state_path, db = %cfg.database_path, "marketsim starting");

    let user_store = UserStore::new(&cfg.database_path)?;

    // Resolve the opening balance for a fresh state. A persisted state, if
    // usable, wins over this anyway.
    let opening_balance = match (&args.username, &args.password) {
        (Some(username), Some(password)) => {
            if args.signup {
                match user_store.create_account(username, password)? {
                    SignupOutcome::Created => info!(username, "account created"),
                    SignupOutcome::AlreadyExists => debug!(username, "account already exists"),
                }
            }
            user_store
                .authenticate(username, password)?
                .with_context(|| format!("invalid credentials for {}", username))?
        }
        _ => OPENING_BALANCE,
    };

    let store = StateStore::new(&cfg.state_path);
    let engine = SimEngine::load_or_create(EngineConfig::from(&cfg), store, opening_balance);
    engine.start();

    tokio::spawn(log_events(engine.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;

    let final_balance = engine.shutdown();
    if let Some(username) = &args.username {
        if let Err(e) = user_store.update_balance(username, final_balance) {
            warn!(error = %e, "failed to write closing balance back");
        } else {
            info!(username, final_balance, "closing balance written back");
        }
    }

    Ok(())
}

/// Mirror engine events into the log so a headless run is observable.
async fn log_events(engine: SimEngine) {
    let mut rx = engine.subscribe();
    loop {
        match rx.recv().await {
            Ok(EngineEvent::PriceChanged {
                instrument,
                price,
                direction,
            }) => debug!(instrument = %instrument, price, ?direction, "price changed"),
            Ok(EngineEvent::DayAdvanced { day_index }) => info!(day_index, "day advanced"),
            Ok(EngineEvent::OrderExecuted(tx)) => info!(
                instrument = %tx.instrument,
                side = tx.side.as_str(),
                quantity = tx.quantity,
                price = tx.price,
                "order executed"
            ),
            Ok(EngineEvent::ResetPerformed { undo_deadline }) => {
                info!(undo_deadline = %undo_deadline, "reset performed")
            }
            Ok(EngineEvent::UndoPerformed) => info!("reset undone"),
            Ok(EngineEvent::UndoExpired) => info!("undo window expired"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(dropped = n, "event logger lagged")
            }
            Err(_) => break,
        }
    }
}

/// Initialize tracing with an env-filterable subscriber
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketsim_backend=info,marketsim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
