//! Market Simulator Backend Library
//!
//! Exposes the simulation and ledger engine for the `marketsim` binary and
//! integration tests. The presentation layer is an external collaborator:
//! it reads state snapshots via [`engine::SimEngine`] and forwards user
//! commands into it, nothing more.

pub mod auth;
pub mod engine;
pub mod models;
pub mod persistence;
