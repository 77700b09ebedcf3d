//! Core of the OTP relay: ingestion, dedup and broadcast fan-out.
//!
//! This crate is transport-agnostic. The upstream source and the messenger
//! live behind ports (traits); the Telegram adapter crate implements delivery
//! and the administrative command surface.

pub mod config;
pub mod control;
pub mod dedup;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod formatting;
pub mod gate;
pub mod logging;
pub mod messaging;
pub mod poller;
pub mod registry;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
