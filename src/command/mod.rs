//! Command exchange infrastructure
//!
//! This module handles:
//! - Correlating each request with its response on the command channel
//! - Serializing exchanges so at most one is ever in flight
//! - Running catalog commands and interpreting their replies

mod correlator;
mod executor;

pub use correlator::{ExchangeCorrelator, ExchangeState};
pub use executor::CommandExecutor;
