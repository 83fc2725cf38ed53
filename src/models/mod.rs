//! Inbound data models

pub mod signal;

pub use signal::{Direction, OrderType, Signal, SignalError, TradeAction, TradeIntent};
