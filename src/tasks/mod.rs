//! Background Tasks Module
//!
//! Contains the timer that drives periodic work such as memory polling.

mod ticker;

pub use ticker::{IntervalTicker, TickFn, Ticker};
