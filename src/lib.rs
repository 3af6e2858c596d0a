//! Adaptive flow control: bound outstanding work by observed completion throughput.
//!
//! Instead of a fixed concurrency cap, an [OutstandingCountFlowController] admits roughly as many
//! operations as it has seen complete successfully over the last couple of seconds. Callers can
//! burst when the remote side is fast, and are throttled when it slows down or starts failing.

#![deny(missing_docs)]

#[cfg(doctest)]
use doc_comment::doctest;
#[cfg(doctest)]
doctest!("../README.md");

pub mod controller;
mod error;
mod gate;
pub mod options;
mod refresher;
mod window;

pub use controller::{
    ControllerState, FixedFlowController, FlowController, Health, Outcome,
    OutstandingCountFlowController,
};
pub use error::Error;
pub use options::Options;
