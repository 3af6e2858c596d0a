//! Flow controllers, which bound the amount of outstanding work.

mod fixed;
mod outstanding;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{gate::GateSnapshot, Error};

pub use fixed::FixedFlowController;
pub use outstanding::{Health, OutstandingCountFlowController};

/// Bounds the number of operations in flight.
///
/// Call [request_start](FlowController::request_start) before starting work. It grants a batch
/// of permits: the caller may start up to that many operations before asking again. Report each
/// operation with [inform_finished](FlowController::inform_finished) once it resolves.
#[async_trait]
pub trait FlowController: Debug + Send + Sync {
    /// Wait until operations may be started.
    ///
    /// Returns the number of operations the caller is allowed to start, which is always at
    /// least one.
    async fn request_start(&self) -> Result<usize, Error>;

    /// Report that a previously started operation has finished.
    ///
    /// Frees its permit whatever the outcome.
    fn inform_finished(&self, outcome: Outcome) -> Result<(), Error>;

    /// Stop the controller. Blocked and future requests fail with [Error::Shutdown].
    fn shutdown(&self);
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation succeeded, and counts towards throughput.
    Success,
    /// The operation failed. It frees its permit but doesn't count towards throughput.
    Failure,
}

/// A snapshot of the state of a flow controller.
///
/// Not guaranteed to be consistent under high concurrency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    rate: f64,
    outstanding: usize,
    available: usize,
    waiting: usize,
}

impl From<bool> for Outcome {
    fn from(successful: bool) -> Self {
        if successful {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

impl ControllerState {
    /// The throughput estimate in use, in operations per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
    /// Operations started but not yet finished.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
    /// Permits which would be granted to the next request.
    pub fn available(&self) -> usize {
        self.available
    }
    /// Requests blocked waiting for permits.
    pub fn waiting(&self) -> usize {
        self.waiting
    }
}

impl From<GateSnapshot> for ControllerState {
    fn from(snapshot: GateSnapshot) -> Self {
        Self {
            rate: snapshot.rate,
            outstanding: snapshot.outstanding,
            available: snapshot.available,
            waiting: snapshot.waiting,
        }
    }
}
