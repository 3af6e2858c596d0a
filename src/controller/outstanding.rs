use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{runtime::Handle, task::JoinHandle, time::timeout};
use tracing::{debug, info};

use crate::{
    gate::Gate,
    options::Options,
    refresher,
    window::CompletionWindow,
    Error,
};

use super::{ControllerState, FlowController, Outcome};

/// Keeps the outstanding count close to the throughput expected over the next few seconds.
///
/// Throughput is estimated from successful completions over a trailing window (15 seconds by
/// default). Requests are admitted while fewer than `rate × horizon` operations are outstanding
/// (a 2 second horizon by default). Failed operations free their permits but don't count
/// towards throughput, so sustained failures shrink the amount of work admitted.
///
/// Until the first refresh, one window after construction, the seed rate is used.
///
/// The rate is refreshed by a background task which runs until the controller is shut down or
/// dropped.
#[derive(Debug)]
pub struct OutstandingCountFlowController {
    gate: Arc<Gate>,
    window: Arc<CompletionWindow>,
    refresher: JoinHandle<()>,
}

/// Whether the rate estimate is being kept up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// The seed rate is still in use.
    Warming,
    /// The rate is being refreshed from observed throughput.
    Running,
    /// The controller has been shut down.
    Stopped,
    /// The refresher has stopped unexpectedly. The rate will no longer change.
    Failed,
}

impl OutstandingCountFlowController {
    /// Create a flow controller with default [Options], starting from `seed_rate` operations per
    /// second.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(seed_rate: f64) -> Result<Arc<Self>, Error> {
        Self::with_options(seed_rate, Options::default())
    }

    /// Create a flow controller, starting from `seed_rate` operations per second.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_options(seed_rate: f64, options: Options) -> Result<Arc<Self>, Error> {
        if !seed_rate.is_finite() || seed_rate < 0.0 {
            return Err(Error::InvalidRate(seed_rate));
        }
        options.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let gate = Arc::new(Gate::new(seed_rate, options.horizon()));
        let window = Arc::new(CompletionWindow::new(options.window()));
        let refresher =
            refresher::spawn(&runtime, Arc::clone(&gate), Arc::clone(&window), &options);

        debug!(seed_rate, ?options, "created flow controller");

        Ok(Arc::new(Self {
            gate,
            window,
            refresher,
        }))
    }

    /// Wait until operations may be started.
    ///
    /// Returns the number of operations the caller may start, at least one. Blocked callers are
    /// admitted in the order they arrived.
    pub async fn request_start(&self) -> Result<usize, Error> {
        self.gate.acquire().await
    }

    /// Like [request_start](Self::request_start), but gives up after `duration`.
    pub async fn request_start_timeout(&self, duration: Duration) -> Result<usize, Error> {
        timeout(duration, self.gate.acquire())
            .await
            .unwrap_or(Err(Error::Timeout))
    }

    /// Report that an operation has finished.
    ///
    /// Returns [Error::Unbalanced] if nothing is outstanding. The outstanding count never goes
    /// below zero.
    pub fn inform_finished(&self, outcome: Outcome) -> Result<(), Error> {
        self.gate.release()?;
        if outcome == Outcome::Success {
            self.window.record();
        }
        Ok(())
    }

    /// Stop refreshing the rate and fail blocked and future requests with [Error::Shutdown].
    ///
    /// Idempotent. Also called on drop.
    pub fn shutdown(&self) {
        if self.gate.close() {
            info!("flow controller shut down");
        }
        self.refresher.abort();
    }

    /// The current state of the controller.
    pub fn state(&self) -> ControllerState {
        self.gate.snapshot().into()
    }

    /// Whether the rate estimate is being kept up to date.
    pub fn health(&self) -> Health {
        let snapshot = self.gate.snapshot();
        if snapshot.closed {
            Health::Stopped
        } else if self.refresher.is_finished() {
            Health::Failed
        } else if snapshot.refreshes == 0 {
            Health::Warming
        } else {
            Health::Running
        }
    }
}

#[async_trait]
impl FlowController for OutstandingCountFlowController {
    async fn request_start(&self) -> Result<usize, Error> {
        OutstandingCountFlowController::request_start(self).await
    }

    fn inform_finished(&self, outcome: Outcome) -> Result<(), Error> {
        OutstandingCountFlowController::inform_finished(self, outcome)
    }

    fn shutdown(&self) {
        OutstandingCountFlowController::shutdown(self);
    }
}

impl Drop for OutstandingCountFlowController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
