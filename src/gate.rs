//! The admission gate.
//!
//! Holds the outstanding count and the current rate, and hands out batches of permits while
//! `floor(rate × horizon) − outstanding` is positive.
//!
//! Blocked callers wait in a FIFO queue of one-shot channels rather than on a condition
//! variable. Every mutation that could let a waiter in runs an admission pass over the queue,
//! which admits as many waiters, in order, as the new state allows.

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};

use conv::ConvUtil;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::Error;

#[derive(Debug)]
pub(crate) struct Gate {
    horizon: Duration,
    state: Mutex<GateState>,
}

#[derive(Debug)]
struct GateState {
    outstanding: usize,
    limit: Limit,
    closed: bool,
    refreshes: u64,
    next_id: WaiterId,
    waiters: VecDeque<Waiter>,
}

/// What bounds the outstanding count.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Limit {
    /// Operations per second, scaled by the horizon.
    Throughput(f64),
    /// A fixed number of operations.
    Fixed(usize),
}

/// Waiters are queued in increasing ID order.
type WaiterId = u64;

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    sender: oneshot::Sender<Result<usize, Error>>,
}

/// Waits for a queued request to be admitted.
///
/// Dropping it before completion gives up the place in the queue, or hands back permits which
/// were granted concurrently with the drop.
struct Admission {
    id: WaiterId,
    receiver: oneshot::Receiver<Result<usize, Error>>,
    gate: Arc<Gate>,
    done: bool,
}

/// A snapshot of the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GateSnapshot {
    pub(crate) rate: f64,
    pub(crate) outstanding: usize,
    pub(crate) available: usize,
    pub(crate) waiting: usize,
    pub(crate) refreshes: u64,
    pub(crate) closed: bool,
}

impl Gate {
    /// `rate` must be finite and non-negative.
    pub(crate) fn new(rate: f64, horizon: Duration) -> Self {
        debug_assert!(rate.is_finite() && rate >= 0.0);
        Self::with_limit(Limit::Throughput(rate), horizon)
    }

    /// A gate allowing at most `max_outstanding` permits, whose limit never changes.
    pub(crate) fn fixed(max_outstanding: usize) -> Self {
        Self::with_limit(Limit::Fixed(max_outstanding), Duration::ZERO)
    }

    fn with_limit(limit: Limit, horizon: Duration) -> Self {
        Self {
            horizon,
            state: Mutex::new(GateState {
                outstanding: 0,
                limit,
                closed: false,
                refreshes: 0,
                next_id: 0,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Wait until permits are available, then take all of them.
    ///
    /// Returns the number of permits granted, always at least one.
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<usize, Error> {
        let admission = {
            let mut state = self.state.lock().expect("lock should not be poisoned");
            if state.closed {
                return Err(Error::Shutdown);
            }

            // Queued waiters go first.
            if state.waiters.is_empty() {
                let available = state.available(self.horizon);
                if available > 0 {
                    state.outstanding += available;
                    trace!(permits = available, outstanding = state.outstanding, "granted");
                    return Ok(available);
                }
            }

            let (sender, receiver) = oneshot::channel();
            let id = state.next_id;
            state.next_id += 1;
            state.waiters.push_back(Waiter { id, sender });
            trace!(waiting = state.waiters.len(), "waiting for permits");

            Admission {
                id,
                receiver,
                gate: Arc::clone(self),
                done: false,
            }
        };

        admission.await
    }

    /// Release one permit.
    pub(crate) fn release(&self) -> Result<(), Error> {
        let mut state = self.state.lock().expect("lock should not be poisoned");
        if state.closed {
            return Err(Error::Shutdown);
        }
        if state.outstanding == 0 {
            warn!("completion reported with no outstanding permits");
            return Err(Error::Unbalanced);
        }
        state.outstanding -= 1;
        state.admit_waiters(self.horizon);
        Ok(())
    }

    /// Replace the rate and let in whichever waiters it now allows.
    pub(crate) fn publish_rate(&self, rate: f64) -> Result<(), Error> {
        let mut state = self.state.lock().expect("lock should not be poisoned");
        if state.closed {
            return Err(Error::Shutdown);
        }
        state.limit = Limit::Throughput(rate);
        state.refreshes += 1;
        state.admit_waiters(self.horizon);
        Ok(())
    }

    /// Close the gate, failing all current and future waiters.
    ///
    /// Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock().expect("lock should not be poisoned");
        if state.closed {
            return false;
        }
        state.closed = true;
        for waiter in state.waiters.drain(..) {
            let _ = waiter.sender.send(Err(Error::Shutdown));
        }
        true
    }

    pub(crate) fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock().expect("lock should not be poisoned");
        GateSnapshot {
            rate: state.limit.rate(),
            outstanding: state.outstanding,
            available: state.available(self.horizon),
            waiting: state.waiters.len(),
            refreshes: state.refreshes,
            closed: state.closed,
        }
    }

    fn cancel(&self, id: WaiterId, receiver: &mut oneshot::Receiver<Result<usize, Error>>) {
        let mut state = self.state.lock().expect("lock should not be poisoned");
        if let Ok(index) = state.waiters.binary_search_by_key(&id, |waiter| waiter.id) {
            state.waiters.remove(index);
            return;
        }

        // No longer queued, so we may have been granted permits nobody will use.
        if let Ok(Ok(permits)) = receiver.try_recv() {
            state.outstanding = state.outstanding.saturating_sub(permits);
            trace!(permits, "returning permits from cancelled request");
            state.admit_waiters(self.horizon);
        }
    }
}

impl GateState {
    fn available(&self, horizon: Duration) -> usize {
        self.limit
            .capacity(horizon)
            .saturating_sub(self.outstanding)
    }

    /// Admit waiters in order while permits are available.
    fn admit_waiters(&mut self, horizon: Duration) {
        loop {
            let available = self.available(horizon);
            if available == 0 {
                break;
            }
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.outstanding += available;
            if waiter.sender.send(Ok(available)).is_err() {
                self.outstanding -= available;
                continue;
            }
            trace!(
                permits = available,
                outstanding = self.outstanding,
                "granted to waiter"
            );
        }
    }
}

impl Limit {
    fn capacity(&self, horizon: Duration) -> usize {
        match *self {
            Limit::Throughput(rate) => (rate * horizon.as_secs_f64())
                .floor()
                .approx_as::<usize>()
                // Only overflow is possible for a finite, non-negative rate.
                .unwrap_or(usize::MAX),
            Limit::Fixed(max_outstanding) => max_outstanding,
        }
    }

    /// The throughput this limit corresponds to, in operations per second.
    ///
    /// A fixed limit reports its capacity per second.
    fn rate(&self) -> f64 {
        match *self {
            Limit::Throughput(rate) => rate,
            Limit::Fixed(max_outstanding) => {
                max_outstanding.approx_as::<f64>().unwrap_or(f64::MAX)
            }
        }
    }
}

impl Future for Admission {
    type Output = Result<usize, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(result) => {
                self.done = true;
                // The sender is only dropped without sending when the gate itself is dropped.
                Poll::Ready(result.unwrap_or(Err(Error::Shutdown)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.done {
            self.gate.cancel(self.id, &mut self.receiver);
        }
    }
}
