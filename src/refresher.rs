//! Background task which keeps the gate's rate current.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, trace};

use crate::{gate::Gate, options::Options, window::CompletionWindow};

/// Spawn the refresher onto `runtime`.
///
/// The first tick is delayed so the seed rate stays in effect until the window has filled. The
/// task exits by itself once the gate is closed.
pub(crate) fn spawn(
    runtime: &Handle,
    gate: Arc<Gate>,
    window: Arc<CompletionWindow>,
    options: &Options,
) -> JoinHandle<()> {
    let start = Instant::now() + options.first_refresh();
    let period = options.refresh_interval();

    runtime.spawn(async move {
        let mut interval = time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_rate = None;
        loop {
            interval.tick().await;

            let rate = window.rate();
            if gate.publish_rate(rate).is_err() {
                break;
            }

            if last_rate != Some(rate) {
                debug!(rate, "throughput estimate changed");
                last_rate = Some(rate);
            } else {
                trace!(rate, "throughput estimate refreshed");
            }
        }
        trace!("refresher stopped");
    })
}
