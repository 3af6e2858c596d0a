use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{gate::Gate, Error};

use super::{ControllerState, FlowController, Outcome};

/// Allows a fixed number of operations to be outstanding.
///
/// Like [OutstandingCountFlowController](super::OutstandingCountFlowController), permits are
/// granted in batches of everything currently available.
#[derive(Debug)]
pub struct FixedFlowController {
    gate: Arc<Gate>,
}

impl FixedFlowController {
    /// Allow up to `max_outstanding` operations at once.
    pub fn new(max_outstanding: usize) -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Gate::fixed(max_outstanding)),
        })
    }

    /// The current state of the controller.
    pub fn state(&self) -> ControllerState {
        self.gate.snapshot().into()
    }
}

#[async_trait]
impl FlowController for FixedFlowController {
    async fn request_start(&self) -> Result<usize, Error> {
        self.gate.acquire().await
    }

    fn inform_finished(&self, _outcome: Outcome) -> Result<(), Error> {
        self.gate.release()
    }

    fn shutdown(&self) {
        if self.gate.close() {
            info!("flow controller shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use tokio::task;

    use crate::{
        controller::{FlowController, Outcome},
        Error,
    };

    use super::FixedFlowController;

    #[tokio::test]
    async fn grants_up_to_the_limit() {
        let controller = FixedFlowController::new(10);

        assert_eq!(controller.request_start().await, Ok(10));
        assert_eq!(controller.state().outstanding(), 10);
        assert_eq!(controller.state().available(), 0);

        for _ in 0..3 {
            controller.inform_finished(Outcome::Failure).unwrap();
        }
        assert_eq!(controller.request_start().await, Ok(3));
    }

    #[tokio::test]
    async fn waits_for_completions() {
        let controller = FixedFlowController::new(1);
        assert_eq!(controller.request_start().await, Ok(1));

        let blocked = task::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.request_start().await }
        });
        task::yield_now().await;
        assert_eq!(controller.state().waiting(), 1);

        controller.inform_finished(Outcome::Success).unwrap();
        assert_eq!(blocked.await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn zero_limit_never_admits() {
        let controller = FixedFlowController::new(0);

        let blocked = task::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.request_start().await }
        });
        task::yield_now().await;

        controller.shutdown();
        assert_eq!(blocked.await.unwrap(), Err(Error::Shutdown));
        assert_matches!(
            controller.inform_finished(Outcome::Success),
            Err(Error::Shutdown)
        );
    }
}
