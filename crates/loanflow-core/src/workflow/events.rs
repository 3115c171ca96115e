//! Broadcast bus for run lifecycle events.
//!
//! Built on `tokio::sync::broadcast`. Result handles subscribe to learn
//! about terminal transitions without waiting for the next store poll.
//! Publishing with no active subscribers is a no-op.

use loanflow_types::workflow::RunStatus;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Something that happened to a run inside this process.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        run_id: Uuid,
        workflow_name: String,
    },
    Suspended {
        run_id: Uuid,
        topic: String,
    },
    Resumed {
        run_id: Uuid,
        topic: String,
    },
    Finished {
        run_id: Uuid,
        status: RunStatus,
    },
    /// The attempt stopped without a terminal status (persistence failure
    /// or shutdown). The run stays resumable.
    AttemptAborted {
        run_id: Uuid,
        error: String,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::Started { run_id, .. }
            | RunEvent::Suspended { run_id, .. }
            | RunEvent::Resumed { run_id, .. }
            | RunEvent::Finished { run_id, .. }
            | RunEvent::AttemptAborted { run_id, .. } => *run_id,
        }
    }
}

/// Multi-consumer bus for run events.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
#[derive(Clone)]
pub struct RunEventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl RunEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for RunEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for RunEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multiple_subscribers_each_receive_event() {
        let bus = RunEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let run_id = Uuid::now_v7();

        bus.publish(RunEvent::Finished {
            run_id,
            status: RunStatus::Succeeded,
        });

        assert_eq!(rx1.recv().await.unwrap().run_id(), run_id);
        assert!(matches!(
            rx2.recv().await.unwrap(),
            RunEvent::Finished { status: RunStatus::Succeeded, .. }
        ));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = RunEventBus::default();
        bus.publish(RunEvent::Resumed {
            run_id: Uuid::nil(),
            topic: "review-request".into(),
        });
    }
}
