use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::sync::PlaylistStatus;

/// Progress notifications for whatever front end drives the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Planned { to_sync: usize, to_remove: usize },
    Removed { name: String },
    Started { name: String, index: usize, total: usize },
    RateLimited { name: String, wait: Duration },
    Waiting { wait: Duration },
    Finished { name: String, status: PlaylistStatus },
    Cancelled,
}

/// Optional sender for [`SyncEvent`]s. Events are dropped when nobody listens.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<UnboundedSender<SyncEvent>>);

impl EventSink {
    pub fn new(sender: UnboundedSender<SyncEvent>) -> Self {
        Self(Some(sender))
    }

    pub fn emit(&self, event: SyncEvent) {
        if let Some(sender) = &self.0 {
            if sender.send(event).is_err() {
                log::debug!("Progress listener is gone, dropping event");
            }
        }
    }
}
