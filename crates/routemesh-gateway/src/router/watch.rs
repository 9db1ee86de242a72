//! Registry watch loop
//!
//! A single task applies `ServiceUpdate`s one at a time, in the order the
//! registry emitted them. The loop ends when its channel closes, which
//! happens once the listener is unregistered.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use routemesh_core::ServiceUpdate;
use routemesh_registry::{ListenerId, ServiceRegistry};

use super::DynamicRouter;

/// Running watch loop
pub struct WatchHandle {
    registry: Arc<ServiceRegistry>,
    listener: ListenerId,
    task: JoinHandle<usize>,
}

impl WatchHandle {
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Close the update channel and wait for the loop to drain.
    ///
    /// Returns how many updates the loop applied.
    pub async fn stop(self) -> usize {
        self.registry.unregister_update_listener(self.listener);
        self.task.await.unwrap_or_default()
    }
}

impl DynamicRouter {
    /// Subscribe to `registry`, load its current healthy services and start
    /// applying updates.
    ///
    /// The listener is attached before the snapshot is read so no update
    /// emitted in between is lost; applying an update the snapshot already
    /// reflects leaves the table unchanged.
    pub fn start(self: &Arc<Self>, registry: Arc<ServiceRegistry>, buffer: usize) -> WatchHandle {
        let (listener, rx) = registry.subscribe(buffer);
        self.load_snapshot(&registry.get_services());

        let router = Arc::clone(self);
        let task = tokio::spawn(watch_loop(router, rx));
        info!("[Router] Watching registry (listener {})", listener);

        WatchHandle {
            registry,
            listener,
            task,
        }
    }
}

async fn watch_loop(router: Arc<DynamicRouter>, mut rx: mpsc::Receiver<ServiceUpdate>) -> usize {
    let mut applied = 0;
    while let Some(update) = rx.recv().await {
        router.apply_update(&update);
        applied += 1;
    }
    info!("[Router] Update channel closed after {} updates", applied);
    applied
}
