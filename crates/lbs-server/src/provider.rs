use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use lbs_core::interval_arbiter::IntervalSet;
use lbs_core::{IntervalListener, ShutdownListener, ShutdownVector};
use lbs_protocol::ResourceClass;

/// The provider-side capabilities handed to the session manager.
#[derive(Clone)]
pub struct ProviderHooks {
    pub shutdown: Arc<dyn ShutdownListener>,
    pub interval: Option<Arc<dyn IntervalListener>>,
}

impl ProviderHooks {
    pub fn new(shutdown: Arc<dyn ShutdownListener>) -> Self {
        Self {
            shutdown,
            interval: None,
        }
    }

    pub fn with_interval_listener(mut self, interval: Arc<dyn IntervalListener>) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Hooks backed by a [`ProviderController`] that only logs transitions.
    pub fn logging() -> Self {
        let controller = Arc::new(ProviderController::new());
        Self::new(controller.clone()).with_interval_listener(controller)
    }
}

/// Default provider: starts and stops resource classes by logging.
///
/// The session manager delivers a vector after every accepted call, changed
/// or not. The controller remembers the last one and acts only on classes
/// whose state flipped.
pub struct ProviderController {
    last: Mutex<ShutdownVector>,
    intervals: Mutex<IntervalSet>,
}

impl ProviderController {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(ShutdownVector::all()),
            intervals: Mutex::new([None; ResourceClass::COUNT]),
        }
    }

    /// Classes currently running.
    pub fn running(&self) -> Vec<ResourceClass> {
        self.last
            .lock()
            .iter()
            .filter(|&(_, shutdown)| !shutdown)
            .map(|(r, _)| r)
            .collect()
    }

    pub fn interval(&self, resource: ResourceClass) -> Option<u32> {
        self.intervals.lock()[resource.index()]
    }
}

impl Default for ProviderController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener for ProviderController {
    fn on_shutdown_vector_changed(&self, vector: &ShutdownVector) {
        let mut last = self.last.lock();
        for (resource, shutdown) in vector.iter() {
            if last[resource] == shutdown {
                continue;
            }
            if shutdown {
                info!(resource = %resource, "no references left, stopping provider");
            } else {
                info!(resource = %resource, "first reference, starting provider");
            }
        }
        *last = *vector;
    }
}

impl IntervalListener for ProviderController {
    fn on_effective_interval_changed(&self, resource: ResourceClass, interval: Option<u32>) {
        self.intervals.lock()[resource.index()] = interval;
        match interval {
            Some(ms) => info!(resource = %resource, interval_ms = ms, "re-tuning update interval"),
            None => info!(resource = %resource, "update interval released"),
        }
    }
}
