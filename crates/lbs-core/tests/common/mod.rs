#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use lbs_core::{IntervalListener, SessionManager, ShutdownListener, ShutdownVector};
use lbs_protocol::ResourceClass;

/// Records every shutdown vector it is handed.
#[derive(Default)]
pub struct RecordingShutdown {
    pub calls: Mutex<Vec<ShutdownVector>>,
}

impl RecordingShutdown {
    pub fn last(&self) -> Option<ShutdownVector> {
        self.calls.lock().last().copied()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl ShutdownListener for RecordingShutdown {
    fn on_shutdown_vector_changed(&self, vector: &ShutdownVector) {
        self.calls.lock().push(*vector);
    }
}

/// Records every interval change it is handed.
#[derive(Default)]
pub struct RecordingIntervals {
    pub calls: Mutex<Vec<(ResourceClass, Option<u32>)>>,
}

impl RecordingIntervals {
    pub fn take(&self) -> Vec<(ResourceClass, Option<u32>)> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl IntervalListener for RecordingIntervals {
    fn on_effective_interval_changed(&self, resource: ResourceClass, interval: Option<u32>) {
        self.calls.lock().push((resource, interval));
    }
}

pub fn make_manager() -> (SessionManager, Arc<RecordingShutdown>) {
    let shutdown = Arc::new(RecordingShutdown::default());
    (SessionManager::new(shutdown.clone()), shutdown)
}

pub fn make_arbitrated_manager() -> (SessionManager, Arc<RecordingShutdown>, Arc<RecordingIntervals>) {
    let shutdown = Arc::new(RecordingShutdown::default());
    let intervals = Arc::new(RecordingIntervals::default());
    (
        SessionManager::with_interval_arbiter(shutdown.clone(), intervals.clone()),
        shutdown,
        intervals,
    )
}
