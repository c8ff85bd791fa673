use std::ops::Index;

use serde::{Deserialize, Serialize};

use lbs_protocol::ResourceClass;

/// Per-class decision of whether a resource may be torn down.
///
/// Always derived from the reference table, never updated incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownVector([bool; ResourceClass::COUNT]);

impl ShutdownVector {
    pub fn new(flags: [bool; ResourceClass::COUNT]) -> Self {
        Self(flags)
    }

    /// Every class shut down, the state of an empty table.
    pub fn all() -> Self {
        Self([true; ResourceClass::COUNT])
    }

    pub fn is_shutdown(&self, resource: ResourceClass) -> bool {
        self.0[resource.index()]
    }

    pub fn all_shutdown(&self) -> bool {
        self.0.iter().all(|&s| s)
    }

    /// (class, shutdown) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceClass, bool)> + '_ {
        ResourceClass::ALL.into_iter().map(move |r| (r, self.is_shutdown(r)))
    }

    pub fn to_vec(&self) -> Vec<bool> {
        self.0.to_vec()
    }
}

impl Index<ResourceClass> for ShutdownVector {
    type Output = bool;

    fn index(&self, resource: ResourceClass) -> &bool {
        &self.0[resource.index()]
    }
}

/// Receives the shutdown vector after every accepted table mutation:
/// reference changes, interval requests and forced removals.
///
/// Called synchronously while the session manager is still held, so
/// implementations must not call back into it. Unchanged vectors are
/// delivered too; deduplication is the listener's business.
pub trait ShutdownListener: Send + Sync {
    fn on_shutdown_vector_changed(&self, vector: &ShutdownVector);
}
