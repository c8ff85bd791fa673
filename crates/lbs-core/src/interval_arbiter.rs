use std::sync::Arc;

use tracing::debug;

use lbs_protocol::ResourceClass;

use crate::reference_table::ReferenceTable;

/// Effective interval of every class, in index order.
pub type IntervalSet = [Option<u32>; ResourceClass::COUNT];

/// Receives the new effective interval of a class whenever it changes.
/// `None` means no client constrains the class any more.
pub trait IntervalListener: Send + Sync {
    fn on_effective_interval_changed(&self, resource: ResourceClass, interval: Option<u32>);
}

/// Renegotiates the shared sampling interval of each resource class.
///
/// Holds no interval state of its own; requests live in the reference table
/// and the arbiter compares the table before and after a mutation.
pub struct IntervalArbiter {
    listener: Arc<dyn IntervalListener>,
}

impl IntervalArbiter {
    pub fn new(listener: Arc<dyn IntervalListener>) -> Self {
        Self { listener }
    }

    /// Smallest interval among clients holding a reference to `resource`.
    pub fn effective_interval(&self, table: &ReferenceTable, resource: ResourceClass) -> Option<u32> {
        table.effective_interval(resource)
    }

    /// Effective interval of every class.
    pub fn effective_intervals(&self, table: &ReferenceTable) -> IntervalSet {
        effective_intervals(table)
    }

    /// Compare `before` with the current table for each class in `classes`
    /// and notify the listener for every class whose interval moved.
    /// Returns the classes that changed.
    pub fn renegotiate(
        &self,
        table: &ReferenceTable,
        before: &IntervalSet,
        classes: impl IntoIterator<Item = ResourceClass>,
    ) -> Vec<ResourceClass> {
        let mut changed = Vec::new();
        for resource in classes {
            let after = table.effective_interval(resource);
            if after != before[resource.index()] {
                debug!(
                    resource = %resource,
                    old = ?before[resource.index()],
                    new = ?after,
                    "effective interval changed"
                );
                self.listener.on_effective_interval_changed(resource, after);
                changed.push(resource);
            }
        }
        changed
    }
}

/// Effective interval of every class, computed from `table`.
pub fn effective_intervals(table: &ReferenceTable) -> IntervalSet {
    let mut set = [None; ResourceClass::COUNT];
    for resource in ResourceClass::ALL {
        set[resource.index()] = table.effective_interval(resource);
    }
    set
}
