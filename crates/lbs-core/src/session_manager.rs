use std::sync::Arc;

use tracing::{debug, error, info, warn};

use lbs_protocol::{ArbiterSnapshot, ResourceClass};

use crate::error::ArbiterError;
use crate::interval_arbiter::{self, IntervalArbiter, IntervalListener, IntervalSet};
use crate::reference_table::ReferenceTable;
use crate::shutdown::{ShutdownListener, ShutdownVector};

/// Owns the reference table and derives shutdown decisions from it.
///
/// Every operation runs to completion and notifies the listeners before
/// returning; callers serialize access (the server keeps the manager behind
/// a single mutex).
pub struct SessionManager {
    table: ReferenceTable,
    shutdown_listener: Arc<dyn ShutdownListener>,
    arbiter: Option<IntervalArbiter>,
    anomalies: u64,
}

impl SessionManager {
    /// Manager without interval renegotiation.
    pub fn new(shutdown_listener: Arc<dyn ShutdownListener>) -> Self {
        Self::with_table(ReferenceTable::new(), shutdown_listener, None)
    }

    /// Manager that also renegotiates effective intervals.
    pub fn with_interval_arbiter(
        shutdown_listener: Arc<dyn ShutdownListener>,
        interval_listener: Arc<dyn IntervalListener>,
    ) -> Self {
        Self::with_table(
            ReferenceTable::new(),
            shutdown_listener,
            Some(IntervalArbiter::new(interval_listener)),
        )
    }

    pub fn with_table(
        table: ReferenceTable,
        shutdown_listener: Arc<dyn ShutdownListener>,
        arbiter: Option<IntervalArbiter>,
    ) -> Self {
        Self {
            table,
            shutdown_listener,
            arbiter,
            anomalies: 0,
        }
    }

    /// Record one more reference of `client` to `resource`.
    pub fn add_reference(
        &mut self,
        client: &str,
        resource: ResourceClass,
    ) -> Result<ShutdownVector, ArbiterError> {
        validate_client(client)?;
        let before = self.intervals_before();

        let count = self.table.get(client, resource);
        if count == 0 && !self.table.contains(client) {
            debug!(client = %client, "first reference from client");
        }
        let next = match count.checked_add(1) {
            Some(next) => next,
            None => {
                self.record_anomaly(ArbiterError::InvariantViolation(format!(
                    "reference count of {} for {} saturated",
                    client, resource
                )));
                count
            }
        };
        self.table.set(client, resource, next);
        debug!(client = %client, resource = %resource, count = next, "reference added");

        Ok(self.publish(before, [resource]))
    }

    /// Same as [`add_reference`](Self::add_reference) for a raw wire method number.
    pub fn add_reference_raw(
        &mut self,
        client: &str,
        method: i32,
    ) -> Result<ShutdownVector, ArbiterError> {
        let resource = ResourceClass::try_from(method)?;
        self.add_reference(client, resource)
    }

    /// Release one reference. Releasing more than was added is absorbed as an
    /// anomaly; the vector is recomputed either way.
    pub fn remove_reference(
        &mut self,
        client: &str,
        resource: ResourceClass,
    ) -> Result<ShutdownVector, ArbiterError> {
        validate_client(client)?;
        let before = self.intervals_before();

        match self.table.get(client, resource) {
            _ if !self.table.contains(client) => {
                self.record_anomaly(ArbiterError::UnknownClient {
                    client: client.to_string(),
                    resource,
                });
            }
            0 => {
                self.record_anomaly(ArbiterError::ReleaseAtZero {
                    client: client.to_string(),
                    resource,
                });
            }
            count => {
                let next = count - 1;
                self.table.set(client, resource, next);
                if next == 0 {
                    // the interval request only lives as long as the reference
                    self.table.set_interval(client, resource, None);
                }
                debug!(client = %client, resource = %resource, count = next, "reference removed");
            }
        }

        if self.table.contains(client) && self.table.is_vacant(client) {
            self.table.delete(client);
            debug!(client = %client, "client released its last reference");
        }

        Ok(self.publish(before, [resource]))
    }

    /// Same as [`remove_reference`](Self::remove_reference) for a raw wire method number.
    pub fn remove_reference_raw(
        &mut self,
        client: &str,
        method: i32,
    ) -> Result<ShutdownVector, ArbiterError> {
        let resource = ResourceClass::try_from(method)?;
        self.remove_reference(client, resource)
    }

    /// Record the sampling interval `client` wants for `resource`.
    /// Returns the effective interval of the class afterwards.
    pub fn request_interval(
        &mut self,
        client: &str,
        resource: ResourceClass,
        interval_ms: u32,
    ) -> Result<Option<u32>, ArbiterError> {
        validate_client(client)?;
        if interval_ms == 0 {
            return Err(ArbiterError::Parameter("interval must be positive".to_string()));
        }
        let before = self.intervals_before();

        self.table.set_interval(client, resource, Some(interval_ms));
        debug!(client = %client, resource = %resource, interval_ms, "interval requested");

        // a pending request can create an entry, so listeners hear about it
        // like any other accepted mutation
        self.publish(before, [resource]);
        Ok(self.table.effective_interval(resource))
    }

    /// Same as [`request_interval`](Self::request_interval) for a raw wire method number.
    pub fn request_interval_raw(
        &mut self,
        client: &str,
        method: i32,
        interval_ms: u32,
    ) -> Result<Option<u32>, ArbiterError> {
        let resource = ResourceClass::try_from(method)?;
        self.request_interval(client, resource, interval_ms)
    }

    /// Drop everything `client` holds, whatever its counts. Used when the
    /// client vanished without releasing. Unknown clients are a no-op.
    pub fn force_remove_client(&mut self, client: &str) -> ShutdownVector {
        let before = self.intervals_before();

        let touched: Vec<ResourceClass> = match self.table.delete(client) {
            Some(entry) => {
                let touched: Vec<_> = entry.touched().collect();
                warn!(
                    client = %client,
                    resources = ?touched,
                    "client shut down abnormally, dropping its references"
                );
                touched
            }
            None => {
                debug!(client = %client, "client already removed");
                Vec::new()
            }
        };

        self.publish(before, touched)
    }

    /// `shutdown[r]` is true iff no tracked client references `r`.
    pub fn compute_shutdown_vector(&self) -> ShutdownVector {
        let mut flags = [true; ResourceClass::COUNT];
        for resource in ResourceClass::ALL {
            flags[resource.index()] = !self.table.any_non_zero(resource);
        }
        ShutdownVector::new(flags)
    }

    pub fn tracked_clients(&self) -> impl Iterator<Item = &str> {
        self.table.clients()
    }

    pub fn client_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_tracked(&self, client: &str) -> bool {
        self.table.contains(client)
    }

    pub fn reference_count(&self, client: &str, resource: ResourceClass) -> u32 {
        self.table.get(client, resource)
    }

    pub fn effective_interval(&self, resource: ResourceClass) -> Option<u32> {
        self.table.effective_interval(resource)
    }

    /// Number of protocol anomalies and invariant violations absorbed so far.
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            shutdown: self.compute_shutdown_vector().to_vec(),
            tracked_clients: u32::try_from(self.table.len()).unwrap_or(u32::MAX),
            effective_intervals: interval_arbiter::effective_intervals(&self.table).to_vec(),
        }
    }

    fn intervals_before(&self) -> Option<IntervalSet> {
        self.arbiter
            .as_ref()
            .map(|arbiter| arbiter.effective_intervals(&self.table))
    }

    /// Notify listeners once the table is fully updated: shutdown first, then
    /// interval changes for `classes`.
    fn publish(
        &self,
        before: Option<IntervalSet>,
        classes: impl IntoIterator<Item = ResourceClass>,
    ) -> ShutdownVector {
        let vector = self.compute_shutdown_vector();
        self.shutdown_listener.on_shutdown_vector_changed(&vector);

        if let (Some(arbiter), Some(before)) = (&self.arbiter, before) {
            arbiter.renegotiate(&self.table, &before, classes);
        }

        if vector.all_shutdown() && self.table.is_empty() {
            info!("no client holds a reference, all resources may shut down");
        }
        vector
    }

    fn record_anomaly(&mut self, anomaly: ArbiterError) {
        self.anomalies += 1;
        match &anomaly {
            ArbiterError::UnknownClient { .. } => debug!(%anomaly, "release ignored"),
            a if a.is_protocol_anomaly() => warn!(%anomaly, "protocol anomaly"),
            _ => error!(%anomaly, "invariant violation"),
        }
    }
}

fn validate_client(client: &str) -> Result<(), ArbiterError> {
    if client.is_empty() || client.contains('\0') {
        return Err(ArbiterError::Parameter(format!(
            "malformed client identity {:?}",
            client
        )));
    }
    Ok(())
}
