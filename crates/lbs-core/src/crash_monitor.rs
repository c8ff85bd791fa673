use tracing::{debug, info};

use crate::config::BusConfig;
use crate::session_manager::SessionManager;

/// Ownership change of a bus name, as broadcast by the bus daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameOwnerChanged {
    pub service_name: String,
    pub previous_owner: String,
    /// Empty when the name vanished rather than changed hands
    pub new_owner: String,
    pub object_path: String,
    pub interface_name: String,
    pub sender_name: String,
}

impl NameOwnerChanged {
    /// Notification the bus emits when the connection `unique_name` goes away.
    pub fn departure(bus: &BusConfig, unique_name: &str) -> Self {
        Self {
            service_name: unique_name.to_string(),
            previous_owner: unique_name.to_string(),
            new_owner: String::new(),
            object_path: bus.object_path.clone(),
            interface_name: bus.interface_name.clone(),
            sender_name: bus.sender_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    /// A departed identity is being matched against tracked clients.
    Correlating { departed: String },
}

/// Turns peer-departure notifications into forced client removal.
///
/// Purely reactive: nothing here polls or times out. A peer the bus never
/// reports as gone is never reclaimed. Correctness relies on the bus not
/// reusing a unique name while the old owner is still tracked.
pub struct CrashMonitor {
    bus: BusConfig,
    state: MonitorState,
}

impl CrashMonitor {
    pub fn new(bus: BusConfig) -> Self {
        Self {
            bus,
            state: MonitorState::Idle,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// The departed identity if `change` is a genuine disconnect reported by
    /// the bus itself: trusted sender, path and interface, a non-empty
    /// previous owner and no new owner.
    pub fn departed_peer<'a>(&self, change: &'a NameOwnerChanged) -> Option<&'a str> {
        if change.object_path != self.bus.object_path
            || change.interface_name != self.bus.interface_name
            || change.sender_name != self.bus.sender_name
        {
            return None;
        }
        if !change.new_owner.is_empty() || change.previous_owner.is_empty() {
            return None;
        }
        Some(change.previous_owner.as_str())
    }

    /// Handle one ownership notification. Returns the number of tracked
    /// clients that were force-removed.
    pub fn on_peer_owner_changed(
        &mut self,
        sessions: &mut SessionManager,
        change: &NameOwnerChanged,
    ) -> usize {
        let Some(departed) = self.departed_peer(change) else {
            debug!(
                service = %change.service_name,
                sender = %change.sender_name,
                "ignoring owner change"
            );
            return 0;
        };

        self.state = MonitorState::Correlating {
            departed: departed.to_string(),
        };

        // identities are unique per connection, but scan everything anyway
        let matched: Vec<String> = sessions
            .tracked_clients()
            .filter(|client| *client == departed)
            .map(str::to_string)
            .collect();

        for client in &matched {
            info!(client = %client, "disconnected sender matched, removing client by force");
            sessions.force_remove_client(client);
        }

        self.state = MonitorState::Idle;
        matched.len()
    }
}
